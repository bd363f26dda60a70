//! Shared guardrails for query fan-out and resource budgets.

// Handle pool
pub const MIN_CONNECTION_CACHE_CAPACITY: i64 = 1;
pub const MAX_CONNECTION_CACHE_CAPACITY: i64 = 4096;

// Document / chunk caches (weight units)
pub const MIN_CACHE_CAPACITY: i64 = 1;
pub const MAX_CACHE_CAPACITY: i64 = 1 << 32;

// Cross-repository fan-out
pub const MAX_CANDIDATE_DUMPS_PER_QUERY: i64 = 16;
pub const MAX_CROSS_REPO_LOCATIONS: usize = 500;

// Dump listing
pub const MAX_DUMPS_PAGE_SIZE: i64 = 1000;

// Result chunking
pub const MIN_RESULTS_PER_CHUNK: i64 = 1;
pub const MAX_RESULTS_PER_CHUNK: i64 = 100_000;
pub const MAX_RESULT_CHUNKS: i64 = 10_000;

// Probabilistic filter
pub const MIN_FALSE_POSITIVE_RATE: f64 = 1e-6;
pub const MAX_FALSE_POSITIVE_RATE: f64 = 0.5;
pub const MAX_FILTER_HASHES: u32 = 32;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

/// Clamp a `usize` setting into `[minimum, maximum]`.
pub fn clamp_usize(value: usize, minimum: i64, maximum: i64) -> usize {
    let value = i64::try_from(value).unwrap_or(i64::MAX);
    clamp_int(value, minimum, maximum) as usize
}

pub fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() {
        return MAX_FALSE_POSITIVE_RATE;
    }
    value.clamp(MIN_FALSE_POSITIVE_RATE, MAX_FALSE_POSITIVE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_bounds() {
        assert_eq!(clamp_int(0, 1, 10), 1);
        assert_eq!(clamp_int(42, 1, 10), 10);
        assert_eq!(clamp_usize(usize::MAX, 1, 4096), 4096);
        assert_eq!(clamp_usize(0, 1, 4096), 1);
    }

    #[test]
    fn rate_is_never_degenerate() {
        assert_eq!(clamp_rate(0.0), MIN_FALSE_POSITIVE_RATE);
        assert_eq!(clamp_rate(1.0), MAX_FALSE_POSITIVE_RATE);
        assert_eq!(clamp_rate(f64::NAN), MAX_FALSE_POSITIVE_RATE);
        assert_eq!(clamp_rate(0.01), 0.01);
    }
}
