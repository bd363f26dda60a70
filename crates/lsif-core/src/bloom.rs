//! Bloom filter over identifier strings.
//!
//! Used by the cross-repository index to reject dumps that certainly do not
//! reference an identifier. Hash positions come from double hashing over a
//! SHA-256 digest: `h1 + i * h2 (mod m)`.
//!
//! Serialized layout (little endian):
//!
//! ```text
//! magic "LSBF" | version u8 | hash_count u32 | bit_count u64 | crc32 u32 | words [u64]
//! ```
//!
//! The CRC covers the word bytes; any mismatch is reported as
//! [`LsifError::CorruptFilter`].

use sha2::{Digest, Sha256};

use crate::errors::{LsifError, LsifResult};
use crate::query::guards::{clamp_rate, MAX_FILTER_HASHES};

const MAGIC: &[u8; 4] = b"LSBF";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 8 + 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomFilter {
    words: Vec<u64>,
    bit_count: u64,
    hash_count: u32,
}

impl BloomFilter {
    /// Size a filter for `expected_items` at the given false-positive rate.
    ///
    /// `m = -n ln p / (ln 2)^2`, `k = (m / n) ln 2`.
    pub fn with_rate(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = clamp_rate(false_positive_rate);
        let ln2 = std::f64::consts::LN_2;

        let bits = (-n * p.ln() / (ln2 * ln2)).ceil().max(64.0) as u64;
        let hashes = ((bits as f64 / n) * ln2).round() as u32;
        let hash_count = hashes.clamp(1, MAX_FILTER_HASHES);

        let word_count = bits.div_ceil(64) as usize;
        Self {
            words: vec![0; word_count],
            bit_count: word_count as u64 * 64,
            hash_count,
        }
    }

    pub fn from_items<I, S>(items: I, false_positive_rate: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<S> = items.into_iter().collect();
        let mut filter = Self::with_rate(items.len(), false_positive_rate);
        for item in &items {
            filter.insert(item.as_ref());
        }
        filter
    }

    pub fn insert(&mut self, item: &str) {
        let (h1, h2) = hash_pair(item);
        for i in 0..u64::from(self.hash_count) {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.bit_count;
            self.words[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// `false` means definitely absent; `true` means possibly present.
    pub fn contains(&self, item: &str) -> bool {
        let (h1, h2) = hash_pair(item);
        (0..u64::from(self.hash_count)).all(|i| {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.bit_count;
            self.words[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.words.len() * 8);
        for word in &self.words {
            body.extend_from_slice(&word.to_le_bytes());
        }

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.hash_count.to_le_bytes());
        out.extend_from_slice(&self.bit_count.to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> LsifResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(LsifError::CorruptFilter(format!(
                "truncated header ({} bytes)",
                bytes.len()
            )));
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if &header[0..4] != MAGIC {
            return Err(LsifError::CorruptFilter("bad magic".into()));
        }
        if header[4] != FORMAT_VERSION {
            return Err(LsifError::CorruptFilter(format!(
                "unsupported version {}",
                header[4]
            )));
        }

        let hash_count = u32::from_le_bytes(le_array(&header[5..9]));
        let bit_count = u64::from_le_bytes(le_array(&header[9..17]));
        let checksum = u32::from_le_bytes(le_array(&header[17..21]));

        if hash_count == 0 || hash_count > MAX_FILTER_HASHES {
            return Err(LsifError::CorruptFilter(format!(
                "invalid hash count {hash_count}"
            )));
        }
        if bit_count == 0 || bit_count % 64 != 0 || body.len() as u64 * 8 != bit_count {
            return Err(LsifError::CorruptFilter(format!(
                "bit count {bit_count} does not match {} body bytes",
                body.len()
            )));
        }
        if crc32fast::hash(body) != checksum {
            return Err(LsifError::CorruptFilter("checksum mismatch".into()));
        }

        let words = body
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(le_array(chunk)))
            .collect();
        Ok(Self {
            words,
            bit_count,
            hash_count,
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn hash_pair(item: &str) -> (u64, u64) {
    let digest = Sha256::digest(item.as_bytes());
    let h1 = u64::from_le_bytes(le_array(&digest[0..8]));
    // Odd step so successive probes never collapse onto one bit.
    let h2 = u64::from_le_bytes(le_array(&digest[8..16])) | 1;
    (h1, h2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tests_set_membership() {
        let filter = BloomFilter::from_items(["foo", "bar", "baz"], 0.01);
        assert!(filter.contains("foo"));
        assert!(filter.contains("bar"));
        assert!(filter.contains("baz"));
        assert!(!filter.contains("bonk"));
        assert!(!filter.contains("quux"));
    }

    #[test]
    fn empty_filter_rejects_everything() {
        let filter = BloomFilter::from_items(Vec::<String>::new(), 0.01);
        assert!(!filter.contains(""));
        assert!(!filter.contains("anything"));
    }

    #[test]
    fn sizing_follows_the_rate() {
        let loose = BloomFilter::with_rate(1000, 0.1);
        let tight = BloomFilter::with_rate(1000, 0.001);
        assert!(tight.bit_count() > loose.bit_count());
        assert!(tight.hash_count() > loose.hash_count());
    }

    #[test]
    fn empirical_false_positive_rate_is_near_target() {
        let members: Vec<String> = (0..2000).map(|i| format!("member-{i}")).collect();
        let filter = BloomFilter::from_items(&members, 0.01);

        let trials = 20_000;
        let false_positives = (0..trials)
            .filter(|i| filter.contains(&format!("outsider-{i}")))
            .count();
        let rate = false_positives as f64 / trials as f64;
        assert!(rate < 0.03, "false positive rate {rate} too far above 0.01");
    }

    #[test]
    fn serialization_round_trips_parameters() {
        let filter = BloomFilter::from_items(["alpha", "beta"], 0.05);
        let decoded = BloomFilter::from_bytes(&filter.to_bytes()).unwrap();
        assert_eq!(decoded, filter);
        assert!(decoded.contains("alpha"));
        assert!(decoded.contains("beta"));
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        let mut bytes = BloomFilter::from_items(["alpha"], 0.05).to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            BloomFilter::from_bytes(&bytes),
            Err(LsifError::CorruptFilter(_))
        ));

        assert!(matches!(
            BloomFilter::from_bytes(b"LSBF"),
            Err(LsifError::CorruptFilter(_))
        ));

        let mut bad_magic = BloomFilter::from_items(["alpha"], 0.05).to_bytes();
        bad_magic[0] = b'X';
        assert!(matches!(
            BloomFilter::from_bytes(&bad_magic),
            Err(LsifError::CorruptFilter(_))
        ));
    }

    proptest! {
        #[test]
        fn no_false_negatives_after_round_trip(
            items in proptest::collection::hash_set(".{0,24}", 0..64),
            rate in 0.0001f64..0.3,
        ) {
            let filter = BloomFilter::from_items(&items, rate);
            let decoded = BloomFilter::from_bytes(&filter.to_bytes()).unwrap();
            for item in &items {
                prop_assert!(filter.contains(item));
                prop_assert!(decoded.contains(item));
            }
        }
    }
}
