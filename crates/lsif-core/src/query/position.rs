//! Locating ranges by position.

use indexmap::IndexMap;

use crate::models::{Id, Position, RangeData};

/// Index one past the last range whose start is `<= position`.
fn upper_bound(ranges: &IndexMap<Id, RangeData>, position: Position) -> usize {
    let (mut lo, mut hi) = (0, ranges.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match ranges.get_index(mid) {
            Some((_, range)) if range.start() <= position => lo = mid + 1,
            _ => hi = mid,
        }
    }
    lo
}

/// All ranges containing `position`, innermost (smallest span) first.
///
/// `ranges` must be sorted by `(start_line, start_character)`. Only ranges
/// starting at or before the position can contain it, so the candidates are
/// the prefix found by binary search. That prefix is scanned in full: an
/// enclosing range may start arbitrarily far before the position, so no
/// earlier non-containing range ends the search. Cost is linear in the
/// prefix for each query.
pub fn find_ranges(ranges: &IndexMap<Id, RangeData>, position: Position) -> Vec<(&Id, &RangeData)> {
    let upper = upper_bound(ranges, position);
    let mut hits: Vec<(&Id, &RangeData)> = ranges
        .iter()
        .take(upper)
        .filter(|(_, range)| range.contains(position))
        .collect();
    // Later starts first among equal spans, then stable.
    hits.sort_by(|(_, a), (_, b)| {
        a.span()
            .cmp(&b.span())
            .then_with(|| b.start().cmp(&a.start()))
    });
    hits
}

pub fn find_innermost_range(
    ranges: &IndexMap<Id, RangeData>,
    position: Position,
) -> Option<(&Id, &RangeData)> {
    find_ranges(ranges, position).into_iter().next()
}
