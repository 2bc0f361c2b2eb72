//! Top-N selection over ranked results.

use crate::types::RankedResult;

/// Take the first `count` results by rank.
///
/// With fewer survivors than `count`, every survivor is returned; the
/// output is never padded. `count` is the caller's number and nothing
/// here caps it further.
pub fn select(mut ranked: Vec<RankedResult>, count: usize) -> Vec<RankedResult> {
    ranked.sort_by_key(|r| r.rank);
    ranked.truncate(count);
    ranked
}
