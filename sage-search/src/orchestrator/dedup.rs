//! Document deduplication by canonical key.
//!
//! Groups fetched documents that refer to the same resource and keeps
//! exactly one per key: the one with the most text, ties going to the
//! lexicographically smaller URL. Applying it twice changes nothing.

use std::collections::BTreeMap;

use crate::types::FetchedDocument;

/// Collapse documents sharing a [`CanonicalKey`](super::url_normalize::CanonicalKey).
///
/// Output is ordered by key, so it does not depend on input order.
pub fn deduplicate(documents: Vec<FetchedDocument>) -> Vec<FetchedDocument> {
    let mut groups: BTreeMap<_, FetchedDocument> = BTreeMap::new();

    for document in documents {
        match groups.get_mut(&document.key) {
            Some(best) => {
                if preferred(&document, best) {
                    *best = document;
                }
            }
            None => {
                groups.insert(document.key.clone(), document);
            }
        }
    }

    groups.into_values().collect()
}

/// `true` if `challenger` should replace `incumbent` as the group representative.
fn preferred(challenger: &FetchedDocument, incumbent: &FetchedDocument) -> bool {
    challenger
        .char_length
        .cmp(&incumbent.char_length)
        .then_with(|| incumbent.canonical_url.cmp(&challenger.canonical_url))
        .is_gt()
}
