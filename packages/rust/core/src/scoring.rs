//! Set-similarity scoring between an enriched item and a candidate.

use std::collections::BTreeSet;

use artmatch_shared::{Record, split_values};

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`; two empty sets score 0.0.
pub fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Mean per-attribute Jaccard similarity of two records.
///
/// An attribute is included only when at least one side has a value for
/// it; excluded attributes do not dilute the mean. With no included
/// attribute (or no attributes at all) the score is 0.0. Missing columns
/// read as empty. The result is always within `[0.0, 1.0]` and symmetric.
pub fn score_pair(item: &Record, candidate: &Record, attributes: &[String]) -> f64 {
    let mut total = 0.0;
    let mut included = 0usize;

    for attr in attributes {
        let item_values = split_values(item.value(attr));
        let candidate_values = split_values(candidate.value(attr));
        if item_values.is_empty() && candidate_values.is_empty() {
            continue;
        }
        total += jaccard(&item_values, &candidate_values);
        included += 1;
    }

    if included == 0 {
        0.0
    } else {
        total / included as f64
    }
}
