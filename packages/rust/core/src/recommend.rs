//! Top-K candidate ranking per item.

use tracing::{debug, instrument};

use artmatch_shared::{Candidate, EnrichedItem, Recommendation, ScoredPair};

use crate::scoring::score_pair;

/// Keep the `top_k` best pairs, best first.
///
/// The sort is stable, so equal scores keep their input order.
pub fn rank(mut pairs: Vec<ScoredPair>, top_k: usize) -> Vec<ScoredPair> {
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score));
    pairs.truncate(top_k);
    pairs
}

/// Score `item` against every candidate and keep the `top_k` best.
pub fn recommend_for_item(
    item: &EnrichedItem,
    candidates: &[Candidate],
    attributes: &[String],
    top_k: usize,
) -> Recommendation {
    let pairs = candidates
        .iter()
        .map(|candidate| ScoredPair {
            item_id: item.id.clone(),
            candidate_id: candidate.id.clone(),
            score: score_pair(&item.record, &candidate.record, attributes),
        })
        .collect();

    Recommendation {
        item_id: item.id.clone(),
        matches: rank(pairs, top_k),
    }
}

/// Recommendations for every item, in item order.
#[instrument(skip_all, fields(items = items.len(), candidates = candidates.len(), top_k = top_k))]
pub fn recommend(
    items: &[EnrichedItem],
    candidates: &[Candidate],
    attributes: &[String],
    top_k: usize,
) -> Vec<Recommendation> {
    let recommendations: Vec<Recommendation> = items
        .iter()
        .map(|item| recommend_for_item(item, candidates, attributes, top_k))
        .collect();

    debug!(
        pairs = recommendations.iter().map(|r| r.matches.len()).sum::<usize>(),
        "ranked candidates"
    );
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use artmatch_shared::Record;

    fn pair(candidate: &str, score: f64) -> ScoredPair {
        ScoredPair {
            item_id: "A1".into(),
            candidate_id: candidate.into(),
            score,
        }
    }

    fn candidate(id: &str, styles: &str) -> Candidate {
        Candidate {
            id: id.into(),
            record: Record::from_pairs([("Buyer ID", id), ("Styles", styles)]),
        }
    }

    fn item(id: &str, styles: &str) -> EnrichedItem {
        EnrichedItem {
            id: id.into(),
            record: Record::from_pairs([("Artwork ID", id), ("Styles", styles)]),
            degraded: false,
        }
    }

    fn ids(rec: &Recommendation) -> Vec<&str> {
        rec.matches.iter().map(|p| p.candidate_id.as_str()).collect()
    }

    #[test]
    fn ties_keep_input_order() {
        let ranked = rank(vec![pair("C1", 0.8), pair("C2", 0.8), pair("C3", 0.3)], 2);
        let ids: Vec<&str> = ranked.iter().map(|p| p.candidate_id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2"]);

        let ranked = rank(vec![pair("C2", 0.8), pair("C1", 0.8)], 2);
        assert_eq!(ranked[0].candidate_id, "C2");
    }

    #[test]
    fn scores_from_records_rank_as_expected() {
        // 4/5 = 0.8 for C1 and C2, 3/10 = 0.3 for C3
        let item = item("A1", "a, b, c, d");
        let candidates = vec![
            candidate("C1", "a, b, c, d, e"),
            candidate("C2", "a, b, c, d, e"),
            candidate("C3", "a, b, c, e, f, g, h, i, j"),
        ];
        let attrs = vec!["Styles".to_string()];
        let rec = recommend_for_item(&item, &candidates, &attrs, 2);

        assert_eq!(ids(&rec), vec!["C1", "C2"]);
        assert!((rec.matches[0].score - 0.8).abs() < 1e-12);

        let all = recommend_for_item(&item, &candidates, &attrs, 10);
        assert_eq!(all.matches.len(), 3);
        assert!((all.matches[2].score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn length_is_min_of_k_and_candidates() {
        let candidates = vec![candidate("C1", "a"), candidate("C2", "b")];
        let attrs = vec!["Styles".to_string()];
        let item = item("A1", "a");
        for k in 0..4 {
            let rec = recommend_for_item(&item, &candidates, &attrs, k);
            assert_eq!(rec.matches.len(), k.min(candidates.len()));
        }
    }

    #[test]
    fn scores_are_non_increasing() {
        let candidates = vec![
            candidate("C1", "x"),
            candidate("C2", "a, b"),
            candidate("C3", "a"),
            candidate("C4", ""),
            candidate("C5", "a, b, c"),
        ];
        let attrs = vec!["Styles".to_string()];
        let rec = recommend_for_item(&item("A1", "a, b"), &candidates, &attrs, 5);
        assert!(rec.matches.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(rec.matches[0].candidate_id, "C2");
    }

    #[test]
    fn every_item_gets_a_recommendation_in_order() {
        let items = vec![item("A1", "a"), item("A2", "b"), item("A3", "")];
        let candidates = vec![candidate("C1", "a")];
        let attrs = vec!["Styles".to_string()];
        let recs = recommend(&items, &candidates, &attrs, 5);

        let item_ids: Vec<&str> = recs.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(item_ids, vec!["A1", "A2", "A3"]);
        assert_eq!(recs[0].matches[0].score, 1.0);
        assert_eq!(recs[2].matches[0].score, 0.0);
    }

    #[test]
    fn no_candidates_means_empty_matches() {
        let recs = recommend(&[item("A1", "a")], &[], &["Styles".to_string()], 5);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].matches.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ranking_is_bounded_sorted_and_stable(
                scores in prop::collection::vec(
                    prop_oneof![Just(0.0), Just(0.5), Just(1.0), 0.0..=1.0f64],
                    0..12,
                ),
                top_k in 0usize..15,
            ) {
                let pairs: Vec<ScoredPair> = scores
                    .iter()
                    .enumerate()
                    .map(|(i, &score)| pair(&i.to_string(), score))
                    .collect();
                let ranked = rank(pairs, top_k);

                prop_assert_eq!(ranked.len(), top_k.min(scores.len()));
                for w in ranked.windows(2) {
                    prop_assert!(w[0].score >= w[1].score);
                    if w[0].score == w[1].score {
                        let first: usize = w[0].candidate_id.parse().unwrap();
                        let second: usize = w[1].candidate_id.parse().unwrap();
                        prop_assert!(first < second);
                    }
                }
            }
        }
    }
}
