// src/similarity.rs
use std::collections::HashSet;
use tracing::{debug, info};

use crate::groups::GroupStore;
use crate::models::{Record, SimilarityPair, WalletIdentity};

/// Pairs must score strictly above this to be proposed.
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Unit-cost edit distance over chars, two-row DP.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / max_len`; two empty names are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Distinct recipient labels of cohort rows, first-seen order, no date filter.
fn distinct_recipients<'a>(records: &'a [Record], cohort_marker: &str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| r.in_cohort(cohort_marker))
        .map(|r| r.to_wallet.as_str())
        .filter(|label| seen.insert(*label))
        .collect()
}

/// Scores every unordered pair of unresolved wallets and returns those above
/// the threshold, best first. Equal scores keep enumeration order.
pub fn find_candidates(
    records: &[Record],
    store: &GroupStore,
    cohort_marker: &str,
) -> Vec<SimilarityPair> {
    let wallets: Vec<WalletIdentity> = distinct_recipients(records, cohort_marker)
        .into_iter()
        .map(WalletIdentity::from_label)
        .filter(|w| store.lookup_group(&w.address).is_none())
        .collect();

    info!("Found {} unresolved destination wallets", wallets.len());

    let mut pairs = Vec::new();
    for (i, first) in wallets.iter().enumerate() {
        for second in &wallets[i + 1..] {
            if first.address == second.address {
                continue;
            }

            let score = similarity(&first.display_name, &second.display_name);
            debug!(
                "Comparing {} with {}, similarity: {:.4}",
                first.display_name, second.display_name, score
            );

            if score > SIMILARITY_THRESHOLD {
                pairs.push(SimilarityPair {
                    first: first.clone(),
                    second: second.clone(),
                    score,
                });
            }
        }
    }

    // stable: ties stay in enumeration order
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score));

    info!("{} candidate pairs above {}", pairs.len(), SIMILARITY_THRESHOLD);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(label: &str, account: &str) -> Record {
        Record {
            to_wallet: label.to_string(),
            account: account.to_string(),
            ..Record::default()
        }
    }

    fn formula(addr: &str, name: &str) -> String {
        format!(r#"=HYPERLINK("https://etherscan.io/address/{addr}","{name}")"#)
    }

    #[test]
    fn test_levenshtein_classics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_similarity_of_near_duplicates() {
        let score = similarity("Alice Corp", "Alice Corporation");
        assert!((score - (1.0 - 7.0 / 17.0)).abs() < 1e-12);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_candidates_are_ranked_and_thresholded() {
        let records = vec![
            record(&formula("0xAA", "Alice Corp"), "cohort"),
            record(&formula("0xBB", "Alice Corp."), "cohort"),
            record(&formula("0xDD", "Alice Corpp"), "cohort"),
            record(&formula("0xZZ", "Zed"), "cohort"),
        ];
        let pairs = find_candidates(&records, &GroupStore::new(), "cohort");

        assert_eq!(pairs.len(), 3);
        assert!(pairs.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(pairs.iter().all(|p| p.score > SIMILARITY_THRESHOLD));
        assert!(pairs
            .iter()
            .all(|p| p.first.address != "0xZZ" && p.second.address != "0xZZ"));
    }

    #[test]
    fn test_score_exactly_at_threshold_is_not_proposed() {
        assert_eq!(levenshtein("abcdefghij", "abcdefgxyz"), 3);
        assert!(similarity("abcdefghij", "abcdefgxyz") <= SIMILARITY_THRESHOLD);

        let records = vec![
            record(&formula("0x01", "abcdefghij"), "cohort"),
            record(&formula("0x02", "abcdefgxyz"), "cohort"),
        ];
        assert!(find_candidates(&records, &GroupStore::new(), "cohort").is_empty());
    }

    #[test]
    fn test_ties_keep_enumeration_order() {
        let records = vec![
            record(&formula("0x01", "abcd"), "cohort"),
            record(&formula("0x02", "abce"), "cohort"),
            record(&formula("0x03", "abcf"), "cohort"),
        ];
        let pairs = find_candidates(&records, &GroupStore::new(), "cohort");
        let order: Vec<(&str, &str)> = pairs
            .iter()
            .map(|p| (p.first.address.as_str(), p.second.address.as_str()))
            .collect();
        assert_eq!(order, vec![("0x01", "0x02"), ("0x01", "0x03"), ("0x02", "0x03")]);
    }

    #[test]
    fn test_same_address_is_never_a_candidate() {
        let records = vec![
            record(&formula("0xCC", "Carol"), "cohort"),
            record(&formula("0xCC", "Carol Ltd"), "cohort"),
        ];
        assert!(find_candidates(&records, &GroupStore::new(), "cohort").is_empty());
    }

    #[test]
    fn test_non_cohort_rows_and_grouped_wallets_are_skipped() {
        let alice = WalletIdentity::from_label(&formula("0xAA", "Alice Corp"));
        let bob = WalletIdentity::from_label(&formula("0xBB", "Alice Corporation"));
        let mut store = GroupStore::new();
        store.merge(&alice, &bob);

        let records = vec![
            record(&formula("0xAA", "Alice Corp"), "cohort"),
            record(&formula("0xBB", "Alice Corporation"), "cohort"),
            record(&formula("0xCA", "Alice Corps"), "cohort"),
            record(&formula("0xDA", "Alice Corpse"), "grants"),
        ];
        assert!(find_candidates(&records, &store, "cohort").is_empty());
    }

    proptest! {
        #[test]
        fn prop_similarity_is_symmetric(a in ".{0,16}", b in ".{0,16}") {
            prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
            prop_assert_eq!(similarity(&a, &a), 1.0);
            let s = similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
