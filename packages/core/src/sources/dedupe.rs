//! Batch-local deduplication by identity key.

use std::collections::HashSet;

/// Anything that may carry an identity key.
pub trait Identified {
    fn identity_key(&self) -> Option<&str>;
}

/// Keep the first record for each identity key, preserving order.
///
/// Records without an identity key are always kept. The seen-set starts
/// empty on every call; no state carries over between batches. Returns the
/// survivors and the number of dropped duplicates.
pub fn dedupe<T: Identified>(records: Vec<T>) -> (Vec<T>, usize) {
    let total = records.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(total);

    let kept: Vec<T> = records
        .into_iter()
        .filter(|record| match record.identity_key() {
            Some(key) => seen.insert(key.to_string()),
            None => true,
        })
        .collect();

    let dropped = total - kept.len();
    if dropped > 0 {
        tracing::debug!("Dropped {} duplicate record(s) of {}", dropped, total);
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec {
        key: Option<String>,
        tag: &'static str,
    }

    impl Identified for Rec {
        fn identity_key(&self) -> Option<&str> {
            self.key.as_deref()
        }
    }

    fn rec(key: &str, tag: &'static str) -> Rec {
        Rec {
            key: Some(key.to_string()),
            tag,
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let batch = vec![rec("1", "A"), rec("2", "B"), rec("1", "C")];
        let (kept, dropped) = dedupe(batch);

        assert_eq!(kept, vec![rec("1", "A"), rec("2", "B")]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn records_without_key_pass_through() {
        let batch = vec![
            Rec { key: None, tag: "A" },
            Rec { key: None, tag: "B" },
        ];
        let (kept, dropped) = dedupe(batch.clone());

        assert_eq!(kept, batch);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn empty_batch_stays_empty() {
        let (kept, dropped) = dedupe(Vec::<Rec>::new());
        assert!(kept.is_empty());
        assert_eq!(dropped, 0);
    }

    fn batch_strategy() -> impl Strategy<Value = Vec<Rec>> {
        prop::collection::vec(
            (prop::option::of("[a-d]"), prop::sample::select(vec!["x", "y", "z"])),
            0..40,
        )
        .prop_map(|items| {
            items
                .into_iter()
                .map(|(key, tag)| Rec { key, tag })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_dedupe_is_idempotent(batch in batch_strategy()) {
            let (once, _) = dedupe(batch);
            let (twice, dropped) = dedupe(once.clone());
            prop_assert_eq!(twice, once);
            prop_assert_eq!(dropped, 0);
        }

        #[test]
        fn prop_survivors_are_first_occurrences_in_order(batch in batch_strategy()) {
            let (kept, dropped) = dedupe(batch.clone());

            let mut seen = HashSet::new();
            let expected: Vec<Rec> = batch
                .iter()
                .filter(|r| r.key.as_ref().map_or(true, |k| seen.insert(k.clone())))
                .cloned()
                .collect();

            prop_assert_eq!(dropped, batch.len() - expected.len());
            prop_assert_eq!(kept, expected);
        }
    }
}
