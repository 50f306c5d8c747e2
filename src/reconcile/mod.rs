//! Record reconciliation.
//!
//! Records are offered one at a time in scan order. The first record for a
//! key is stored as the group's winner; every later record with the same key
//! is compared against the current winner with [`tiebreak::break_tie`], and
//! each comparison is written to a [`DecisionSink`]. Once all records have
//! been offered, [`Reconciler::finish`] yields one [`Decision`] per key in
//! first-seen order.

pub mod admission;
pub mod key;
pub mod tiebreak;

pub use admission::{AdmissionFilter, Rejection};
pub use key::{AccessionKey, FileNameKey, KeyExtraction, KeyExtractor};
pub use tiebreak::{break_tie, TieBreakRule, Timestamp, Winner};

use crate::io::decision_log::{DecisionSink, LogEntry};
use indexmap::map::Entry;
use indexmap::IndexMap;
use log::debug;

/// An identifier together with the signals derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub identifier: String,
    pub key: KeyExtraction,
    pub timestamp: Option<Timestamp>,
}

impl Record {
    pub fn new(identifier: impl Into<String>, extractor: &dyn KeyExtractor) -> Self {
        let identifier = identifier.into();
        let key = extractor.extract(&identifier);
        let timestamp = Timestamp::extract(&identifier);
        Record {
            identifier,
            key,
            timestamp,
        }
    }

    pub fn key(&self) -> &str {
        self.key.key()
    }

    /// Timestamp text for logs and tables, `NA` when absent.
    pub fn signal(&self) -> String {
        self.timestamp
            .as_ref()
            .map_or_else(|| "NA".to_string(), |ts| ts.raw.clone())
    }
}

/// A record that lost a comparison, and the rule that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub record: Record,
    pub rule: TieBreakRule,
}

/// Final state of one key: exactly one chosen record, the rest rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub key: String,
    pub chosen: Record,
    pub rejected: Vec<Rejected>,
}

impl Decision {
    pub fn group_size(&self) -> usize {
        1 + self.rejected.len()
    }

    pub fn is_singleton(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// What happened when a record was offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First record for its key.
    Stored,
    /// Displaced the previous winner.
    Replaced(TieBreakRule),
    /// Lost to the current winner.
    Retained(TieBreakRule),
}

/// Insertion-ordered key → winner state.
pub struct Reconciler<'a> {
    extractor: &'a dyn KeyExtractor,
    marker: String,
    groups: IndexMap<String, Decision>,
}

impl<'a> Reconciler<'a> {
    pub fn new(extractor: &'a dyn KeyExtractor, marker: impl Into<String>) -> Self {
        Reconciler {
            extractor,
            marker: marker.into(),
            groups: IndexMap::new(),
        }
    }

    /// Builds a record from an identifier and offers it.
    pub fn offer_identifier(
        &mut self,
        identifier: impl Into<String>,
        sink: &mut dyn DecisionSink,
    ) -> Transition {
        let record = Record::new(identifier, self.extractor);
        self.offer(record, sink)
    }

    /// Offers a record to the group of its key.
    ///
    /// The first record of a key is stored without a log entry. Every later
    /// one is tie-broken against the current winner and the outcome is sent
    /// to `sink`, whichever side wins.
    ///
    /// # Arguments
    ///
    /// * `record` - The incoming record
    /// * `sink` - Receives one `duplicate` entry per comparison
    ///
    /// # Returns
    ///
    /// * What happened to the group
    pub fn offer(&mut self, record: Record, sink: &mut dyn DecisionSink) -> Transition {
        let group = match self.groups.entry(record.key().to_string()) {
            Entry::Vacant(slot) => {
                debug!("New key {} from {}", slot.key(), record.identifier);
                let key = slot.key().clone();
                slot.insert(Decision {
                    key,
                    chosen: record,
                    rejected: Vec::new(),
                });
                return Transition::Stored;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let tie = break_tie(&group.chosen.identifier, &record.identifier, &self.marker);
        match tie.winner {
            Winner::Incoming => {
                sink.record(&LogEntry::replaced(&record, &group.chosen, tie.rule));
                let previous = std::mem::replace(&mut group.chosen, record);
                group.rejected.push(Rejected {
                    record: previous,
                    rule: tie.rule,
                });
                Transition::Replaced(tie.rule)
            }
            Winner::Existing => {
                sink.record(&LogEntry::retained(&group.chosen, &record, tie.rule));
                group.rejected.push(Rejected {
                    record,
                    rule: tie.rule,
                });
                Transition::Retained(tie.rule)
            }
        }
    }

    /// One decision per key, in the order keys were first seen.
    pub fn finish(self) -> Vec<Decision> {
        self.groups.into_values().collect()
    }
}

/// Reconciles a sequence of identifiers in order.
///
/// # Arguments
///
/// * `identifiers` - Record identifiers, earliest first
/// * `extractor` - Derives the grouping key of each identifier
/// * `marker` - Substring preferred by the second tie-break rule
/// * `sink` - Receives every comparison
///
/// # Returns
///
/// * One decision per key, in first-seen order
pub fn reconcile<I, S>(
    identifiers: I,
    extractor: &dyn KeyExtractor,
    marker: &str,
    sink: &mut dyn DecisionSink,
) -> Vec<Decision>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut reconciler = Reconciler::new(extractor, marker);
    for identifier in identifiers {
        reconciler.offer_identifier(identifier, sink);
    }
    reconciler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::decision_log::LogCategory;
    use proptest::prelude::*;

    fn dash_keys() -> AccessionKey {
        AccessionKey::with_separators("-_.")
    }

    #[test]
    fn test_singleton_group_has_no_log_entries() {
        let extractor = dash_keys();
        let mut log: Vec<LogEntry> = Vec::new();
        let decisions = reconcile(["sampleZ_1.fastq.gz"], &extractor, "post", &mut log);

        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].is_singleton());
        assert_eq!(decisions[0].chosen.identifier, "sampleZ_1.fastq.gz");
        assert!(log.is_empty());
    }

    #[test]
    fn test_later_date_chosen() {
        let extractor = dash_keys();
        let mut log: Vec<LogEntry> = Vec::new();
        let decisions = reconcile(
            [
                "sampleA-2021-05-01_run.fastq.gz",
                "sampleA-2021-06-10_run.fastq.gz",
            ],
            &extractor,
            "post",
            &mut log,
        );

        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].key, "sampleA");
        assert_eq!(decisions[0].chosen.identifier, "sampleA-2021-06-10_run.fastq.gz");
        assert_eq!(decisions[0].rejected[0].rule, TieBreakRule::Timestamp);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].category, LogCategory::Duplicate);
        assert_eq!(log[0].chosen_timestamp.as_deref(), Some("2021-06-10"));
        assert_eq!(log[0].excluded_timestamp.as_deref(), Some("2021-05-01"));
    }

    #[test]
    fn test_post_marker_chosen() {
        let extractor = dash_keys();
        let mut log: Vec<LogEntry> = Vec::new();
        let decisions = reconcile(
            ["sampleB_v1.fastq.gz", "sampleB_post_v1.fastq.gz"],
            &extractor,
            "post",
            &mut log,
        );

        assert_eq!(decisions[0].chosen.identifier, "sampleB_post_v1.fastq.gz");
        assert_eq!(decisions[0].rejected[0].rule, TieBreakRule::Marker);
        assert_eq!(log[0].chosen_timestamp.as_deref(), Some("NA"));
    }

    #[test]
    fn test_three_way_group() {
        let extractor = dash_keys();
        let mut log: Vec<LogEntry> = Vec::new();
        let mut reconciler = Reconciler::new(&extractor, "post");

        assert_eq!(
            reconciler.offer_identifier("sampleC-2020-01-01.fq", &mut log),
            Transition::Stored
        );
        assert_eq!(
            reconciler.offer_identifier("sampleC-2020-03-01.fq", &mut log),
            Transition::Replaced(TieBreakRule::Timestamp)
        );
        assert_eq!(
            reconciler.offer_identifier("sampleC-2020-02-01.fq", &mut log),
            Transition::Retained(TieBreakRule::Timestamp)
        );
        let decisions = reconciler.finish();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].chosen.identifier, "sampleC-2020-03-01.fq");
        assert_eq!(decisions[0].rejected.len(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_keys_keep_first_seen_order() {
        let extractor = dash_keys();
        let mut log: Vec<LogEntry> = Vec::new();
        let decisions = reconcile(
            ["zeta_1.fq", "alpha_1.fq", "zeta_2.fq", "mid_1.fq"],
            &extractor,
            "post",
            &mut log,
        );
        let keys: Vec<&str> = decisions.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(decisions[0].chosen.identifier, "zeta_1.fq");
        assert_eq!(decisions[0].rejected[0].rule, TieBreakRule::FirstSeen);
    }

    fn identifier_strategy() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["s1", "s2", "s3"]),
            prop::option::of(1u32..28),
            any::<bool>(),
            0u8..4,
        )
            .prop_map(|(key, day, post, n)| {
                let date = day.map_or(String::new(), |d| format!("-2021-01-{:02}", d));
                let marker = if post { "_post" } else { "" };
                format!("{key}{date}{marker}_{n}.fastq.gz")
            })
    }

    proptest! {
        #[test]
        fn prop_one_chosen_per_group(ids in prop::collection::vec(identifier_strategy(), 0..24)) {
            let extractor = dash_keys();
            let mut log: Vec<LogEntry> = Vec::new();
            let decisions = reconcile(ids.clone(), &extractor, "post", &mut log);

            let total: usize = decisions.iter().map(Decision::group_size).sum();
            prop_assert_eq!(total, ids.len());
            prop_assert_eq!(log.len(), ids.len() - decisions.len());
            for decision in &decisions {
                prop_assert_eq!(decision.chosen.key(), decision.key.as_str());
                for rejected in &decision.rejected {
                    prop_assert_eq!(rejected.record.key(), decision.key.as_str());
                }
            }
        }

        #[test]
        fn prop_deterministic(ids in prop::collection::vec(identifier_strategy(), 0..24)) {
            let extractor = dash_keys();
            let first = reconcile(ids.clone(), &extractor, "post", &mut Vec::<LogEntry>::new());
            let second = reconcile(ids, &extractor, "post", &mut Vec::<LogEntry>::new());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_marker_wins_in_either_order(n in 0u8..10, swap in any::<bool>()) {
            let plain = format!("sampleM_{n}.fastq.gz");
            let marked = format!("sampleM_POST_{n}.fastq.gz");
            let ids = if swap { vec![marked.clone(), plain] } else { vec![plain, marked.clone()] };

            let extractor = dash_keys();
            let decisions = reconcile(ids, &extractor, "post", &mut Vec::<LogEntry>::new());
            prop_assert_eq!(decisions.len(), 1);
            prop_assert_eq!(&decisions[0].chosen.identifier, &marked);
        }
    }
}
