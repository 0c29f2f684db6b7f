//! Order-preserving result aggregation.
//!
//! Results are written into a buffer pre-sized to the batch, by submission
//! index. Completion order never matters and nothing is appended.

use crate::error::FailureKind;
use crate::types::{ItemReport, ItemStatus};

/// Collects one terminal result per submitted item.
pub struct ResultAggregator {
    file_names: Vec<String>,
    slots: Vec<Option<ItemReport>>,
}

impl ResultAggregator {
    /// Create an aggregator for a batch whose item `i` is named `file_names[i]`.
    pub fn new(file_names: Vec<String>) -> Self {
        let slots = vec![None; file_names.len()];
        Self { file_names, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots still waiting for a result.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Store `report` in slot `report.index`.
    ///
    /// Returns `false` (and keeps the first result) if the index is out of
    /// range or the slot is already filled.
    pub fn record(&mut self, report: ItemReport) -> bool {
        let index = report.index;
        match self.slots.get_mut(index) {
            Some(slot @ None) => {
                *slot = Some(report);
                true
            }
            Some(Some(_)) => {
                tracing::error!(index, "Second result recorded for the same item, ignoring it");
                false
            }
            None => {
                tracing::error!(index, len = self.slots.len(), "Result index out of range");
                false
            }
        }
    }

    /// Produce the ordered report.
    ///
    /// A slot that never received a result becomes an internal failure so
    /// the report always has exactly one entry per submission.
    pub fn finish(self) -> Vec<ItemReport> {
        self.slots
            .into_iter()
            .zip(self.file_names)
            .enumerate()
            .map(|(index, (slot, file_name))| {
                slot.unwrap_or_else(|| {
                    tracing::error!(index, file = %file_name, "No result recorded for item");
                    ItemReport {
                        index,
                        file_name,
                        status: ItemStatus::Failed {
                            kind: FailureKind::Internal,
                            message: "no result was recorded for this item".to_string(),
                        },
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutputRef;
    use std::path::PathBuf;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("file{i}.jpg")).collect()
    }

    fn success(index: usize) -> ItemReport {
        let name = format!("{:06}_00000000.jpg", index + 1);
        ItemReport {
            index,
            file_name: format!("file{index}.jpg"),
            status: ItemStatus::Processed {
                output: OutputRef {
                    location: format!("s/h{index}/output/{name}"),
                    path: PathBuf::from("/w").join(&name),
                },
                sequence: index as u64 + 1,
            },
        }
    }

    #[test]
    fn test_out_of_order_results_come_back_in_order() {
        let mut agg = ResultAggregator::new(names(5));
        for index in [3, 0, 4, 1, 2] {
            assert!(agg.record(success(index)));
        }
        assert_eq!(agg.pending(), 0);

        let report = agg.finish();
        let indices: Vec<usize> = report.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_record_keeps_first() {
        let mut agg = ResultAggregator::new(names(2));
        assert!(agg.record(success(1)));
        let mut again = success(1);
        again.file_name = "other.jpg".into();
        assert!(!agg.record(again));

        let report = agg.finish();
        assert_eq!(report[1].file_name, "file1.jpg");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut agg = ResultAggregator::new(names(1));
        assert!(!agg.record(success(5)));
        assert_eq!(agg.pending(), 1);
    }

    #[test]
    fn test_missing_slot_becomes_internal_failure() {
        let mut agg = ResultAggregator::new(names(3));
        agg.record(success(0));
        agg.record(success(2));

        let report = agg.finish();
        assert_eq!(report.len(), 3);
        assert_eq!(report[1].file_name, "file1.jpg");
        assert_eq!(report[1].failure_kind(), Some(FailureKind::Internal));
    }

    #[test]
    fn test_empty() {
        let agg = ResultAggregator::new(Vec::new());
        assert!(agg.is_empty());
        assert!(agg.finish().is_empty());
    }
}
