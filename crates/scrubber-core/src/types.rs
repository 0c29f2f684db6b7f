//! Core data types: what callers submit and what a batch reports back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FailureKind, PipelineError};

/// Where a submission's bytes come from.
#[derive(Debug, Clone)]
pub enum SubmissionSource {
    /// Content already in memory (e.g. an uploaded form part)
    Bytes(Vec<u8>),
    /// Content on local disk, read when the batch is accepted
    Path(PathBuf),
}

/// One file handed to [`crate::Scrubber::ingest`].
#[derive(Debug, Clone)]
pub struct Submission {
    /// Original file name as provided by the client
    pub file_name: String,
    /// Content source
    pub source: SubmissionSource,
}

impl Submission {
    /// Submit in-memory content under the given original name.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            source: SubmissionSource::Bytes(bytes),
        }
    }

    /// Submit a file on disk; the file name is taken from the path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self {
            file_name,
            source: SubmissionSource::Path(path),
        }
    }

    /// Lowercased extension of the original file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(Path::new(&self.file_name))
    }

    /// Path used when reporting errors about this submission.
    pub fn display_path(&self) -> PathBuf {
        match &self.source {
            SubmissionSource::Path(path) => path.clone(),
            SubmissionSource::Bytes(_) => PathBuf::from(&self.file_name),
        }
    }
}

/// Lowercased extension of a path, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
}

/// Reference to a produced output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// Location relative to the work directory: `{session}/{hash}/output/{file}`
    pub location: String,
    /// Absolute path of the output file
    pub path: PathBuf,
}

impl OutputRef {
    /// The ordered file name of this output.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// The sequence number encoded in the ordered file name, if any.
    pub fn sequence(&self) -> Option<u64> {
        crate::session::sequence_of(self.file_name())
    }
}

/// Terminal state of one submitted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Newly transformed; consumed a sequence number
    Processed { output: OutputRef, sequence: u64 },
    /// Identical content was already processed in this session
    Deduplicated { output: OutputRef },
    /// The item failed; siblings are unaffected
    Failed { kind: FailureKind, message: String },
}

/// One slot of a batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Position of the item in the submitted batch
    pub index: usize,
    /// Original file name
    pub file_name: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemReport {
    pub fn failed(index: usize, file_name: impl Into<String>, error: &PipelineError) -> Self {
        Self {
            index,
            file_name: file_name.into(),
            status: ItemStatus::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, ItemStatus::Failed { .. })
    }

    /// Output reference for successful items.
    pub fn output(&self) -> Option<&OutputRef> {
        match &self.status {
            ItemStatus::Processed { output, .. } | ItemStatus::Deduplicated { output } => {
                Some(output)
            }
            ItemStatus::Failed { .. } => None,
        }
    }

    /// Failure classification for failed items.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            ItemStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Ordered outcome of one batch: `items[i]` belongs to submission `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Session token the batch ran under
    pub session: String,
    /// One entry per submission, in submission order
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that produced (or resolved to) an output.
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    /// Items that were newly transformed in this batch.
    pub fn processed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Processed { .. }))
            .count()
    }

    /// Items resolved from the dedup cache.
    pub fn deduplicated(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Deduplicated { .. }))
            .count()
    }

    /// Output references of successful items, in submission order.
    pub fn outputs(&self) -> impl Iterator<Item = &OutputRef> {
        self.items.iter().filter_map(ItemReport::output)
    }
}
