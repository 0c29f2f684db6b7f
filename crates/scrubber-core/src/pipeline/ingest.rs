//! Batch ingestion: accept → classify → pool → aggregate.
//!
//! Acceptance runs in submission order and is where unsupported or
//! oversized files are turned away, before they can hold a worker slot or
//! a sequence number. Everything accepted becomes a [`Job`] and runs on the
//! bounded pool, where the per-hash dedup claim decides whether the
//! transform runs at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::aggregate::ResultAggregator;
use super::hash::Hasher;
use super::pool::{Completion, WorkerPool};
use super::workspace::Workspace;
use crate::error::{PipelineError, PipelineResult};
use crate::session::{ordered_file_name, Session};
use crate::transform::{Transform, TransformRegistry};
use crate::types::{BatchReport, ItemReport, ItemStatus, Submission, SubmissionSource};

/// Observer invoked with each item's terminal report as it completes.
pub type ItemCallback = Arc<dyn Fn(&ItemReport) + Send + Sync>;

/// Per-batch options.
#[derive(Clone, Default)]
pub struct IngestOptions {
    /// Stop starting new work once cancelled; in-flight transforms are
    /// abandoned at their next suspension point
    pub cancel: Option<CancellationToken>,
    /// Progress observer; never affects the report
    pub on_item: Option<ItemCallback>,
}

impl IngestOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn on_item(mut self, callback: impl Fn(&ItemReport) + Send + Sync + 'static) -> Self {
        self.on_item = Some(Arc::new(callback));
        self
    }
}

/// One accepted submission.
struct Job {
    index: usize,
    file_name: String,
    source: SubmissionSource,
    extension: String,
    hash: String,
    sequence: u64,
    transform: Arc<dyn Transform>,
}

/// State shared by every worker of one batch.
struct BatchContext {
    session: Arc<Session>,
    workspace: Arc<Workspace>,
    cancel: CancellationToken,
    on_item: Option<ItemCallback>,
}

impl BatchContext {
    fn notify(&self, report: &ItemReport) {
        if let Some(callback) = &self.on_item {
            callback(report);
        }
    }
}

/// Runs batches against a workspace with a bounded pool.
pub struct Ingestor {
    transforms: Arc<TransformRegistry>,
    workspace: Arc<Workspace>,
    pool: WorkerPool,
    max_file_size_mb: u64,
}

impl Ingestor {
    pub fn new(
        transforms: Arc<TransformRegistry>,
        workspace: Arc<Workspace>,
        pool: WorkerPool,
        max_file_size_mb: u64,
    ) -> Self {
        Self {
            transforms,
            workspace,
            pool,
            max_file_size_mb,
        }
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Process a batch for `session` and return one report entry per
    /// submission, in submission order.
    pub async fn run(
        &self,
        session: Arc<Session>,
        submissions: Vec<Submission>,
        options: IngestOptions,
    ) -> BatchReport {
        let started = Instant::now();
        let total = submissions.len();
        tracing::info!(
            session = %session.token(),
            items = total,
            workers = self.pool.size(),
            "Starting batch"
        );

        let ctx = Arc::new(BatchContext {
            session: session.clone(),
            workspace: self.workspace.clone(),
            cancel: options.cancel.unwrap_or_default(),
            on_item: options.on_item,
        });

        let mut aggregator =
            ResultAggregator::new(submissions.iter().map(|s| s.file_name.clone()).collect());

        let mut jobs = Vec::with_capacity(total);
        for (index, submission) in submissions.into_iter().enumerate() {
            let file_name = submission.file_name.clone();
            if ctx.cancel.is_cancelled() {
                let error = PipelineError::Cancelled {
                    path: PathBuf::from(&file_name),
                };
                let report = ItemReport::failed(index, file_name, &error);
                ctx.notify(&report);
                aggregator.record(report);
                continue;
            }
            match self.accept(index, submission, &session).await {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(index, file = %file_name, "Rejected: {e}");
                    let report = ItemReport::failed(index, file_name, &e);
                    ctx.notify(&report);
                    aggregator.record(report);
                }
            }
        }

        let slots: Vec<(usize, String)> = jobs
            .iter()
            .map(|job| (job.index, job.file_name.clone()))
            .collect();

        let worker_ctx = ctx.clone();
        let completions = self
            .pool
            .run(jobs, &ctx.cancel, move |job| {
                let ctx = worker_ctx.clone();
                async move {
                    let report = process(&ctx, job).await;
                    ctx.notify(&report);
                    report
                }
            })
            .await;

        for ((index, file_name), completion) in slots.into_iter().zip(completions) {
            let report = match completion {
                Completion::Finished(report) => report,
                Completion::Cancelled => {
                    let error = PipelineError::Cancelled {
                        path: PathBuf::from(&file_name),
                    };
                    let report = ItemReport::failed(index, file_name, &error);
                    ctx.notify(&report);
                    report
                }
                Completion::Panicked(message) => {
                    let error = PipelineError::WorkerPanic {
                        path: PathBuf::from(&file_name),
                        message,
                    };
                    let report = ItemReport::failed(index, file_name, &error);
                    ctx.notify(&report);
                    report
                }
            };
            aggregator.record(report);
        }

        let report = BatchReport {
            session: session.token().to_string(),
            items: aggregator.finish(),
        };

        tracing::info!(
            session = %report.session,
            processed = report.processed(),
            deduplicated = report.deduplicated(),
            failed = report.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );
        report
    }

    /// Classify, size-check, hash and reserve a sequence number.
    async fn accept(
        &self,
        index: usize,
        submission: Submission,
        session: &Session,
    ) -> PipelineResult<Job> {
        let display_path = submission.display_path();
        let transform = self
            .transforms
            .resolve_path(Path::new(&submission.file_name))?;
        // resolve_path succeeded, so the extension exists
        let extension = submission.extension().unwrap_or_default();

        let size = match &submission.source {
            SubmissionSource::Bytes(bytes) => bytes.len() as u64,
            SubmissionSource::Path(path) => tokio::fs::metadata(path)
                .await
                .map_err(|e| PipelineError::io(path, e))?
                .len(),
        };
        let max_bytes = self.max_file_size_mb.saturating_mul(1024 * 1024);
        if size > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: display_path,
                size_mb: size / (1024 * 1024),
                max_mb: self.max_file_size_mb,
            });
        }

        let (source, hash) = hash_source(submission.source, &display_path).await?;
        let sequence = session.next_sequence();

        tracing::trace!(index, hash = %hash, sequence, "Accepted");
        Ok(Job {
            index,
            file_name: submission.file_name,
            source,
            extension,
            hash,
            sequence,
            transform,
        })
    }
}

async fn hash_source(
    source: SubmissionSource,
    display_path: &Path,
) -> PipelineResult<(SubmissionSource, String)> {
    let path = display_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let hash = match &source {
            SubmissionSource::Bytes(bytes) => Hasher::content_hash_from_bytes(bytes),
            SubmissionSource::Path(p) => {
                Hasher::content_hash(p).map_err(|e| PipelineError::io(p, e))?
            }
        };
        Ok::<_, PipelineError>((source, hash))
    })
    .await
    .map_err(|e| PipelineError::WorkerPanic {
        path,
        message: format!("hashing task failed: {e}"),
    })?
}

/// A path source is read once to hash it and again to stage it. Both reads
/// must have seen the same bytes, or the output would be filed under a hash
/// that does not match its content.
async fn verify_staged(staged: &Path, expected: &str, source: &Path) -> PipelineResult<()> {
    let staged_path = staged.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || Hasher::content_hash(&staged_path))
        .await
        .map_err(|e| PipelineError::WorkerPanic {
            path: source.to_path_buf(),
            message: format!("hashing task failed: {e}"),
        })?
        .map_err(|e| PipelineError::io(staged, e))?;

    if actual != expected {
        return Err(PipelineError::io(
            source,
            std::io::Error::other("file changed after it was accepted"),
        ));
    }
    Ok(())
}

async fn process(ctx: &BatchContext, job: Job) -> ItemReport {
    let index = job.index;
    match resolve(ctx, &job).await {
        Ok(status) => ItemReport {
            index,
            file_name: job.file_name,
            status,
        },
        Err(e) => {
            match &e {
                PipelineError::CacheRace { .. } => {
                    tracing::error!(index, file = %job.file_name, "{e}")
                }
                _ => tracing::warn!(index, file = %job.file_name, "Failed: {e}"),
            }
            ItemReport::failed(index, job.file_name, &e)
        }
    }
}

async fn resolve(ctx: &BatchContext, job: &Job) -> PipelineResult<ItemStatus> {
    let cancelled = || PipelineError::Cancelled {
        path: PathBuf::from(&job.file_name),
    };
    let token = ctx.session.token();

    let claim = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(cancelled()),
        claim = ctx.session.cache().claim(&job.hash) => claim,
    };

    if let Some(existing) = claim.existing() {
        tracing::debug!(
            session = %token,
            index = job.index,
            hash = %job.hash,
            output = %existing.location,
            "Dedup hit"
        );
        return Ok(ItemStatus::Deduplicated {
            output: existing.clone(),
        });
    }

    let dirs = ctx.workspace.prepare(token, &job.hash).await?;

    // Output left by an earlier process lifetime
    if let Some(existing) = ctx.workspace.existing_output(&dirs).await? {
        tracing::debug!(
            session = %token,
            index = job.index,
            hash = %job.hash,
            output = %existing.location,
            "Dedup hit on disk"
        );
        let output = claim.publish(existing)?;
        return Ok(ItemStatus::Deduplicated { output });
    }

    let output_extension = job.transform.output_extension();
    let file_name = ordered_file_name(job.sequence, output_extension);
    let staged = ctx
        .workspace
        .stage_input(&dirs, &job.source, &job.extension)
        .await?;
    if let SubmissionSource::Path(source) = &job.source {
        verify_staged(staged.path(), &job.hash, source).await?;
    }
    let pending = ctx.workspace.pending_output(&dirs, output_extension)?;

    let started = Instant::now();
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(cancelled()),
        result = job.transform.apply(staged.path(), pending.path()) => result?,
    }
    tracing::trace!(
        index = job.index,
        transform = job.transform.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Transformed"
    );
    drop(staged);

    let output = ctx.workspace.commit(pending, &dirs, &file_name)?;
    let output = claim.publish(output)?;
    tracing::debug!(
        session = %token,
        index = job.index,
        sequence = job.sequence,
        file = %output.file_name(),
        "Processed"
    );

    Ok(ItemStatus::Processed {
        output,
        sequence: job.sequence,
    })
}
