//! Scrubber Core - Embeddable media metadata-stripping pipeline.
//!
//! Scrubber takes batches of images and videos from a client session,
//! strips embedded metadata and writes normalized outputs: images are
//! re-encoded as upright JPEGs, videos are re-muxed to MP4 by an external
//! transcoder.
//!
//! # Architecture
//!
//! ```text
//! Submissions → Classify → Hash → Dedup claim → Transform → Ordered report
//!                  │                  │             │
//!            unsupported         cache hit    bounded worker pool
//! ```
//!
//! Every session keeps its own sequence counter and content cache across
//! batches until it sits idle for longer than the configured TTL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scrubber_core::{Config, Scrubber, Submission};
//!
//! #[tokio::main]
//! async fn main() -> scrubber_core::Result<()> {
//!     let scrubber = Scrubber::new(Config::load()?);
//!     let _sweeper = scrubber.start_session_sweeper();
//!
//!     let report = scrubber
//!         .ingest(None, vec![Submission::from_path("./IMG_0001.jpg")])
//!         .await;
//!     for item in &report.items {
//!         println!("{} → {:?}", item.file_name, item.output());
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod transform;
pub mod types;

use std::sync::Arc;

use session::is_valid_token;

// Re-exports for convenient access
pub use config::Config;
pub use error::{
    ConfigError, FailureKind, PipelineError, PipelineResult, Result, ScrubError,
};
pub use output::{OutputFormat, ReportWriter};
pub use pipeline::{IngestOptions, Ingestor, WorkerPool, Workspace};
pub use session::{Session, SessionRegistry};
pub use transform::{MediaKind, Transform, TransformRegistry};
pub use types::{BatchReport, ItemReport, ItemStatus, OutputRef, Submission, SubmissionSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Scrubber processor - the main entry point for batch ingestion.
pub struct Scrubber {
    config: Config,
    sessions: Arc<SessionRegistry>,
    ingestor: Ingestor,
}

impl Scrubber {
    /// Create a processor with the built-in image and video transforms.
    pub fn new(config: Config) -> Self {
        let transforms = TransformRegistry::from_config(&config);
        Self::with_transforms(config, transforms)
    }

    /// Create a processor with a custom transform registry.
    pub fn with_transforms(config: Config, transforms: TransformRegistry) -> Self {
        tracing::debug!(
            "Initializing Scrubber v{} (extensions: {})",
            VERSION,
            transforms.extensions().join(", ")
        );
        let ingestor = Ingestor::new(
            Arc::new(transforms),
            Arc::new(Workspace::new(config.work_dir())),
            WorkerPool::new(config.processing.parallel_workers),
            config.limits.max_file_size_mb,
        );
        Self {
            config,
            sessions: Arc::new(SessionRegistry::new()),
            ingestor,
        }
    }

    /// Create a processor with configuration loaded from the default path.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(Config::load()?))
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn workspace(&self) -> &Workspace {
        self.ingestor.workspace()
    }

    pub fn transforms(&self) -> &TransformRegistry {
        self.ingestor.transforms()
    }

    /// Process a batch under `token` (a new session if absent or unknown).
    pub async fn ingest(&self, token: Option<&str>, submissions: Vec<Submission>) -> BatchReport {
        self.ingest_with(token, submissions, IngestOptions::default())
            .await
    }

    /// Like [`ingest`](Self::ingest), with cancellation and progress hooks.
    pub async fn ingest_with(
        &self,
        token: Option<&str>,
        submissions: Vec<Submission>,
        options: IngestOptions,
    ) -> BatchReport {
        let session = self.open_session(token).await;
        let report = self.ingestor.run(session, submissions, options).await;
        // Long batches count as activity at both ends
        self.sessions.touch(&report.session);
        report
    }

    /// Find or create the session for `token`.
    ///
    /// A well-formed token that is not live may still own outputs on disk
    /// from an earlier run or an expired session. Its numbering continues
    /// after the highest of them so no sequence number is issued twice.
    async fn open_session(&self, token: Option<&str>) -> Arc<Session> {
        match token {
            Some(token) if is_valid_token(token) && !self.sessions.contains(token) => {
                let last = self.workspace().last_sequence(token).await;
                self.sessions.resume(token, last)
            }
            _ => self.sessions.get_or_create(token),
        }
    }

    /// Spawn the periodic idle-session sweep. Must be called from within a
    /// tokio runtime.
    pub fn start_session_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.sessions
            .spawn_sweeper(self.config.sweep_interval(), self.config.session_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_scrubber_new() {
        let mut config = Config::default();
        config.general.work_dir = "/tmp/scrubber-test-work".into();
        let scrubber = Scrubber::new(config);
        assert_eq!(scrubber.config().processing.parallel_workers, 5);
        assert_eq!(
            scrubber.workspace().root(),
            std::path::Path::new("/tmp/scrubber-test-work")
        );
        assert!(scrubber.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_creates_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.work_dir = dir.path().to_path_buf();
        let scrubber = Scrubber::new(config);

        let report = scrubber
            .ingest(
                Some("client-1"),
                vec![Submission::from_bytes("notes.txt", b"hello".to_vec())],
            )
            .await;
        assert_eq!(report.session, "client-1");
        assert!(scrubber.sessions().contains("client-1"));
        assert_eq!(
            report.items[0].failure_kind(),
            Some(FailureKind::UnsupportedType)
        );
    }
}
