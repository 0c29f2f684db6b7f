//! On-disk layout of processed content.
//!
//! ```text
//! {work_dir}/{session}/{hash}/input/    staged uploads and pending outputs
//! {work_dir}/{session}/{hash}/output/   finished output (dedup signal)
//! ```
//!
//! Transforms never write into `output/` directly. They write a pending
//! file next to the staged input, which is renamed into `output/` only
//! after the transform succeeded, so a file under `output/` is always
//! complete. Staged inputs and abandoned pending outputs are temp-file
//! guards and disappear on every exit path.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};
use crate::session::sequence_of;
use crate::types::{OutputRef, SubmissionSource};

/// Root of all session directories.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

/// Directories of one `(session, hash)` entry.
#[derive(Debug, Clone)]
pub struct EntryDirs {
    session: String,
    hash: String,
    input: PathBuf,
    output: PathBuf,
}

impl EntryDirs {
    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Work-dir-relative location of an output file in this entry.
    pub fn location(&self, file_name: &str) -> String {
        format!("{}/{}/output/{}", self.session, self.hash, file_name)
    }

    fn output_ref(&self, file_name: &str) -> OutputRef {
        OutputRef {
            location: self.location(file_name),
            path: self.output.join(file_name),
        }
    }
}

/// Copy of a submission inside the entry's `input/` area.
///
/// Removed from disk when dropped.
#[derive(Debug)]
pub struct StagedInput {
    path: TempPath,
}

impl StagedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Where a transform writes its result before it is committed.
///
/// Removed from disk when dropped without [`Workspace::commit`].
#[derive(Debug)]
pub struct PendingOutput {
    path: TempPath,
}

impl PendingOutput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, token: &str) -> PathBuf {
        self.root.join(token)
    }

    /// Paths for an entry, without touching the filesystem.
    pub fn entry(&self, token: &str, hash: &str) -> EntryDirs {
        let base = self.session_dir(token).join(hash);
        EntryDirs {
            session: token.to_string(),
            hash: hash.to_string(),
            input: base.join("input"),
            output: base.join("output"),
        }
    }

    /// Create the entry's `input/` and `output/` directories.
    pub async fn prepare(&self, token: &str, hash: &str) -> PipelineResult<EntryDirs> {
        let dirs = self.entry(token, hash);
        for dir in [&dirs.input, &dirs.output] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PipelineError::io(dir, e))?;
        }
        Ok(dirs)
    }

    /// Finished output already on disk for this entry.
    ///
    /// This is how content processed by an earlier run of the process is
    /// recognized. If several files exist the first by name wins.
    pub async fn existing_output(&self, dirs: &EntryDirs) -> PipelineResult<Option<OutputRef>> {
        let mut entries = match tokio::fs::read_dir(&dirs.output).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PipelineError::io(&dirs.output, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::io(&dirs.output, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_file && !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort();
        Ok(names.first().map(|name| dirs.output_ref(name)))
    }

    /// Highest sequence number among a session's finished outputs, 0 if it
    /// has none.
    pub async fn last_sequence(&self, token: &str) -> u64 {
        let session_dir = self.session_dir(token);
        match tokio::task::spawn_blocking(move || scan_last_sequence(&session_dir)).await {
            Ok(last) => last,
            Err(e) => {
                tracing::error!(session = %token, "Sequence scan failed: {e}");
                0
            }
        }
    }

    /// Write the submission's bytes into the entry's `input/` area.
    pub async fn stage_input(
        &self,
        dirs: &EntryDirs,
        source: &SubmissionSource,
        extension: &str,
    ) -> PipelineResult<StagedInput> {
        let path = temp_path_in(&dirs.input, "upload-", extension)?;
        match source {
            SubmissionSource::Bytes(bytes) => tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| PipelineError::io(&*path, e))?,
            SubmissionSource::Path(src) => {
                tokio::fs::copy(src, &path)
                    .await
                    .map_err(|e| PipelineError::io(src, e))?;
            }
        }
        Ok(StagedInput { path })
    }

    /// Reserve a pending output path with the given extension.
    pub fn pending_output(&self, dirs: &EntryDirs, extension: &str) -> PipelineResult<PendingOutput> {
        Ok(PendingOutput {
            path: temp_path_in(&dirs.input, "pending-", extension)?,
        })
    }

    /// Move a finished pending output into `output/` under `file_name`.
    pub fn commit(
        &self,
        pending: PendingOutput,
        dirs: &EntryDirs,
        file_name: &str,
    ) -> PipelineResult<OutputRef> {
        let output = dirs.output_ref(file_name);
        pending
            .path
            .persist(&output.path)
            .map_err(|e| PipelineError::io(&output.path, e.error))?;
        Ok(output)
    }

    /// Remove everything under the root and recreate it empty.
    pub async fn clean(&self) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&self.root).await?;
        tracing::info!(root = %self.root.display(), "Cleaned work directory");
        Ok(())
    }
}

/// `{session}/{hash}/output/{file}` is three levels below the session.
fn scan_last_sequence(session_dir: &Path) -> u64 {
    WalkDir::new(session_dir)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry.path().parent().and_then(Path::file_name) == Some(OsStr::new("output"))
        })
        .filter_map(|entry| entry.file_name().to_str().and_then(sequence_of))
        .max()
        .unwrap_or(0)
}

fn temp_path_in(dir: &Path, prefix: &str, extension: &str) -> PipelineResult<TempPath> {
    let suffix = format!(".{extension}");
    Builder::new()
        .prefix(prefix)
        .suffix(&suffix)
        .tempfile_in(dir)
        .map(|file| file.into_temp_path())
        .map_err(|e| PipelineError::io(dir, e))
}
