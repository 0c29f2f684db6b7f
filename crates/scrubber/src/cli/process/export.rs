//! Copy finished outputs out of the work directory.

use std::collections::HashSet;
use std::path::Path;

use scrubber_core::BatchReport;

/// Copy every successful output into `dir` under its ordered file name.
///
/// Deduplicated items share an output with an earlier item, so each
/// output file is copied at most once. Returns the number of files copied.
pub async fn export_outputs(report: &BatchReport, dir: &Path) -> anyhow::Result<usize> {
    tokio::fs::create_dir_all(dir).await?;

    let mut seen = HashSet::new();
    let mut copied = 0;
    for output in report.outputs() {
        if !seen.insert(output.location.as_str()) {
            continue;
        }
        let target = dir.join(output.file_name());
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tracing::debug!("Already exported: {}", target.display());
            continue;
        }
        tokio::fs::copy(&output.path, &target).await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to export {} to {}: {e}",
                output.path.display(),
                target.display()
            )
        })?;
        copied += 1;
    }

    tracing::info!("Exported {copied} file(s) to {}", dir.display());
    Ok(copied)
}
