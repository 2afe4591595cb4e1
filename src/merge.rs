//! Shard merging.

use crate::worker::WorkerReport;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Check that every worker wrote its whole row range.
pub fn verify_reports(reports: &[WorkerReport]) -> Result<()> {
    for report in reports {
        if report.rows_written != report.expected_rows() {
            return Err(Error::IncompleteShard {
                index: report.index,
                expected: report.expected_rows(),
                found: report.rows_written,
            });
        }
    }
    Ok(())
}

/// Concatenate `shards` in order into `output`, returning the bytes written.
pub async fn merge_shards(shards: &[PathBuf], output: &Path) -> Result<u64> {
    let mut out = BufWriter::new(fs::File::create(output).await?);
    let mut total = 0u64;

    for shard in shards {
        let mut file = fs::File::open(shard).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open shard {:?}: {}", shard, e),
            ))
        })?;
        let copied = tokio::io::copy(&mut file, &mut out).await?;
        tracing::debug!("Merged {} bytes from {:?}", copied, shard);
        total += copied;
    }

    out.flush().await?;
    Ok(total)
}

/// Remove intermediate files, logging rather than failing on errors.
pub async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove {:?}: {}", path, e),
        }
    }
}
