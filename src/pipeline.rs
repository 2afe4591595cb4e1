//! End-to-end HapMap to VCF conversion.
//!
//! 1. Normalize the HapMap file into a fixed-width grid plus reference tables.
//! 2. Render the VCF file header and per-row line headers.
//! 3. Partition the rows and run one [`ConversionWorker`] task per range.
//! 4. Verify the worker reports and merge the shards in row order.

use crate::grid::Ploidy;
use crate::hapmap::normalize_hapmap;
use crate::header::{render_file_header, render_line_headers};
use crate::merge::{merge_shards, remove_files, verify_reports};
use crate::worker::{ConversionWorker, WorkerReport};
use crate::{Error, Result};
use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Inputs to a conversion run.
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub workers: usize,
    pub ploidy: Option<Ploidy>,
    pub work_dir: Option<PathBuf>,
    pub keep_intermediates: bool,
}

impl ConversionOptions {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            workers: 1,
            ploidy: None,
            work_dir: None,
            keep_intermediates: false,
        }
    }

    /// Directory for the grid and shard files: the configured one, or the
    /// output's directory.
    pub fn effective_work_dir(&self) -> PathBuf {
        match (&self.work_dir, self.output.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn intermediate_path(&self, suffix: &str) -> PathBuf {
        let name = self
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hmpvcf".to_string());
        self.effective_work_dir().join(format!("{}.{}", name, suffix))
    }
}

/// Totals reported after a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    pub output: PathBuf,
    pub rows: usize,
    pub samples: usize,
    pub ploidy: usize,
    pub workers: usize,
    pub blank_cells: u64,
    pub malformed_cells: u64,
    pub bytes_written: u64,
}

/// Split `rows` into at most `workers` contiguous ranges whose sizes differ
/// by at most one.
pub fn partition_rows(rows: usize, workers: usize) -> Vec<Range<usize>> {
    if rows == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, rows);
    let base = rows / workers;
    let extra = rows % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Spawn every worker as its own task and wait for all of them.
pub async fn run_workers(workers: Vec<ConversionWorker>) -> Result<Vec<WorkerReport>> {
    let handles: Vec<_> = workers
        .into_iter()
        .map(|worker| {
            let index = worker.index();
            (index, tokio::spawn(worker.run()))
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    let mut first_error: Option<Error> = None;

    for (index, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(Error::WorkerFailed {
                index,
                message: e.to_string(),
            }),
            Err(join) => Err(Error::WorkerFailed {
                index,
                message: format!("task did not complete: {}", join),
            }),
        };
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {}
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}

async fn write_header_only(output: &Path, file_header: &str) -> Result<u64> {
    fs::write(output, file_header).await?;
    Ok(file_header.len() as u64)
}

/// Convert `options.input` into the VCF file `options.output`.
///
/// The grid and shard files are removed afterwards whether or not the
/// conversion succeeded, unless `keep_intermediates` is set.
pub async fn convert(options: &ConversionOptions) -> Result<ConversionSummary> {
    let work_dir = options.effective_work_dir();
    fs::create_dir_all(&work_dir).await?;

    let grid_path = options.intermediate_path("grid");
    let mut intermediates = vec![grid_path.clone()];
    let outcome = convert_with(options, &grid_path, &mut intermediates).await;

    if !options.keep_intermediates {
        remove_files(&intermediates).await;
    }
    outcome
}

/// Run the conversion, recording the shard files it creates in
/// `intermediates`.
async fn convert_with(
    options: &ConversionOptions,
    grid_path: &Path,
    intermediates: &mut Vec<PathBuf>,
) -> Result<ConversionSummary> {
    tracing::info!("Normalizing {:?}", options.input);
    let normalized = normalize_hapmap(&options.input, grid_path, options.ploidy).await?;

    let file_header = render_file_header(
        normalized.contigs(),
        normalized.samples.iter().map(String::as_str),
    )?;
    let rows = normalized.rows();
    let samples = normalized.samples.len();
    let ploidy = normalized.ploidy;

    if rows == 0 {
        tracing::info!("No marker rows in input; writing header only");
        let bytes_written = write_header_only(&options.output, &file_header).await?;
        return Ok(ConversionSummary {
            output: options.output.clone(),
            rows,
            samples,
            ploidy: ploidy.width(),
            workers: 0,
            blank_cells: 0,
            malformed_cells: 0,
            bytes_written,
        });
    }

    let line_headers = render_line_headers(
        &file_header,
        &normalized.markers,
        normalized.tables.catalogs(),
    )?;
    let tables = Arc::new(normalized.tables.build(line_headers)?);

    let ranges = partition_rows(rows, options.workers);
    let shards: Vec<PathBuf> = (0..ranges.len())
        .map(|i| options.intermediate_path(&format!("shard{:04}", i)))
        .collect();
    intermediates.extend(shards.iter().cloned());

    let workers = ranges
        .iter()
        .zip(&shards)
        .enumerate()
        .map(|(index, (range, shard))| {
            ConversionWorker::new(
                index,
                normalized.grid_path.clone(),
                shard.clone(),
                range.clone(),
                samples,
                Arc::clone(&tables),
                ploidy,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        "Converting {} rows x {} samples with {} workers",
        rows,
        samples,
        workers.len()
    );

    let reports = run_workers(workers).await?;
    verify_reports(&reports)?;
    let bytes_written = merge_shards(&shards, &options.output).await?;

    let summary = ConversionSummary {
        output: options.output.clone(),
        rows,
        samples,
        ploidy: ploidy.width(),
        workers: reports.len(),
        blank_cells: reports.iter().map(|r| r.blank_cells).sum(),
        malformed_cells: reports.iter().map(|r| r.malformed_cells).sum(),
        bytes_written,
    };

    if summary.malformed_cells > 0 {
        tracing::warn!(
            "{} cells could not be interpreted and were written as missing",
            summary.malformed_cells
        );
    }
    tracing::info!("Wrote {:?} ({} bytes)", summary.output, summary.bytes_written);

    Ok(summary)
}
