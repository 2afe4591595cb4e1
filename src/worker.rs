//! Conversion worker.
//!
//! A worker owns one contiguous row range of the normalized grid. For each
//! row it decodes every sample cell, encodes it as a `GT` token and writes
//! one VCF line to its own shard file:
//!
//! ```text
//! <line header>\t<token 0>\t...\t<token n-1>\n
//! ```
//!
//! Malformed cells are replaced with a ploidy-wide `.` token and logged; I/O
//! failures end the worker with an error.

use crate::genotype::{Genotype, Malformed, encode_genotype};
use crate::grid::{FileGrid, GridGeometry, GridSource, Ploidy, decode_symbol};
use crate::tables::ReferenceTables;
use crate::{Error, Result};
use serde::Serialize;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Outcome of a completed worker run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub index: usize,
    pub start_row: usize,
    pub end_row: usize,
    pub rows_written: usize,
    pub blank_cells: u64,
    pub malformed_cells: u64,
}

impl WorkerReport {
    pub fn expected_rows(&self) -> usize {
        self.end_row - self.start_row
    }
}

/// Converts rows `[rows.start, rows.end)` of a grid into one output shard.
#[derive(Debug)]
pub struct ConversionWorker {
    index: usize,
    input: PathBuf,
    output: PathBuf,
    rows: Range<usize>,
    geometry: GridGeometry,
    tables: Arc<ReferenceTables>,
}

impl ConversionWorker {
    /// Validate the worker's parameters before any file is touched.
    pub fn new(
        index: usize,
        input: PathBuf,
        output: PathBuf,
        rows: Range<usize>,
        total_columns: usize,
        tables: Arc<ReferenceTables>,
        ploidy: Ploidy,
    ) -> Result<Self> {
        if rows.start > rows.end {
            return Err(Error::InvalidGeometry(format!(
                "start row {} is after end row {}",
                rows.start, rows.end
            )));
        }

        let geometry = GridGeometry::new(total_columns, ploidy);
        // Offsets grow in row-major order, so the last cell bounds them all.
        if !rows.is_empty() && total_columns > 0 {
            geometry.offset((rows.end - 1) as u64, (total_columns - 1) as u64)?;
        }

        if rows.end > tables.line_header_count() {
            return Err(Error::InvalidGeometry(format!(
                "rows {}..{} exceed the {} available line headers",
                rows.start,
                rows.end,
                tables.line_header_count()
            )));
        }

        Ok(Self {
            index,
            input,
            output,
            rows,
            geometry,
            tables,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Open the grid and the shard, convert every row, and flush.
    pub async fn run(self) -> Result<WorkerReport> {
        tracing::debug!(
            worker = self.index,
            "Converting rows {}..{} into {:?}",
            self.rows.start,
            self.rows.end,
            self.output
        );

        let result = self.run_files().await;
        if let Err(e) = &result {
            tracing::error!(
                worker = self.index,
                error_type = e.error_type(),
                "Worker failed on rows {}..{} ({:?} -> {:?}): {}",
                self.rows.start,
                self.rows.end,
                self.input,
                self.output,
                e
            );
        }
        result
    }

    async fn run_files(&self) -> Result<WorkerReport> {
        let mut grid = FileGrid::open(&self.input).await?;
        let mut shard = BufWriter::new(fs::File::create(&self.output).await?);
        let report = self.convert(&mut grid, &mut shard).await?;
        shard.flush().await?;
        Ok(report)
    }

    /// Convert the row range from `grid` into `out`.
    pub async fn convert<G, W>(&self, grid: &mut G, out: &mut W) -> Result<WorkerReport>
    where
        G: GridSource,
        W: AsyncWrite + Unpin + Send,
    {
        let columns = self.geometry.total_columns as usize;
        let ploidy = self.geometry.ploidy;

        let mut report = WorkerReport {
            index: self.index,
            start_row: self.rows.start,
            end_row: self.rows.end,
            ..Default::default()
        };
        // A row is read in one piece, up to the last symbol of its last cell;
        // the trailing delimiter is never read.
        let span = match columns {
            0 => 0,
            _ => self.geometry.row_width()? - 1,
        };
        let span = usize::try_from(span).map_err(|_| {
            Error::InvalidGeometry(format!("row of {} bytes does not fit in memory", span))
        })?;
        let mut row_bytes = vec![0u8; span];
        let mut entry = String::with_capacity(ploidy.width());
        let mut tokens: Vec<String> = Vec::with_capacity(columns);

        for row in self.rows.clone() {
            tokens.clear();

            let mut row_start = 0;
            if columns > 0 {
                row_start = self.geometry.offset(row as u64, 0)?;
                grid.read_at(row_start, &mut row_bytes).await?;
            }

            for col in 0..columns {
                let cell = (self.geometry.offset(row as u64, col as u64)? - row_start) as usize;
                let raw = &row_bytes[cell..cell + ploidy.width()];

                entry.clear();
                entry.extend(raw.iter().copied().map(decode_symbol));

                let token = match encode_genotype(
                    &entry,
                    self.tables.strand(row),
                    self.tables.alleles(row),
                    ploidy,
                ) {
                    Ok(genotype) => {
                        if genotype == Genotype::Blank {
                            report.blank_cells += 1;
                            tracing::debug!(
                                worker = self.index,
                                row,
                                col,
                                "Cell contains no data"
                            );
                        }
                        genotype.into_token()
                    }
                    Err(reason) => {
                        report.malformed_cells += 1;
                        self.log_malformed(row, col, &reason);
                        ploidy.missing_token()
                    }
                };
                tokens.push(token);
            }

            let header = self.tables.line_header(row).ok_or_else(|| {
                Error::InvalidGeometry(format!("no line header for row {}", row))
            })?;
            let mut line = String::with_capacity(header.len() + columns * ploidy.width() * 2 + 1);
            line.push_str(header);
            for token in &tokens {
                line.push('\t');
                line.push_str(token);
            }
            line.push('\n');
            out.write_all(line.as_bytes()).await?;
            report.rows_written += 1;
        }

        tracing::debug!(
            worker = self.index,
            rows = report.rows_written,
            blank = report.blank_cells,
            malformed = report.malformed_cells,
            "Worker finished"
        );
        Ok(report)
    }

    fn log_malformed(&self, row: usize, col: usize, reason: &Malformed) {
        tracing::warn!(
            worker = self.index,
            row,
            col,
            "Skipping input, possible malformed HapMap file: {}",
            reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::{AlleleCatalog, Strand};
    use crate::grid::MemoryGrid;

    fn tables(rows: &[(&str, Strand, &str)]) -> Arc<ReferenceTables> {
        Arc::new(ReferenceTables::new(
            rows.iter().map(|(c, _, _)| AlleleCatalog::from_csv(c)).collect(),
            rows.iter().map(|(_, s, _)| *s).collect(),
            rows.iter().map(|(_, _, h)| h.to_string()).collect(),
        ))
    }

    fn worker(
        rows: Range<usize>,
        columns: usize,
        tables: Arc<ReferenceTables>,
        ploidy: usize,
    ) -> ConversionWorker {
        ConversionWorker::new(
            0,
            PathBuf::from("grid.bin"),
            PathBuf::from("shard.vcf"),
            rows,
            columns,
            tables,
            Ploidy::new(ploidy).unwrap(),
        )
        .unwrap()
    }

    async fn convert(worker: &ConversionWorker, grid: &[u8]) -> (String, WorkerReport) {
        let mut grid = MemoryGrid::new(grid.to_vec());
        let mut out: Vec<u8> = Vec::new();
        let report = worker.convert(&mut grid, &mut out).await.unwrap();
        (String::from_utf8(out).unwrap(), report)
    }

    #[tokio::test]
    async fn test_converts_rows_in_column_order() {
        let tables = tables(&[
            ("A,G", Strand::Forward, "r0"),
            ("C,T", Strand::Reverse, "r1"),
        ]);
        let w = worker(0..2, 3, tables, 2);
        let (text, report) = convert(&w, b"AA,AG,GG,CT,TT,C-,").await;
        assert_eq!(text, "r0\t0/0\t0/1\t1/1\nr1\t1/0\t1/1\t./0\n");
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.expected_rows(), 2);
        assert_eq!(report.malformed_cells, 0);
    }

    #[tokio::test]
    async fn test_sub_range_uses_absolute_offsets() {
        let tables = tables(&[
            ("A,G", Strand::Forward, "r0"),
            ("A,G", Strand::Forward, "r1"),
            ("A,G", Strand::Forward, "r2"),
        ]);
        let w = worker(1..3, 2, tables, 2);
        let (text, report) = convert(&w, b"AA,AA,AG,GA,GG,NN,").await;
        assert_eq!(text, "r1\t0/1\t1/0\nr2\t1/1\t./.\n");
        assert_eq!(report.start_row, 1);
        assert_eq!(report.end_row, 3);
    }

    #[tokio::test]
    async fn test_blank_cell_placeholder() {
        let tables = tables(&[("A,G", Strand::Forward, "r0")]);
        let w = worker(0..1, 2, tables, 3);
        let (text, report) = convert(&w, b"   ,AGA,").await;
        assert_eq!(text, "r0\t./.\t0/1/0\n");
        assert_eq!(report.blank_cells, 1);
    }

    #[tokio::test]
    async fn test_missing_table_entries_fall_back() {
        // Strand table shorter than the row range.
        let tables = Arc::new(ReferenceTables::new(
            vec![AlleleCatalog::from_csv("A,G"), AlleleCatalog::from_csv("A,G")],
            vec![Strand::Forward],
            vec!["r0".to_string(), "r1".to_string()],
        ));
        let w = worker(0..2, 1, tables, 3);
        let (text, report) = convert(&w, b"AAG,GGA,").await;
        assert_eq!(text, "r0\t0/0/1\nr1\t././.\n");
        assert_eq!(report.malformed_cells, 1);
        assert_eq!(report.rows_written, 2);
    }

    #[tokio::test]
    async fn test_no_samples_writes_headers_only() {
        let tables = tables(&[("A", Strand::Forward, "r0"), ("A", Strand::Forward, "r1")]);
        let w = worker(0..2, 0, tables, 2);
        let (text, _) = convert(&w, b"").await;
        assert_eq!(text, "r0\nr1\n");
    }

    #[tokio::test]
    async fn test_truncated_grid_is_fatal() {
        let tables = tables(&[("A,G", Strand::Forward, "r0"), ("A,G", Strand::Forward, "r1")]);
        let w = worker(0..2, 2, tables, 2);
        let mut grid = MemoryGrid::new(&b"AA,AG,GG,"[..]);
        let mut out: Vec<u8> = Vec::new();
        let err = w.convert(&mut grid, &mut out).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        // The first row was already written.
        assert_eq!(String::from_utf8(out).unwrap(), "r0\t0/0\t0/1\n");
    }

    struct CountingGrid {
        inner: MemoryGrid,
        reads: usize,
    }

    #[async_trait::async_trait]
    impl GridSource for CountingGrid {
        async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
            self.reads += 1;
            self.inner.read_at(offset, buf).await
        }
    }

    #[tokio::test]
    async fn test_one_read_per_row() {
        let tables = tables(&[
            ("A,G", Strand::Forward, "r0"),
            ("A,G", Strand::Forward, "r1"),
            ("A,G", Strand::Forward, "r2"),
        ]);
        let w = worker(0..3, 4, tables, 2);
        let mut grid = CountingGrid {
            inner: MemoryGrid::new(&b"AA,AG,GG,GA,AA,AA,AA,AA,GG,GG,GG,GG,"[..]),
            reads: 0,
        };
        let mut out: Vec<u8> = Vec::new();
        let report = w.convert(&mut grid, &mut out).await.unwrap();
        assert_eq!(report.rows_written, 3);
        assert_eq!(grid.reads, 3);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "r0\t0/0\t0/1\t1/1\t1/0\nr1\t0/0\t0/0\t0/0\t0/0\nr2\t1/1\t1/1\t1/1\t1/1\n"
        );
    }

    #[tokio::test]
    async fn test_final_delimiter_is_not_read() {
        let tables = tables(&[("A,G", Strand::Forward, "r0"), ("A,G", Strand::Forward, "r1")]);
        let w = worker(0..2, 2, tables, 2);
        let (text, report) = convert(&w, b"AA,AG,GG,GA").await;
        assert_eq!(text, "r0\t0/0\t0/1\nr1\t1/1\t1/0\n");
        assert_eq!(report.rows_written, 2);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let tables = tables(&[("A", Strand::Forward, "r0")]);
        let err = ConversionWorker::new(
            0,
            PathBuf::from("g"),
            PathBuf::from("o"),
            Range { start: 1, end: 0 },
            1,
            tables,
            Ploidy::DIPLOID,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[test]
    fn test_rejects_range_beyond_line_headers() {
        let tables = tables(&[("A", Strand::Forward, "r0")]);
        let err = ConversionWorker::new(
            0,
            PathBuf::from("g"),
            PathBuf::from("o"),
            0..2,
            1,
            tables,
            Ploidy::DIPLOID,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid row/column/ploidy configuration"));
    }

    #[test]
    fn test_rejects_overflowing_offsets() {
        let tables = Arc::new(ReferenceTables::default());
        let err = ConversionWorker::new(
            0,
            PathBuf::from("g"),
            PathBuf::from("o"),
            (usize::MAX - 1)..usize::MAX,
            usize::MAX / 2,
            tables,
            Ploidy::new(8).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[tokio::test]
    async fn test_run_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let tables = tables(&[("A", Strand::Forward, "r0")]);
        let w = ConversionWorker::new(
            3,
            dir.path().join("missing.bin"),
            dir.path().join("shard.vcf"),
            0..1,
            1,
            tables,
            Ploidy::DIPLOID,
        )
        .unwrap();
        let err = w.run().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_run_writes_shard_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("grid.bin");
        let output = dir.path().join("shard.vcf");
        std::fs::write(&input, b"AG,GG,").unwrap();
        let tables = tables(&[("A,G", Strand::Forward, "r0")]);
        let w = ConversionWorker::new(0, input, output.clone(), 0..1, 2, tables, Ploidy::DIPLOID)
            .unwrap();
        let report = w.run().await.unwrap();
        assert_eq!(report.rows_written, 1);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "r0\t0/1\t1/1\n");
    }
}
