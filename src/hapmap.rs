//! HapMap input normalization.
//!
//! A HapMap table has eleven site columns followed by one genotype column per
//! sample:
//!
//! ```text
//! rs#  alleles  chrom  pos  strand  assembly#  center  protLSID  assayLSID  panelLSID  QCcode  S1  S2 ...
//! ```
//!
//! Normalization rewrites the genotype columns into a fixed-width grid (see
//! [`crate::grid`]) and collects the per-row allele catalog, strand flag and
//! site columns needed to render VCF lines.

use crate::genotype::{AlleleCatalog, Strand};
use crate::grid::{GridWriter, Ploidy};
use crate::header::Marker;
use crate::tables::ReferenceTablesBuilder;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader, BufWriter};

/// Number of site columns before the first sample.
pub const SITE_COLUMNS: usize = 11;

const COL_ID: usize = 0;
const COL_ALLELES: usize = 1;
const COL_CHROM: usize = 2;
const COL_POS: usize = 3;
const COL_STRAND: usize = 4;

/// Result of normalizing a HapMap file.
#[derive(Debug)]
pub struct NormalizedHapmap {
    pub grid_path: PathBuf,
    pub samples: Vec<String>,
    pub ploidy: Ploidy,
    pub markers: Vec<Marker>,
    pub tables: ReferenceTablesBuilder,
}

impl NormalizedHapmap {
    pub fn rows(&self) -> usize {
        self.markers.len()
    }

    /// Distinct chromosomes in first-seen order.
    pub fn contigs(&self) -> Vec<&str> {
        let mut contigs: Vec<&str> = Vec::new();
        for marker in &self.markers {
            if !contigs.contains(&marker.chrom.as_str()) {
                contigs.push(&marker.chrom);
            }
        }
        contigs
    }
}

/// `N` is the HapMap no-call symbol.
fn is_no_call(symbol: u8) -> bool {
    symbol.eq_ignore_ascii_case(&b'N')
}

/// Genotype symbols with `/` and `|` separators removed.
fn genotype_symbols(raw: &str) -> Vec<u8> {
    raw.trim()
        .bytes()
        .filter(|b| *b != b'/' && *b != b'|')
        .collect()
}

/// Declared alleles first, then symbols observed in genotypes.
fn build_catalog<'a>(declared: &str, genotypes: impl Iterator<Item = &'a [u8]>) -> AlleleCatalog {
    let mut symbols: Vec<String> = Vec::new();

    for allele in declared.split('/') {
        let allele = allele.trim().to_ascii_uppercase();
        if allele.is_empty() || allele == "N" || symbols.contains(&allele) {
            continue;
        }
        symbols.push(allele);
    }

    for genotype in genotypes {
        for &symbol in genotype {
            let skipped = is_no_call(symbol) || symbol == b'.' || symbol == b'-';
            if skipped || symbol.is_ascii_whitespace() {
                continue;
            }
            let symbol = char::from(symbol.to_ascii_uppercase()).to_string();
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
    }

    AlleleCatalog::new(symbols)
}

/// Width of the first called genotype, skipping empty and all-`N` cells.
fn called_width(genotypes: &[Vec<u8>]) -> Option<Ploidy> {
    genotypes
        .iter()
        .find(|g| !g.is_empty() && !g.iter().all(|s| is_no_call(*s)))
        .and_then(|g| Ploidy::new(g.len()).ok())
}

/// Width of the first non-empty genotype, no-calls included.
fn any_width(genotypes: &[Vec<u8>]) -> Option<Ploidy> {
    genotypes
        .iter()
        .find(|g| !g.is_empty())
        .and_then(|g| Ploidy::new(g.len()).ok())
}

/// Genotypes of one data row, kept until they can be written to the grid.
struct PendingRow {
    line_number: usize,
    genotypes: Vec<Vec<u8>>,
}

async fn write_row(
    writer: &mut GridWriter<BufWriter<fs::File>>,
    row: &PendingRow,
    samples: &[String],
) -> Result<()> {
    for (sample, genotype) in row.genotypes.iter().enumerate() {
        writer.write_cell(genotype).await.map_err(|e| match e {
            Error::InvalidInput(msg) => Error::InvalidInput(format!(
                "line {}, sample {}: {}",
                row.line_number, samples[sample], msg
            )),
            other => other,
        })?;
    }
    Ok(())
}

fn parse_samples(header_fields: &[&str]) -> Result<Vec<String>> {
    let mut samples: Vec<String> = Vec::with_capacity(header_fields.len());
    for field in header_fields {
        let name = field.trim().to_string();
        if samples.contains(&name) {
            return Err(Error::InvalidInput(format!(
                "duplicate sample name in HapMap header: {}",
                name
            )));
        }
        samples.push(name);
    }
    Ok(samples)
}

/// Parse the HapMap file at `input` and write its genotype grid to
/// `grid_path`.
///
/// With `ploidy` unset the width is taken from the first called genotype in
/// the file; rows before it are held back until the width is known.
pub async fn normalize_hapmap(
    input: &Path,
    grid_path: &Path,
    ploidy: Option<Ploidy>,
) -> Result<NormalizedHapmap> {
    let file = fs::File::open(input).await?;
    let mut lines = BufReader::new(file).lines();
    let mut line_number = 0usize;

    let header = loop {
        match lines.next_line().await? {
            Some(line) => {
                line_number += 1;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Err(Error::InvalidInput("HapMap file is empty".to_string())),
        }
    };

    let header_fields: Vec<&str> = header.split('\t').collect();
    if header_fields.len() < SITE_COLUMNS {
        return Err(Error::InvalidInput(format!(
            "HapMap header has {} columns, expected at least {}",
            header_fields.len(),
            SITE_COLUMNS
        )));
    }
    let samples = parse_samples(&header_fields[SITE_COLUMNS..])?;
    let expected_columns = SITE_COLUMNS + samples.len();

    let mut out = Some(BufWriter::new(fs::File::create(grid_path).await?));
    let mut grid: Option<GridWriter<BufWriter<fs::File>>> = None;
    let mut pending: Vec<PendingRow> = Vec::new();

    let mut markers = Vec::new();
    let mut tables = ReferenceTablesBuilder::new();

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != expected_columns {
            return Err(Error::InvalidInput(format!(
                "line {}: expected {} columns, found {}",
                line_number,
                expected_columns,
                fields.len()
            )));
        }

        let row = PendingRow {
            line_number,
            genotypes: fields[SITE_COLUMNS..]
                .iter()
                .map(|g| genotype_symbols(g))
                .collect(),
        };

        let catalog = build_catalog(
            fields[COL_ALLELES],
            row.genotypes.iter().map(Vec::as_slice),
        );
        tables.push_row(catalog, Strand::parse(fields[COL_STRAND]));
        markers.push(Marker {
            chrom: fields[COL_CHROM].trim().to_string(),
            pos: fields[COL_POS].trim().to_string(),
            id: fields[COL_ID].trim().to_string(),
        });

        if grid.is_none() {
            let width = ploidy.or_else(|| called_width(&row.genotypes));
            pending.push(row);
            if let Some(width) = width {
                tracing::debug!("HapMap ploidy width: {}", width);
                let file = out
                    .take()
                    .ok_or_else(|| Error::Internal("grid file already consumed".to_string()))?;
                let mut writer = GridWriter::new(file, width);
                for held in pending.drain(..) {
                    write_row(&mut writer, &held, &samples).await?;
                }
                grid = Some(writer);
            }
            continue;
        }

        if let Some(writer) = grid.as_mut() {
            write_row(writer, &row, &samples).await?;
        }
    }

    let ploidy = match grid {
        Some(writer) => {
            let ploidy = writer.ploidy();
            writer.finish().await?;
            ploidy
        }
        None => {
            // No called genotype anywhere: fall back to any recorded width.
            let width = pending
                .iter()
                .find_map(|row| any_width(&row.genotypes))
                .unwrap_or(Ploidy::DIPLOID);
            let file = out
                .take()
                .ok_or_else(|| Error::Internal("grid file already consumed".to_string()))?;
            let mut writer = GridWriter::new(file, width);
            for held in &pending {
                write_row(&mut writer, held, &samples).await?;
            }
            writer.finish().await?;
            width
        }
    };

    tracing::info!(
        "Normalized {} markers x {} samples at ploidy {}",
        markers.len(),
        samples.len(),
        ploidy
    );

    Ok(NormalizedHapmap {
        grid_path: grid_path.to_path_buf(),
        samples,
        ploidy,
        markers,
        tables,
    })
}
