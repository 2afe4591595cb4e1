//! Fixed-width genotype grid.
//!
//! The normalized grid stores one cell per (marker row, sample column). Every
//! cell is `ploidy` symbol bytes followed by a single delimiter byte, and rows
//! follow each other with no terminator, so any cell can be located with
//! arithmetic alone:
//!
//! ```text
//! offset(row, col) = row * columns * (ploidy + 1) + col * (ploidy + 1)
//! ```
//!
//! # Sources
//!
//! - [`FileGrid`] - grid file on disk, read with seek + exact reads
//! - [`MemoryGrid`] - grid held in memory

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// Byte written after every cell.
pub const CELL_DELIMITER: u8 = b',';

/// Byte used to pad genotypes shorter than the ploidy width.
pub const PAD_BYTE: u8 = b' ';

/// Number of allele copies per genotype call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ploidy(usize);

impl Ploidy {
    pub const DIPLOID: Ploidy = Ploidy(2);

    pub fn new(width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidGeometry(
                "ploidy width must be at least 1".to_string(),
            ));
        }
        Ok(Self(width))
    }

    pub fn width(&self) -> usize {
        self.0
    }

    /// Token used when a cell cannot be interpreted: one `.` per allele copy.
    pub fn missing_token(&self) -> String {
        vec!["."; self.0].join("/")
    }
}

impl std::fmt::Display for Ploidy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of a normalized grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    pub total_columns: u64,
    pub ploidy: Ploidy,
}

impl GridGeometry {
    pub fn new(total_columns: usize, ploidy: Ploidy) -> Self {
        Self {
            total_columns: total_columns as u64,
            ploidy,
        }
    }

    /// Bytes per cell, delimiter included.
    pub fn cell_width(&self) -> u64 {
        self.ploidy.width() as u64 + 1
    }

    pub fn row_width(&self) -> Result<u64> {
        self.total_columns
            .checked_mul(self.cell_width())
            .ok_or_else(|| {
                Error::InvalidGeometry(format!(
                    "row width overflows for {} columns at ploidy {}",
                    self.total_columns, self.ploidy
                ))
            })
    }

    /// Byte offset of the first symbol of cell (row, col).
    pub fn offset(&self, row: u64, col: u64) -> Result<u64> {
        if col >= self.total_columns {
            return Err(Error::InvalidGeometry(format!(
                "column {} is outside a grid of {} columns",
                col, self.total_columns
            )));
        }
        row.checked_mul(self.row_width()?)
            .and_then(|base| base.checked_add(col * self.cell_width()))
            .ok_or_else(|| {
                Error::InvalidGeometry(format!(
                    "offset of row {} column {} overflows",
                    row, col
                ))
            })
    }
}

/// Byte to allele-symbol codec.
pub fn decode_symbol(byte: u8) -> char {
    char::from(byte)
}

/// Random access to grid bytes.
#[async_trait]
pub trait GridSource: Send {
    /// Fill `buf` with the bytes starting at `offset`.
    /// Fails if the source ends before `buf` is full.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Grid file on local disk.
pub struct FileGrid {
    path: PathBuf,
    file: fs::File,
}

impl FileGrid {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl GridSource for FileGrid {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        self.file.read_exact(buf).await?;
        Ok(())
    }
}

/// Grid held in memory.
#[derive(Debug, Clone)]
pub struct MemoryGrid {
    data: Bytes,
}

impl MemoryGrid {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl GridSource for MemoryGrid {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| Error::InvalidRange(format!("offset {} exceeds memory", offset)))?;
        let end = start.saturating_add(buf.len());
        if end > self.data.len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at {} past end of {}-byte grid",
                    buf.len(),
                    offset,
                    self.data.len()
                ),
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// Appends cells to a grid in row-major order.
pub struct GridWriter<W> {
    inner: W,
    ploidy: Ploidy,
    cell: Vec<u8>,
    cells_written: u64,
}

impl<W: AsyncWrite + Unpin> GridWriter<W> {
    pub fn new(inner: W, ploidy: Ploidy) -> Self {
        Self {
            inner,
            ploidy,
            cell: Vec::with_capacity(ploidy.width() + 1),
            cells_written: 0,
        }
    }

    /// Write one cell, padding short genotypes with spaces.
    pub async fn write_cell(&mut self, symbols: &[u8]) -> Result<()> {
        let width = self.ploidy.width();
        if symbols.len() > width {
            return Err(Error::InvalidInput(format!(
                "genotype of {} symbols does not fit ploidy {}",
                symbols.len(),
                width
            )));
        }
        self.cell.clear();
        self.cell.extend_from_slice(symbols);
        self.cell.resize(width, PAD_BYTE);
        self.cell.push(CELL_DELIMITER);
        self.inner.write_all(&self.cell).await?;
        self.cells_written += 1;
        Ok(())
    }

    pub fn ploidy(&self) -> Ploidy {
        self.ploidy
    }

    pub fn cells_written(&self) -> u64 {
        self.cells_written
    }

    pub async fn finish(mut self) -> Result<W> {
        self.inner.flush().await?;
        Ok(self.inner)
    }
}
