//! Genotype encoding.
//!
//! Turns the raw symbols decoded from one grid cell into a VCF `GT` token
//! such as `0/1`, using the row's strand orientation and allele catalog.

use crate::grid::Ploidy;

/// Placeholder emitted for blank cells. It is two copies wide whatever
/// the configured ploidy.
pub const BLANK_TOKEN: &str = "./.";

/// Strand orientation of a marker row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    /// `+` is forward; every other flag reads as reverse.
    pub fn parse(flag: &str) -> Self {
        if flag.trim().eq_ignore_ascii_case("+") {
            Strand::Forward
        } else {
            Strand::Reverse
        }
    }
}

/// Ordered allele symbols of one row. The position of a symbol is its VCF
/// allele index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlleleCatalog {
    symbols: Vec<String>,
}

impl AlleleCatalog {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }

    /// Parse a comma-separated symbol list such as `A,G`.
    pub fn from_csv(csv: &str) -> Self {
        if csv.is_empty() {
            return Self::default();
        }
        Self {
            symbols: csv.split(',').map(str::to_string).collect(),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn to_csv(&self) -> String {
        self.symbols.join(",")
    }

    /// Index of the first symbol matching `symbol`, ignoring ASCII case.
    pub fn index_of(&self, symbol: char) -> Option<usize> {
        let mut buf = [0u8; 4];
        let symbol: &str = symbol.encode_utf8(&mut buf);
        self.symbols
            .iter()
            .position(|s| s.eq_ignore_ascii_case(symbol))
    }
}

/// A successfully interpreted cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Genotype {
    Called(String),
    Blank,
}

impl Genotype {
    pub fn token(&self) -> &str {
        match self {
            Genotype::Called(token) => token,
            Genotype::Blank => BLANK_TOKEN,
        }
    }

    pub fn into_token(self) -> String {
        match self {
            Genotype::Called(token) => token,
            Genotype::Blank => BLANK_TOKEN.to_string(),
        }
    }
}

/// Why a cell could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    #[error("entry has {found} symbols but ploidy is {expected}")]
    WidthMismatch { found: usize, expected: usize },

    #[error("no strand recorded for row")]
    MissingStrand,

    #[error("no allele catalog recorded for row")]
    MissingCatalog,
}

/// `.` and `-` mark an absent allele copy.
fn is_missing_symbol(symbol: char) -> bool {
    symbol == '.' || symbol == '-'
}

/// Encode one raw cell entry.
///
/// Symbols are reordered by strand (reverse strand reads the entry back to
/// front), each reordered symbol is looked up in the catalog, and the codes
/// are joined with `/` in reordered position order. Unknown symbols encode
/// as `.`, and `.`/`-` symbols always encode as `.`.
pub fn encode_genotype(
    entry: &str,
    strand: Option<Strand>,
    catalog: Option<&AlleleCatalog>,
    ploidy: Ploidy,
) -> Result<Genotype, Malformed> {
    if entry.trim().is_empty() {
        return Ok(Genotype::Blank);
    }

    let symbols: Vec<char> = entry.chars().collect();
    if symbols.len() != ploidy.width() {
        return Err(Malformed::WidthMismatch {
            found: symbols.len(),
            expected: ploidy.width(),
        });
    }
    let strand = strand.ok_or(Malformed::MissingStrand)?;
    let catalog = catalog.ok_or(Malformed::MissingCatalog)?;

    let ordered: Vec<char> = match strand {
        Strand::Forward => symbols,
        Strand::Reverse => symbols.into_iter().rev().collect(),
    };

    let codes: Vec<String> = ordered
        .iter()
        .map(|&symbol| {
            if is_missing_symbol(symbol) {
                return ".".to_string();
            }
            catalog
                .index_of(symbol)
                .map_or_else(|| ".".to_string(), |index| index.to_string())
        })
        .collect();

    Ok(Genotype::Called(codes.join("/")))
}
