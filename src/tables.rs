//! Per-row reference tables shared read-only by all workers.

use crate::genotype::{AlleleCatalog, Strand};
use crate::{Error, Result};

/// Allele catalogs, strand flags and pre-rendered line headers, one entry
/// per marker row. Built once before conversion and never mutated after.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    alleles: Vec<AlleleCatalog>,
    strands: Vec<Strand>,
    line_headers: Vec<String>,
}

impl ReferenceTables {
    pub fn new(
        alleles: Vec<AlleleCatalog>,
        strands: Vec<Strand>,
        line_headers: Vec<String>,
    ) -> Self {
        Self {
            alleles,
            strands,
            line_headers,
        }
    }

    pub fn alleles(&self, row: usize) -> Option<&AlleleCatalog> {
        self.alleles.get(row)
    }

    pub fn strand(&self, row: usize) -> Option<Strand> {
        self.strands.get(row).copied()
    }

    pub fn line_header(&self, row: usize) -> Option<&str> {
        self.line_headers.get(row).map(String::as_str)
    }

    pub fn line_header_count(&self) -> usize {
        self.line_headers.len()
    }

    /// Check that every table covers `rows` entries.
    pub fn validate(&self, rows: usize) -> Result<()> {
        let lengths = [
            ("allele catalog", self.alleles.len()),
            ("strand", self.strands.len()),
            ("line header", self.line_headers.len()),
        ];
        for (name, len) in lengths {
            if len != rows {
                return Err(Error::InvalidInput(format!(
                    "{} table has {} entries for {} rows",
                    name, len, rows
                )));
            }
        }
        Ok(())
    }
}

/// Accumulates table entries row by row.
#[derive(Debug, Default)]
pub struct ReferenceTablesBuilder {
    alleles: Vec<AlleleCatalog>,
    strands: Vec<Strand>,
    line_headers: Vec<String>,
}

impl ReferenceTablesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, catalog: AlleleCatalog, strand: Strand) {
        self.alleles.push(catalog);
        self.strands.push(strand);
    }

    pub fn rows(&self) -> usize {
        self.alleles.len()
    }

    pub fn catalogs(&self) -> &[AlleleCatalog] {
        &self.alleles
    }

    /// Attach rendered line headers and freeze the tables.
    pub fn build(self, line_headers: Vec<String>) -> Result<ReferenceTables> {
        let tables = ReferenceTables::new(self.alleles, self.strands, line_headers);
        tables.validate(tables.alleles.len())?;
        Ok(tables)
    }
}
