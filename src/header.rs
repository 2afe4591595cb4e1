//! VCF header rendering.
//!
//! The file header (meta lines and the `#CHROM` line) is built with noodles.
//! Each data row gets a pre-rendered line header holding its first nine
//! columns; the genotype columns are appended by the conversion workers.

use crate::genotype::AlleleCatalog;
use crate::{Error, Result};
use noodles::vcf::{
    self as vcf,
    header::record::value::{
        Map,
        map::{Contig, Format},
    },
    variant::record::samples::keys::key,
};

/// Site columns taken from a HapMap record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub chrom: String,
    pub pos: String,
    pub id: String,
}

/// Render the VCF file header for the given contigs and sample names.
pub fn render_file_header<'a, C, S>(contigs: C, samples: S) -> Result<String>
where
    C: IntoIterator<Item = &'a str>,
    S: IntoIterator<Item = &'a str>,
{
    let mut builder =
        vcf::Header::builder().add_format(key::GENOTYPE, Map::<Format>::from(key::GENOTYPE));

    for contig in contigs {
        builder = builder.add_contig(contig, Map::<Contig>::new());
    }
    for sample in samples {
        builder = builder.add_sample_name(sample);
    }
    let header = builder.build();

    let mut buf = Vec::new();
    {
        let mut writer = vcf::io::Writer::new(&mut buf);
        writer.write_header(&header)?;
    }

    String::from_utf8(buf)
        .map_err(|e| Error::Internal(format!("VCF header is not valid UTF-8: {}", e)))
}

/// Render the first nine columns of a data row, without a trailing tab.
pub fn render_line_header(marker: &Marker, catalog: &AlleleCatalog) -> String {
    let symbols = catalog.symbols();
    let (reference, alternates) = match symbols.split_first() {
        Some((reference, rest)) if !rest.is_empty() => (reference.as_str(), rest.join(",")),
        Some((reference, _)) => (reference.as_str(), ".".to_string()),
        None => ("N", ".".to_string()),
    };

    let id = if marker.id.is_empty() { "." } else { &marker.id };

    format!(
        "{}\t{}\t{}\t{}\t{}\t.\t.\t.\tGT",
        marker.chrom, marker.pos, id, reference, alternates
    )
}

/// Render line headers for every row; the first one also carries the file
/// header so shards can be concatenated as-is.
pub fn render_line_headers(
    file_header: &str,
    markers: &[Marker],
    catalogs: &[AlleleCatalog],
) -> Result<Vec<String>> {
    if markers.len() != catalogs.len() {
        return Err(Error::Internal(format!(
            "{} markers but {} allele catalogs",
            markers.len(),
            catalogs.len()
        )));
    }

    let mut headers: Vec<String> = markers
        .iter()
        .zip(catalogs)
        .map(|(marker, catalog)| render_line_header(marker, catalog))
        .collect();

    if let Some(first) = headers.first_mut() {
        first.insert_str(0, file_header);
    }

    Ok(headers)
}
