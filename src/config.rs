use crate::grid::Ploidy;
use crate::pipeline::ConversionOptions;
use crate::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "hmpvcf")]
#[command(about = "Convert HapMap genotype tables to VCF")]
pub struct Config {
    /// HapMap input file (.hmp.txt)
    pub input: PathBuf,

    /// VCF output file
    pub output: PathBuf,

    /// Number of parallel conversion workers (defaults to available cores)
    #[arg(short, long, env = "HMPVCF_WORKERS")]
    pub workers: Option<usize>,

    /// Allele copies per genotype; inferred from the input when omitted
    #[arg(short, long, env = "HMPVCF_PLOIDY")]
    pub ploidy: Option<usize>,

    /// Directory for intermediate grid and shard files (defaults to the output's directory)
    #[arg(long, env = "HMPVCF_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Keep intermediate grid and shard files
    #[arg(long, default_value = "false")]
    pub keep_intermediates: bool,

    /// Print a JSON summary to stdout when done
    #[arg(long, default_value = "false")]
    pub summary: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn effective_workers(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    pub fn conversion_options(&self) -> Result<ConversionOptions> {
        let ploidy = self.ploidy.map(Ploidy::new).transpose()?;
        Ok(ConversionOptions {
            input: self.input.clone(),
            output: self.output.clone(),
            workers: self.effective_workers(),
            ploidy,
            work_dir: self.work_dir.clone(),
            keep_intermediates: self.keep_intermediates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workers: Option<usize>, ploidy: Option<usize>) -> Config {
        Config {
            input: PathBuf::from("in.hmp.txt"),
            output: PathBuf::from("out.vcf"),
            workers,
            ploidy,
            work_dir: None,
            keep_intermediates: false,
            summary: false,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_effective_workers_explicit() {
        assert_eq!(config(Some(6), None).effective_workers(), 6);
    }

    #[test]
    fn test_effective_workers_default() {
        assert!(config(None, None).effective_workers() >= 1);
        assert!(config(Some(0), None).effective_workers() >= 1);
    }

    #[test]
    fn test_conversion_options_ploidy() {
        let options = config(Some(2), Some(3)).conversion_options().unwrap();
        assert_eq!(options.ploidy.unwrap().width(), 3);
        assert_eq!(options.workers, 2);
        assert!(config(Some(2), Some(0)).conversion_options().is_err());
        assert!(config(None, None).conversion_options().unwrap().ploidy.is_none());
    }

    #[test]
    fn test_parse_arguments() {
        let config = Config::try_parse_from([
            "hmpvcf",
            "in.hmp.txt",
            "out.vcf",
            "--workers",
            "4",
            "--ploidy",
            "2",
            "--keep-intermediates",
        ])
        .unwrap();
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.ploidy, Some(2));
        assert!(config.keep_intermediates);
        assert!(!config.summary);
    }
}
