pub mod config;
pub mod error;
pub mod genotype;
pub mod grid;
pub mod hapmap;
pub mod header;
pub mod merge;
pub mod pipeline;
pub mod tables;
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{ConversionOptions, ConversionSummary, convert};
pub use worker::{ConversionWorker, WorkerReport};
