pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid row/column/ploidy configuration: {0}")]
    InvalidGeometry(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("worker {index} failed: {message}")]
    WorkerFailed { index: usize, message: String },

    #[error("shard {index} is incomplete: expected {expected} rows, found {found}")]
    IncompleteShard {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable name, used in log fields.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "InvalidInput",
            Error::InvalidGeometry(_) => "InvalidGeometry",
            Error::InvalidRange(_) => "InvalidRange",
            Error::WorkerFailed { .. } => "WorkerFailed",
            Error::IncompleteShard { .. } => "IncompleteShard",
            Error::Io(_) | Error::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_message() {
        let err = Error::InvalidGeometry("ploidy must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid row/column/ploidy configuration: ploidy must be at least 1"
        );
        assert_eq!(err.error_type(), "InvalidGeometry");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.error_type(), "InternalError");
    }
}
