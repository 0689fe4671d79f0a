use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Write failure: {0}")]
    WriteFailure(String),

    #[error("Migration failure: {0}")]
    MigrationFailure(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("Action '{0}' is already present in the log")]
    DuplicateAction(String),

    #[error("Corrupt log '{0}': {1}")]
    CorruptLog(String, String),

    #[error("Store '{0}' not found")]
    StoreNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl LedgerError {
    /// Whether the failed operation can be re-invoked as-is.
    ///
    /// Decode failures count as retryable: the remote file may be mid-replace
    /// by another device, and a later fetch can succeed without any local change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WriteFailure(_) | Self::NetworkFailure(_) | Self::DecodeFailure(_)
        )
    }

    /// Stable tag for this failure class, suitable for status output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WriteFailure(_) => "WRITE_FAILURE",
            Self::MigrationFailure(_) => "MIGRATION_FAILURE",
            Self::NetworkFailure(_) => "NETWORK_FAILURE",
            Self::DecodeFailure(_) => "DECODE_FAILURE",
            Self::DuplicateAction(_) => "DUPLICATE_ACTION",
            Self::CorruptLog(_, _) => "CORRUPT_LOG",
            Self::StoreNotFound(_) => "STORE_NOT_FOUND",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::LockError(_) => "LOCK_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
