use crate::domain::customer::InstallmentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Installment {0} not found")]
    InstallmentNotFound(InstallmentId),
    #[error("Duplicate contact log entry for customer {customer_id} on {day}")]
    DuplicateContact {
        customer_id: u64,
        day: chrono::NaiveDate,
    },
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Failures reported by the payment gateway adapter.
///
/// These never escape the adapter as panics; the engine treats every variant
/// as "no redeemable code available".
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("payment not approved: {0}")]
    NotApproved(String),
    #[error("redeemable code missing from gateway response")]
    MissingCode,
    #[error("malformed gateway response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
