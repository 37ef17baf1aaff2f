use drip_common::DripError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Corrupt entry in {tree}: {reason}")]
    Corrupt { tree: &'static str, reason: String },

    #[error("Storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DripError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Codec(e) => DripError::Serialization(e.to_string()),
            other => DripError::Storage(other.to_string()),
        }
    }
}
