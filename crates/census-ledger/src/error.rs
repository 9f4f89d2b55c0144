use census_core::CensusError;

/// Store-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for CensusError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) | StoreError::Io(_) => {
                CensusError::TransientStorage(err.to_string())
            }
            StoreError::Corrupt(_) | StoreError::Serialization(_) => {
                CensusError::Internal(err.to_string())
            }
        }
    }
}
