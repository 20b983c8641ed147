//! Vault error type. Every variant aborts the operation that raised it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault blob is malformed: {0}")]
    Malformed(String),

    #[error("Wrong PIN or corrupted vault")]
    WrongPinOrCorrupt,

    #[error("PIN must not be empty")]
    EmptyPin,

    #[error("Failed to encode credentials: {0}")]
    Encode(serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Vault IO error: {0}")]
    Io(#[from] std::io::Error),
}
