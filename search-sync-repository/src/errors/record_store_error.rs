use thiserror::Error;

/// Represents errors that can occur while reading from the record store.
///
/// Only database round-trip failures are worth retrying; a row that fails to
/// decode or a bad identifier fails the same way every time.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Row decode error: {0}")]
    DecodeError(String),

    #[error("Unsafe SQL identifier '{0}'")]
    UnsafeIdentifier(String),
}

impl RecordStoreError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseError(_))
    }
}
