use thiserror::Error;

#[derive(Error, Debug)]
pub enum QcError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Transient remote error: {0}")]
    TransientRemote(String),

    #[error("Permanent remote error: {0}")]
    PermanentRemote(String),

    #[error("Record '{0}' not found")]
    NotFound(String),

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, QcError>;

impl QcError {
    /// A failure the caller may reasonably retry; everything else is
    /// terminal for the current attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientRemote(_))
    }
}

impl From<serde_json::Error> for QcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for QcError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Storage(err.to_string())
    }
}
