use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybookError {
    #[error("index {index} out of range for play with {len} task(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("play has no tasks")]
    EmptyPlay,

    #[error("cannot serialize value at '{path}': {reason}")]
    Serialization { path: String, reason: String },

    #[error("unknown module action: {0}")]
    UnknownAction(String),

    #[error("invalid arguments for '{action}': {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("unsupported definition format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PlaybookError {
    pub(crate) fn serialization(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PlaybookError::Serialization {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaybookError>;
