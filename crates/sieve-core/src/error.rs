use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing capability: {0}")]
    MissingCapability(&'static str),

    #[error("Vector store backend failed: {0}")]
    Backend(String),

    #[error("Language model call failed: {0}")]
    Llm(String),

    #[error("Unexpected model reply: {0}")]
    ReplyFormat(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Invalid selection: {0}")]
    SelectionParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Configuration problems surface as empty results rather than failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::MissingCapability(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
