use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("search query is empty")]
    #[diagnostic(help("give at least one condition with a non-empty keyword"))]
    EmptyQuery,

    #[error("invalid directory path: {0}")]
    InvalidPath(String),

    #[error("a saved search named {0:?} already exists")]
    DuplicatePresetName(String),

    #[error("saved search not found: {0}")]
    PresetNotFound(String),

    #[error("archive not found: {0}")]
    ArchiveNotFound(String),

    #[error("arXiv request failed: {0}")]
    ArxivHttp(String),

    #[error("arXiv returned status {status}: {message}")]
    Transport { status: u16, message: String },

    #[error("arXiv rate limit hit (status {status})")]
    #[diagnostic(help("wait a few seconds before querying again"))]
    RateLimited { status: u16, body: String },

    #[error("malformed arXiv response: {message}")]
    MalformedResponse { message: String, body: String },

    #[error("filesystem error: {0}")]
    Persistence(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl HarvestError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HarvestError::InvalidInput(_)
                | HarvestError::EmptyQuery
                | HarvestError::InvalidPath(_)
                | HarvestError::DuplicatePresetName(_)
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            HarvestError::ArxivHttp(_)
                | HarvestError::Transport { .. }
                | HarvestError::RateLimited { .. }
                | HarvestError::MalformedResponse { .. }
        )
    }
}
