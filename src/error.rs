use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed dictionary at byte {position}: {message}")]
    Malformed { position: usize, message: String },
    #[error("unbalanced element <{0}>")]
    Unbalanced(String),
    #[error("document has no root element")]
    NoRoot,
    #[error("document has no <Recognized> section")]
    MissingRecognized,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("could not access dictionary file: {0}")]
    Io(#[from] io::Error),
    #[error("dictionary file is not usable: {0}")]
    Parse(#[from] ParseError),
    #[error("open buffer refused the insertion: {0}")]
    Buffer(HostError),
    #[error("could not create dictionary file: {0}")]
    CreateFailed(io::Error),
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("could not read dictionary file: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("dictionary has been disposed")]
    Disposed,
}

#[derive(Debug, Error)]
pub enum AddWordError {
    #[error("no dictionary file and the user declined to create one")]
    Declined,
    #[error("project refused the dictionary file: {0}")]
    Host(HostError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
