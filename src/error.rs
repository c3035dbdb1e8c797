//! Error type shared by the catalog, the protocol builder and the scanner.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad builder parameters (group sizes, split count).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("configuration error: unknown protocol `{0}`")]
    UnknownProtocol(String),

    /// Referential violations and clients without enrollable imagery.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("file {file_id} is already assigned in protocol `{protocol}`")]
    DuplicateAssignment { protocol: String, file_id: i64 },

    #[error("cannot parse file name `{name}`: {reason}")]
    Metadata { name: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Bad parameters and unknown protocol names both count as configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::UnknownProtocol(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
