//! Error types for the consultation crew.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrewError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Unknown specialty '{0}'")]
    UnknownSpecialty(String),

    #[error("Unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Literature search error: {0}")]
    Literature(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrewError>;
