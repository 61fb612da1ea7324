use thiserror::Error;
use urlmacro_core::MacroError;

#[derive(Error, Debug)]
pub enum ReplError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    Usage(&'static str),

    #[error("Expected on or off, found '{0}'")]
    InvalidToggle(String),

    #[error("Expansion error: {0}")]
    Expansion(#[from] MacroError),
}

pub type Result<T> = std::result::Result<T, ReplError>;
