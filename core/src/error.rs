use thiserror::Error;

/// Error returned by a macro resolver. The expander never propagates it;
/// the failing macro contributes an empty string instead.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ResolverError {
    pub message: String,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for ResolverError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ResolverError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

#[derive(Error, Debug)]
pub enum MacroError {
    #[error("Invalid macro pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("The replacement url has invalid protocol: {0}")]
    InvalidProtocol(String),
}

pub type Result<T> = std::result::Result<T, MacroError>;
