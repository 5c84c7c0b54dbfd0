use thiserror::Error;

/// Errors that can occur while parsing rule files.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid variable list '{0}': {1}")]
    Variables(String, String),

    #[error("Invalid action list '{0}': {1}")]
    Actions(String, String),

    #[error("Invalid operator '{0}': {1}")]
    Operator(String, String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ParserError>;
