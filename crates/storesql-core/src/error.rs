use thiserror::Error;

/// Top-level error type for storesql.
///
/// Subsystem crates map their failures into one of these variants (or wrap
/// this type in their own error) so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreSqlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Query rejected: {0}")]
    Rejected(String),

    #[error("LLM error ({provider}): {message}")]
    Llm { provider: String, message: String },

    #[error("Invalid API key for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreSqlError {
    /// Build an [`StoreSqlError::Llm`] for the named provider.
    pub fn llm(provider: &str, message: impl Into<String>) -> Self {
        StoreSqlError::Llm {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for StoreSqlError {
    fn from(err: toml::de::Error) -> Self {
        StoreSqlError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreSqlError {
    fn from(err: toml::ser::Error) -> Self {
        StoreSqlError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for StoreSqlError {
    fn from(err: serde_json::Error) -> Self {
        StoreSqlError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for storesql operations.
pub type Result<T> = std::result::Result<T, StoreSqlError>;
