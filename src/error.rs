use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The construct has no translation on the target server version.
    #[error("Not supported: {0}")]
    NotSupported(String),
    /// The tree violates a precondition of the generator.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// The metadata attached to the tree is inconsistent with its use.
    #[error("Metadata error: {0}")]
    Metadata(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Error::NotSupported(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Error::Metadata(msg.into())
    }
}

pub trait ToResult {
    type Output;

    /// Turns a missing value into an invalid-operation error naming `what`.
    fn must_exist(self, what: &str) -> Result<Self::Output>;
}

impl<T> ToResult for Option<T> {
    type Output = T;

    fn must_exist(self, what: &str) -> Result<Self::Output> {
        self.ok_or_else(|| Error::InvalidOperation(format!("{what} not found")))
    }
}
