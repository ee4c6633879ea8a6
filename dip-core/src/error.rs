//! Error taxonomy for DIP operations

/// Result type for DIP operations
pub type Result<T> = std::result::Result<T, DipError>;

/// Errors that can occur while managing a deposit information package
#[derive(Debug, thiserror::Error)]
pub enum DipError {
    /// The directory layout is not what a DIP expects (wrong entry kind at a
    /// known path, missing mandatory endpoint field at registration).
    #[error("Initialise error: {0}")]
    Initialise(String),

    /// A deposit, update or delete could not proceed, or the repository did
    /// not confirm it.
    #[error("Deposit error: {0}")]
    Deposit(String),

    /// Packager misconfiguration or nothing selected to package.
    #[error("Package error: {0}")]
    Package(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Failure reported by the repository connector, passed through untouched.
    #[error(transparent)]
    Connector(anyhow::Error),
}

impl DipError {
    pub fn initialise(msg: impl Into<String>) -> Self {
        Self::Initialise(msg.into())
    }

    pub fn deposit(msg: impl Into<String>) -> Self {
        Self::Deposit(msg.into())
    }

    pub fn package(msg: impl Into<String>) -> Self {
        Self::Package(msg.into())
    }
}
