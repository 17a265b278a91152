//! Error types for the archiver library.

use thiserror::Error;

/// Main error type for archiver operations.
#[derive(Error, Debug)]
pub enum ArchiverError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient object-store error (network/service fault)
    #[error("Transient store error during {operation}: {message}")]
    Transient {
        operation: &'static str,
        message: String,
    },

    /// Requested key does not exist in the store
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Auth/ACL rejection from the store
    #[error("Permission denied during {operation}: {message}")]
    Permission {
        operation: &'static str,
        message: String,
    },

    /// A source or sink stream failed mid-transfer
    #[error("Stream failed in {context}: {message}")]
    Stream { context: String, message: String },

    /// Archive encoder internal fault
    #[error("Archive encoding error: {0}")]
    Encoding(#[from] async_zip::error::ZipError),

    /// IO error (stream plumbing, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A spawned task failed or panicked
    #[error("Task failed: {0}")]
    Task(String),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Run cancelled")]
    Cancelled,
}

impl ArchiverError {
    /// Create a Transient error for a named store operation.
    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        ArchiverError::Transient {
            operation,
            message: message.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        ArchiverError::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Create a Permission error for a named store operation.
    pub fn permission(operation: &'static str, message: impl Into<String>) -> Self {
        ArchiverError::Permission {
            operation,
            message: message.into(),
        }
    }

    /// Create a Stream error with context about which transfer failed.
    pub fn stream(context: impl Into<String>, message: impl Into<String>) -> Self {
        ArchiverError::Stream {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ArchiverError::Config(_) | ArchiverError::Yaml(_) => 2,
            ArchiverError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Result type alias for archiver operations.
pub type Result<T> = std::result::Result<T, ArchiverError>;
