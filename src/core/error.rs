/// Datagate Error Module
///
/// This module defines the error type returned by every gateway operation.
/// Backend failures are never raised as panics: each operation hands them back
/// as the `Err` arm of its `Result`, and the caller decides what to do.
use thiserror::Error;

/// Comprehensive error type for the data access gateway.
///
/// The variants follow the stages a call passes through:
/// - Opening a connection (`Connectivity`)
/// - Preparing, binding and running a statement (`Execution`)
/// - Deriving a result schema (`Schema`)
/// - Applying in-memory changes back to the backend (`Reconciliation`, `Unsupported`)
/// - Configuration and connection string handling (`Config`, `Io`, `Toml`)
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The physical connection could not be opened
    #[error("Connectivity failure: {0}")]
    Connectivity(#[source] rusqlite::Error),

    /// The backend rejected the statement (syntax, constraint, type mismatch)
    #[error("Execution failure: {0}")]
    Execution(#[from] rusqlite::Error),

    /// A parameter could not be bound to the statement
    #[error("Binding failure: {0}")]
    Binding(String),

    /// The result shape of a statement could not be derived
    #[error("Schema failure: {0}")]
    Schema(String),

    /// Derived DML was rejected or did not match its row
    #[error("Reconciliation failure after {applied} row(s): {message}")]
    Reconciliation { applied: usize, message: String },

    /// The statement cannot be reconciled automatically
    #[error("Unsupported input: {0}")]
    Unsupported(String),

    /// A cell could not be coerced to the requested type
    #[error("Coercion failure: {0}")]
    Coercion(String),

    /// Misuse of a DataTable (unknown column, row out of range)
    #[error("Table error: {0}")]
    Table(String),

    /// Configuration or connection string errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parse errors
    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON rendering errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Returns the backend's own failure text, without the category prefix.
    pub fn backend_message(&self) -> String {
        match self {
            GatewayError::Connectivity(e) | GatewayError::Execution(e) => e.to_string(),
            GatewayError::Reconciliation { message, .. } => message.clone(),
            GatewayError::Binding(msg)
            | GatewayError::Schema(msg)
            | GatewayError::Unsupported(msg)
            | GatewayError::Coercion(msg)
            | GatewayError::Table(msg)
            | GatewayError::Config(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Type alias for Result to use GatewayError as the error type.
pub type Result<T> = std::result::Result<T, GatewayError>;
