/// Core Module for Datagate
///
/// This module contains the data access gateway itself: connection handling,
/// statement execution, result materialization and reconciliation, along with
/// the shared error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{GatewayError, Result};
