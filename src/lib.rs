// Core infrastructure modules
pub mod config;
pub mod core;

pub use crate::config::GatewayConfig;
pub use crate::core::db::{
    ConnectionDescriptor, Cursor, DataColumn, DataTable, ExecutionMode, ExecutionOutcome, Gateway, Parameter,
    ParameterDirection, Record, RowState, StatementRequest, Value,
};
pub use crate::core::{GatewayError, Result};

#[cfg(test)]
mod test_utils;
