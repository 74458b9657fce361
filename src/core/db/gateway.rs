/// Gateway Module
///
/// `Gateway` is the entry point of the crate. It carries only an immutable
/// configuration; each operation opens its own connection from the
/// descriptor it is handed and releases it before returning.

use super::connection::{self, ConnectionDescriptor, ConnectionGuard};
use super::cursor::Cursor;
use super::table::DataTable;
use super::value::Value;
use super::command::StatementRequest;
use crate::config::GatewayConfig;
use crate::core::Result;

/// Execution mode chosen by the caller; never inferred from the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Row-count of a mutation statement
    NonQuery,
    /// First column of the first row
    Scalar,
    /// Forward-only cursor that owns its connection
    Reader,
    /// First cell read as an integer
    Count,
    /// Whole result materialized into a fresh table
    Table,
}

/// Result of `Gateway::execute`, one variant per mode
#[derive(Debug)]
pub enum ExecutionOutcome {
    RowCount(usize),
    Scalar(Option<Value>),
    Cursor(Cursor),
    Count(i64),
    Table(DataTable),
}

/// Connection-scoped execution surface over a relational backend.
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Gateway { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Checks that the descriptor's database can be opened.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Connectivity` carrying the backend's message.
    pub fn probe(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        connection::probe(descriptor, &self.config.connection)
    }

    /// Executes `request` in the given mode.
    pub fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        request: &StatementRequest,
        mode: ExecutionMode,
    ) -> Result<ExecutionOutcome> {
        Ok(match mode {
            ExecutionMode::NonQuery => ExecutionOutcome::RowCount(self.execute_non_query(descriptor, request)?),
            ExecutionMode::Scalar => ExecutionOutcome::Scalar(self.execute_scalar(descriptor, request)?),
            ExecutionMode::Reader => ExecutionOutcome::Cursor(self.execute_reader(descriptor, request)?),
            ExecutionMode::Count => ExecutionOutcome::Count(self.get_count(descriptor, request)?),
            ExecutionMode::Table => {
                let mut table = DataTable::new();
                self.fill(descriptor, &mut table, request)?;
                ExecutionOutcome::Table(table)
            }
        })
    }

    pub(crate) fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<ConnectionGuard> {
        connection::open(descriptor, &self.config.connection)
    }
}
