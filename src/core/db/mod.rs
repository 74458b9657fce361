/// Database Module
///
/// This module provides the data access gateway, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): descriptors, opening, probing and release
/// - **Statement Requests** (`command.rs`): parameters, normalization and binding
/// - **Query Execution** (`query.rs`, `cursor.rs`): mutation, scalar, count and reader modes
/// - **Materialization** (`fill.rs`, `table.rs`): loading results into `DataTable`s
/// - **Schema Introspection** (`schema.rs`): catalogue lookups and source table detection
/// - **Reconciliation** (`reconcile.rs`): writing table changes back
///
/// ## Error Handling
///
/// Every operation returns `Result<T, GatewayError>`. Backend failures are
/// reported through the `Err` arm and never panic.
///
/// ## Usage
///
/// ```no_run
/// use datagate::core::db::{ConnectionDescriptor, Gateway, StatementRequest};
///
/// let gateway = Gateway::default();
/// let orders = ConnectionDescriptor::build("orders.db", "app", "secret");
/// let count = gateway.get_count(&orders, &StatementRequest::new("SELECT COUNT(*) FROM orders"))?;
/// # Ok::<(), datagate::core::GatewayError>(())
/// ```
pub mod command;
pub mod connection;
pub mod cursor;
pub mod fill;
pub mod gateway;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod table;
pub mod value;

pub use command::{Parameter, ParameterDirection, StatementRequest};
pub use connection::{ConnectionDescriptor, ConnectionGuard};
pub use cursor::Cursor;
pub use gateway::{ExecutionMode, ExecutionOutcome, Gateway};
pub use table::{ColumnType, DataColumn, DataRow, DataTable, Record, RowState};
pub use value::Value;
