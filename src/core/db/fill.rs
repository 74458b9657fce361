/// Result Materialization Module
///
/// Drains query results into caller-owned `DataTable`s: rows with `fill`,
/// column schema only with `fill_schema`, a single record with `fill_row`.

use super::command::{bind_parameters, StatementRequest};
use super::connection::ConnectionDescriptor;
use super::gateway::Gateway;
use super::schema::{self, TableInfo};
use super::table::{ColumnType, DataColumn, DataTable, Record};
use super::value::Value;
use crate::core::{GatewayError, Result};
use rusqlite::{Connection, Statement};
use std::collections::HashSet;
use tracing::debug;

impl Gateway {
    /// Executes `request` and loads its rows into `table`.
    ///
    /// Result columns the table lacks are added; table columns the result
    /// lacks are left NULL. If the result carries every key column of the
    /// table, a fetched row whose key matches an existing row refreshes that
    /// row instead of appending. The table is only touched once the whole
    /// result has been read, so a failure leaves it as it was.
    ///
    /// Returns the number of rows fetched.
    pub fn fill(
        &self,
        descriptor: &ConnectionDescriptor,
        table: &mut DataTable,
        request: &StatementRequest,
    ) -> Result<usize> {
        let parameters = request.normalized();
        let conn = self.connect(descriptor)?;

        let mut stmt = conn.prepare(&request.text)?;
        bind_parameters(&mut stmt, &parameters)?;

        let columns = result_columns(&stmt);
        let width = columns.len();
        let mut fetched = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            fetched.push(values);
        }

        let count = table.merge_result(columns, fetched);
        debug!(sql = %request.text, fetched = count, "filled table");
        Ok(count)
    }

    /// Loads the column schema of `request`'s result into `table` without
    /// fetching any rows.
    ///
    /// For a single-table `SELECT`, key and NOT NULL information comes from
    /// the backend catalogue. Columns already in the table are updated in
    /// place, never duplicated.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Schema` if the statement cannot be prepared.
    pub fn fill_schema(
        &self,
        descriptor: &ConnectionDescriptor,
        table: &mut DataTable,
        request: &StatementRequest,
    ) -> Result<()> {
        let conn = self.connect(descriptor)?;
        let stmt = conn
            .prepare(&request.text)
            .map_err(|e| GatewayError::Schema(e.to_string()))?;

        let mut columns = result_columns(&stmt);
        if columns.is_empty() {
            return Err(GatewayError::Schema(format!(
                "statement returns no columns: {}",
                request.text
            )));
        }
        apply_source_metadata(&conn, &request.text, &mut columns);

        for column in columns {
            table.add_column(column);
        }
        debug!(sql = %request.text, columns = table.columns().len(), "filled schema");
        Ok(())
    }

    /// Executes `request` into a fresh table and returns its first row.
    pub fn fill_row(&self, descriptor: &ConnectionDescriptor, request: &StatementRequest) -> Result<Option<Record>> {
        let mut table = DataTable::new();
        self.fill(descriptor, &mut table, request)?;
        Ok(table.record(0))
    }
}

/// Describes the result columns of a prepared statement.
///
/// Names repeated within one result get a numeric suffix (`id`, `id1`, ...).
fn result_columns(stmt: &Statement<'_>) -> Vec<DataColumn> {
    let mut seen = HashSet::new();
    stmt.columns()
        .into_iter()
        .map(|column| {
            let base = column.name().to_string();
            let mut name = base.clone();
            let mut suffix = 1;
            while !seen.insert(name.to_lowercase()) {
                name = format!("{}{}", base, suffix);
                suffix += 1;
            }

            DataColumn {
                name,
                type_name: column.decl_type().map(String::from),
                column_type: ColumnType::from_decl(column.decl_type()),
                is_key: false,
                nullable: true,
            }
        })
        .collect()
}

/// Tags key and NOT NULL columns when the statement reads one base table.
///
/// Key flags are only set when every key column of the table is present in
/// the result.
fn apply_source_metadata(conn: &Connection, sql: &str, columns: &mut [DataColumn]) {
    let info = match schema::source_table(sql).and_then(|name| TableInfo::from_connection(conn, &name)) {
        Ok(info) => info,
        Err(e) => {
            debug!("no source table metadata for result: {}", e);
            return;
        }
    };

    let keys = info.key_columns();
    let has_full_key = !keys.is_empty()
        && keys
            .iter()
            .all(|k| columns.iter().any(|c| c.name.eq_ignore_ascii_case(&k.name)));

    for column in columns.iter_mut() {
        if let Some(source) = info.column(&column.name) {
            column.nullable = !source.notnull && !source.is_key();
            column.is_key = has_full_key && source.is_key();
        }
    }
}
