/// Reconciliation Module
///
/// Writes the pending changes of a `DataTable` back to the backend table its
/// select statement reads from. INSERT/UPDATE/DELETE statements are derived
/// from the table's catalogue entry; UPDATE and DELETE match rows on the
/// values they had when fetched, so a row changed by another session is
/// reported instead of overwritten.

use super::connection::ConnectionDescriptor;
use super::gateway::Gateway;
use super::schema::{self, quote_identifier, TableInfo};
use super::table::{DataTable, RowState};
use super::value::Value;
use crate::config::ConflictMode;
use crate::core::{GatewayError, Result};
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

impl Gateway {
    /// Applies the added, modified and deleted rows of `table` to the table
    /// `select` reads from, and returns the number of rows applied.
    ///
    /// Columns of `table` that the backend table does not have are ignored.
    /// Each applied row has its changes accepted at once, so a second call
    /// with no new edits applies nothing.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Unsupported` if `select` is not a single-table
    ///   `SELECT`, the table has no primary key, or `table` lacks a key column.
    ///   Nothing is applied.
    /// - `GatewayError::Reconciliation` when a derived statement fails or
    ///   matches no row. Rows before the failing one stay applied; `applied`
    ///   says how many.
    pub fn update(&self, table: &mut DataTable, descriptor: &ConnectionDescriptor, select: &str) -> Result<usize> {
        let source = schema::source_table(select)?;
        let conn = self.connect(descriptor)?;
        let info = TableInfo::from_connection(&conn, &source).map_err(|e| match e {
            GatewayError::Schema(msg) => GatewayError::Unsupported(msg),
            other => other,
        })?;
        let plan = DmlPlan::derive(&info, table, self.config().reconcile.conflict)?;

        if !table.has_changes() {
            return Ok(0);
        }

        let mut applied = 0;
        let mut index = 0;
        while index < table.len() {
            let state = table.rows()[index].state();
            let result = match state {
                RowState::Unchanged => {
                    index += 1;
                    continue;
                }
                RowState::Added => plan.insert(&conn, table, index),
                RowState::Modified => plan.update(&conn, table, index),
                RowState::Deleted => plan.delete(&conn, table, index),
            };

            if let Err(e) = result {
                return Err(GatewayError::Reconciliation {
                    applied,
                    message: format!("{:?} row {}: {}", state, index, e.backend_message()),
                });
            }

            applied += 1;
            if state == RowState::Deleted {
                table.remove_row(index);
            } else {
                table.row_mut(index)?.accept();
                index += 1;
            }
        }

        info!(table = %info.name, applied, "reconciled changes");
        Ok(applied)
    }
}

/// A DataTable column that exists in the backend table.
struct MappedColumn {
    /// Index in the DataTable
    index: usize,
    quoted: String,
    is_key: bool,
}

/// Statement shapes derived for one DataTable/backend table pair.
struct DmlPlan {
    table: String,
    columns: Vec<MappedColumn>,
    conflict: ConflictMode,
    /// DataTable index of a single INTEGER key that SQLite fills in on insert
    generated_key: Option<usize>,
}

impl DmlPlan {
    fn derive(info: &TableInfo, table: &DataTable, conflict: ConflictMode) -> Result<Self> {
        let keys = info.key_columns();
        if keys.is_empty() {
            return Err(GatewayError::Unsupported(format!(
                "table '{}' has no primary key",
                info.name
            )));
        }

        let mut columns = Vec::new();
        for (index, column) in table.columns().iter().enumerate() {
            match info.column(&column.name) {
                Some(source) => columns.push(MappedColumn {
                    index,
                    quoted: quote_identifier(&source.name),
                    is_key: source.is_key(),
                }),
                None => debug!(column = %column.name, "ignoring column missing from {}", info.name),
            }
        }

        for key in &keys {
            if table.column_index(&key.name).is_none() {
                return Err(GatewayError::Unsupported(format!(
                    "key column '{}' of '{}' is not in the table",
                    key.name, info.name
                )));
            }
        }

        let generated_key = match keys.as_slice() {
            // Only INTEGER PRIMARY KEY aliases the rowid
            [key] if key.type_name.eq_ignore_ascii_case("INTEGER") => table.column_index(&key.name),
            _ => None,
        };

        Ok(DmlPlan {
            table: quote_identifier(&info.name),
            columns,
            conflict,
            generated_key,
        })
    }

    fn insert(&self, conn: &Connection, table: &mut DataTable, row: usize) -> Result<()> {
        let values = table.rows()[row].values();
        let pending_key = self.generated_key.filter(|&key| values[key].is_null());
        let inserted: Vec<&MappedColumn> = self
            .columns
            .iter()
            .filter(|c| Some(c.index) != pending_key)
            .collect();

        let sql = if inserted.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let names: Vec<&str> = inserted.iter().map(|c| c.quoted.as_str()).collect();
            let slots: Vec<String> = (1..=inserted.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                names.join(", "),
                slots.join(", ")
            )
        };

        debug!(%sql, row, "applying insert");
        conn.execute(&sql, params_from_iter(inserted.iter().map(|c| &values[c.index])))?;

        if let Some(key) = pending_key {
            let id = conn.last_insert_rowid();
            table.row_mut(row)?.set(key, Value::Integer(id));
        }
        Ok(())
    }

    fn update(&self, conn: &Connection, table: &DataTable, row: usize) -> Result<()> {
        let target = &table.rows()[row];
        let original = original_values(target.original(), row)?;

        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c.quoted, i + 1))
            .collect();
        let (predicate, compared) = self.predicate(self.columns.len());
        let sql = format!("UPDATE {} SET {} WHERE {}", self.table, assignments.join(", "), predicate);

        let params = self
            .columns
            .iter()
            .map(|c| &target.values()[c.index])
            .chain(compared.iter().map(|c| &original[c.index]));

        debug!(%sql, row, "applying update");
        expect_one(conn.execute(&sql, params_from_iter(params))?, "UPDATE")
    }

    fn delete(&self, conn: &Connection, table: &DataTable, row: usize) -> Result<()> {
        let original = original_values(table.rows()[row].original(), row)?;
        let (predicate, compared) = self.predicate(0);
        let sql = format!("DELETE FROM {} WHERE {}", self.table, predicate);

        debug!(%sql, row, "applying delete");
        let params = compared.iter().map(|c| &original[c.index]);
        expect_one(conn.execute(&sql, params_from_iter(params))?, "DELETE")
    }

    /// Builds the optimistic WHERE clause; placeholders start after `offset`.
    fn predicate(&self, offset: usize) -> (String, Vec<&MappedColumn>) {
        let compared: Vec<&MappedColumn> = self
            .columns
            .iter()
            .filter(|c| c.is_key || self.conflict == ConflictMode::CompareAllValues)
            .collect();
        let clause = compared
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} IS ?{}", c.quoted, offset + i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        (clause, compared)
    }
}

fn original_values(original: Option<&[Value]>, row: usize) -> Result<&[Value]> {
    original.ok_or_else(|| GatewayError::Table(format!("row {} has no original values", row)))
}

fn expect_one(affected: usize, verb: &str) -> Result<()> {
    if affected == 0 {
        return Err(GatewayError::Reconciliation {
            applied: 0,
            message: format!("concurrency violation: the {} affected 0 of the expected 1 records", verb),
        });
    }
    Ok(())
}
