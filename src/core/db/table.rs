/// In-Memory Table Module
///
/// `DataTable` is the caller-owned tabular container that the materializer
/// fills and the reconciler writes back. Rows remember the values they were
/// fetched with and whether they have been added, modified or deleted since.

use super::value::Value;
use crate::core::{GatewayError, Result};
use serde::Serialize;

/// Storage affinity of a column, derived from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
    /// No declared type (expressions, aggregates)
    Any,
}

impl ColumnType {
    /// Applies SQLite's type affinity rules to a declared type name.
    pub fn from_decl(decl: Option<&str>) -> Self {
        let decl = match decl {
            Some(d) if !d.trim().is_empty() => d.to_uppercase(),
            Some(_) => return ColumnType::Blob,
            None => return ColumnType::Any,
        };

        if decl.contains("INT") {
            ColumnType::Integer
        } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
            ColumnType::Text
        } else if decl.contains("BLOB") {
            ColumnType::Blob
        } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Numeric
        }
    }
}

/// A column of a DataTable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataColumn {
    pub name: String,
    /// Declared type as written in the schema (e.g. "VARCHAR(20)")
    pub type_name: Option<String>,
    pub column_type: ColumnType,
    /// Part of the source table's primary key
    pub is_key: bool,
    pub nullable: bool,
}

impl DataColumn {
    pub fn new(name: impl Into<String>) -> Self {
        DataColumn {
            name: name.into(),
            type_name: None,
            column_type: ColumnType::Any,
            is_key: false,
            nullable: true,
        }
    }

    pub fn with_type(mut self, type_name: &str) -> Self {
        self.column_type = ColumnType::from_decl(Some(type_name));
        self.type_name = Some(type_name.to_string());
        self
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self.nullable = false;
        self
    }
}

/// Change tracking state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowState {
    /// Matches what was fetched (or last reconciled)
    Unchanged,
    /// Created locally, not yet in the backend
    Added,
    /// Fetched, then edited locally
    Modified,
    /// Fetched, then marked for deletion
    Deleted,
}

/// A row of a DataTable
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    values: Vec<Value>,
    /// Values at fetch time; `None` for rows added locally
    original: Option<Vec<Value>>,
    state: RowState,
}

impl DataRow {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn original(&self) -> Option<&[Value]> {
        self.original.as_deref()
    }

    pub fn state(&self) -> RowState {
        self.state
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub(crate) fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    pub(crate) fn accept(&mut self) {
        self.original = Some(self.values.clone());
        self.state = RowState::Unchanged;
    }
}

/// A detached row together with its column names
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Record {
    /// Looks a value up by column name (case-insensitive).
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }
}

/// Schema-typed, change-tracking tabular container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: Vec<DataColumn>,
    rows: Vec<DataRow>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(columns: Vec<DataColumn>) -> Self {
        let mut table = Self::new();
        for column in columns {
            table.add_column(column);
        }
        table
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Adds a column, or refreshes the metadata of an existing one with the
    /// same name. Existing rows get NULL in a new column.
    ///
    /// Returns the index of the column.
    pub fn add_column(&mut self, column: DataColumn) -> usize {
        if let Some(index) = self.column_index(&column.name) {
            let existing = &mut self.columns[index];
            if column.type_name.is_some() {
                existing.type_name = column.type_name;
                existing.column_type = column.column_type;
            }
            existing.is_key |= column.is_key;
            existing.nullable &= column.nullable;
            return index;
        }

        self.columns.push(column);
        for row in &mut self.rows {
            row.values.push(Value::Null);
            if let Some(original) = row.original.as_mut() {
                original.push(Value::Null);
            }
        }
        self.columns.len() - 1
    }

    pub fn key_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&DataRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.values.get(index)
    }

    /// Builds a detached record for row `index`.
    pub fn record(&self, index: usize) -> Option<Record> {
        self.rows.get(index).map(|row| Record {
            columns: self.column_names(),
            values: row.values.clone(),
        })
    }

    /// Appends a locally created row in the `Added` state.
    pub fn add_row(&mut self, values: Vec<Value>) -> Result<usize> {
        self.check_width(values.len())?;
        self.rows.push(DataRow {
            values,
            original: None,
            state: RowState::Added,
        });
        Ok(self.rows.len() - 1)
    }

    /// Sets a cell; an unchanged row becomes `Modified`.
    pub fn set_value(&mut self, row: usize, column: &str, value: Value) -> Result<()> {
        let index = self
            .column_index(column)
            .ok_or_else(|| GatewayError::Table(format!("no column named '{}'", column)))?;
        let target = self.row_mut(row)?;
        if target.state == RowState::Deleted {
            return Err(GatewayError::Table(format!("row {} is deleted", row)));
        }

        target.values[index] = value;
        if target.state == RowState::Unchanged {
            target.state = RowState::Modified;
        }
        Ok(())
    }

    /// Marks a row for deletion. Rows that were never in the backend are
    /// removed immediately.
    pub fn delete_row(&mut self, row: usize) -> Result<()> {
        if self.row_mut(row)?.state == RowState::Added {
            self.rows.remove(row);
        } else {
            self.rows[row].state = RowState::Deleted;
        }
        Ok(())
    }

    /// Commits all pending changes locally: deleted rows disappear and every
    /// remaining row becomes `Unchanged`.
    pub fn accept_changes(&mut self) {
        self.rows.retain(|r| r.state != RowState::Deleted);
        for row in &mut self.rows {
            row.accept();
        }
    }

    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(|r| r.state != RowState::Unchanged)
    }

    /// Merges a fetched result into the table and returns the number of
    /// rows merged.
    ///
    /// Result columns the table lacks are added; table columns the result
    /// lacks stay NULL. A fetched row refreshes an existing row only when the
    /// result carries every key column and the row's key has no NULL in it.
    /// Every other row is appended.
    pub(crate) fn merge_result(&mut self, columns: Vec<DataColumn>, rows: Vec<Vec<Value>>) -> usize {
        let mapping: Vec<usize> = columns.into_iter().map(|c| self.add_column(c)).collect();
        let keys = self.key_columns();
        let keyed = !keys.is_empty() && keys.iter().all(|k| mapping.contains(k));
        let keys: &[usize] = if keyed { &keys } else { &[] };
        let width = self.columns.len();

        let count = rows.len();
        for fetched in rows {
            let mut values = vec![Value::Null; width];
            for (value, &target) in fetched.into_iter().zip(&mapping) {
                values[target] = value;
            }
            self.load_row(values, keys);
        }
        count
    }

    /// Loads one full-width fetched row, refreshing the row that carries the
    /// same non-NULL values in the `keys` columns.
    fn load_row(&mut self, values: Vec<Value>, keys: &[usize]) {
        if !keys.is_empty() && keys.iter().all(|&k| !values[k].is_null()) {
            let existing = self.rows.iter_mut().find(|row| {
                row.state != RowState::Added && keys.iter().all(|&k| row.values[k] == values[k])
            });
            if let Some(row) = existing {
                row.values = values;
                row.accept();
                return;
            }
        }

        self.rows.push(DataRow {
            original: Some(values.clone()),
            values,
            state: RowState::Unchanged,
        });
    }

    pub(crate) fn row_mut(&mut self, index: usize) -> Result<&mut DataRow> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or_else(|| GatewayError::Table(format!("row {} out of range ({} rows)", index, len)))
    }

    pub(crate) fn remove_row(&mut self, index: usize) {
        self.rows.remove(index);
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.columns.len() {
            return Err(GatewayError::Table(format!(
                "row has {} values but the table has {} columns",
                width,
                self.columns.len()
            )));
        }
        Ok(())
    }
}
