/// Schema Introspection Module
///
/// Reads the backend catalogue (primary keys, declared types, NOT NULL) and
/// works out which base table a `SELECT` reads from. The materializer uses it
/// to tag key columns; the reconciler uses it to derive DML.

use crate::core::{GatewayError, Result};
use rusqlite::{Connection, Row};
use sqlparser::ast::{SetExpr, Statement, TableFactor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

/// Represents a backend table column with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type name (e.g., "INTEGER", "TEXT", "REAL", "BLOB")
    pub type_name: String,
    /// Whether the column rejects NULL values
    pub notnull: bool,
    /// Position within the primary key (1-based), 0 if not a key column
    pub pk: usize,
}

impl Column {
    /// Creates a Column from a PRAGMA table_info result row
    fn from_pragma_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Column {
            name: row.get(1)?,
            type_name: row.get(2)?,
            notnull: row.get(3)?,
            pk: row.get::<_, i64>(5)? as usize,
        })
    }

    pub fn is_key(&self) -> bool {
        self.pk > 0
    }
}

/// Structure of a single backend table
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableInfo {
    /// Introspects `table_name`. A table that does not exist is a schema error.
    pub fn from_connection(conn: &Connection, table_name: &str) -> Result<Self> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table_name)))?;
        let columns = stmt
            .query_map([], |row| Column::from_pragma_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if columns.is_empty() {
            return Err(GatewayError::Schema(format!("no such table: {}", table_name)));
        }

        Ok(TableInfo {
            name: table_name.to_string(),
            columns,
        })
    }

    /// Primary key columns in key order
    pub fn key_columns(&self) -> Vec<&Column> {
        let mut keys: Vec<&Column> = self.columns.iter().filter(|c| c.is_key()).collect();
        keys.sort_by_key(|c| c.pk);
        keys
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Returns the single base table a `SELECT` reads from.
///
/// # Errors
///
/// Returns `GatewayError::Unsupported` if the text is not exactly one plain
/// `SELECT` over one table (no joins, set operations or subqueries in FROM).
pub fn source_table(sql: &str) -> Result<String> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql)
        .map_err(|e| GatewayError::Unsupported(format!("cannot parse statement: {}", e)))?;

    let query = match statements.as_slice() {
        [Statement::Query(query)] => query,
        [_] => return Err(GatewayError::Unsupported("statement is not a SELECT".to_string())),
        _ => {
            return Err(GatewayError::Unsupported(format!(
                "expected a single statement, found {}",
                statements.len()
            )))
        }
    };

    let select = match &query.body {
        SetExpr::Select(select) => select,
        _ => return Err(GatewayError::Unsupported("statement is not a plain SELECT".to_string())),
    };

    match select.from.as_slice() {
        [from] if from.joins.is_empty() => match &from.relation {
            TableFactor::Table { name, .. } => name
                .0
                .last()
                .map(|ident| ident.value.clone())
                .ok_or_else(|| GatewayError::Unsupported("empty table name".to_string())),
            _ => Err(GatewayError::Unsupported("statement does not read from a base table".to_string())),
        },
        [] => Err(GatewayError::Unsupported("statement has no FROM clause".to_string())),
        _ => Err(GatewayError::Unsupported("statement reads from more than one table".to_string())),
    }
}

/// Quotes an identifier for use in generated SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_test_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                customer TEXT NOT NULL,
                total REAL
            );
            CREATE TABLE order_lines (
                order_id INTEGER NOT NULL,
                line_no INTEGER NOT NULL,
                sku TEXT,
                PRIMARY KEY (line_no, order_id)
            );
        ",
        )
    }

    #[test]
    fn test_table_info() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();

        let info = TableInfo::from_connection(&conn, "orders").unwrap();
        assert_eq!(info.columns.len(), 3);

        let id_col = &info.columns[0];
        assert_eq!(id_col.name, "id");
        assert_eq!(id_col.type_name, "INTEGER");
        assert!(id_col.is_key());

        let customer = info.column("CUSTOMER").unwrap();
        assert!(customer.notnull);
        assert!(!customer.is_key());
    }

    #[test]
    fn test_composite_key_order() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();

        let info = TableInfo::from_connection(&conn, "order_lines").unwrap();
        let keys: Vec<&str> = info.key_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, vec!["line_no", "order_id"]);
    }

    #[test]
    fn test_missing_table_is_schema_error() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            TableInfo::from_connection(&conn, "nope"),
            Err(GatewayError::Schema(_))
        ));
    }

    #[test]
    fn test_source_table() {
        assert_eq!(source_table("SELECT * FROM orders").unwrap(), "orders");
        assert_eq!(
            source_table("SELECT id, status FROM main.orders WHERE total > 10 ORDER BY id").unwrap(),
            "orders"
        );
    }

    #[test]
    fn test_source_table_rejects_unsupported_shapes() {
        let rejected = [
            "SELECT * FROM orders o JOIN order_lines l ON l.order_id = o.id",
            "SELECT * FROM orders, order_lines",
            "SELECT 1",
            "SELECT id FROM orders UNION SELECT order_id FROM order_lines",
            "DELETE FROM orders",
            "SELECT * FROM (SELECT * FROM orders)",
        ];
        for sql in rejected {
            assert!(
                matches!(source_table(sql), Err(GatewayError::Unsupported(_))),
                "expected {} to be rejected",
                sql
            );
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("orders"), "\"orders\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
