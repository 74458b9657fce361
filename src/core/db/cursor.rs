/// Cursor Module
///
/// Forward-only, caller-driven access to a query result. The cursor owns the
/// connection, the prepared statement and its row stream together, so the
/// caller's statement is prepared and stepped exactly once. Rows are pulled
/// from the stream in batches of the configured page size.

use super::command::{bind_parameters, StatementRequest};
use super::connection::ConnectionGuard;
use super::value::Value;
use crate::core::{GatewayError, Result};
use ouroboros::self_referencing;
use rusqlite::{Rows, Statement};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace, warn};

/// A live statement and the connection it runs on.
#[self_referencing]
struct OpenStatement {
    conn: ConnectionGuard,
    #[borrows(conn)]
    #[not_covariant]
    stmt: Statement<'this>,
    #[borrows(mut stmt)]
    #[not_covariant]
    rows: Rows<'this>,
}

/// A lazy sequence of result rows bound to a connection's lifetime.
///
/// The connection is released exactly once: when the last row has been
/// consumed, when a fetch fails, on `close`, or on drop.
pub struct Cursor {
    statement: Option<OpenStatement>,
    columns: Vec<String>,
    buffer: VecDeque<Vec<Value>>,
    /// Rows read from the backend so far
    fetched: usize,
    page_size: usize,
    /// The row stream has ended
    done: bool,
}

impl Cursor {
    /// Prepares `request` on `conn`, binds it and reads the first batch.
    ///
    /// On failure the connection is released before the error is returned.
    pub(crate) fn open(conn: ConnectionGuard, request: &StatementRequest, page_size: usize) -> Result<Self> {
        let parameters = request.normalized();
        let mut columns = Vec::new();

        let statement = OpenStatement::try_new::<GatewayError>(
            conn,
            |conn| {
                let mut stmt = conn.prepare(&request.text)?;
                bind_parameters(&mut stmt, &parameters)?;
                columns = stmt.column_names().into_iter().map(String::from).collect();
                Ok(stmt)
            },
            |stmt| Ok(stmt.raw_query()),
        )?;

        let mut cursor = Cursor {
            statement: Some(statement),
            columns,
            buffer: VecDeque::new(),
            fetched: 0,
            page_size: page_size.max(1),
            done: false,
        };

        cursor.fetch_page()?;
        if cursor.buffer.is_empty() {
            cursor.release();
        }
        Ok(cursor)
    }

    /// Column names of the result
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the cursor still holds its connection
    pub fn is_open(&self) -> bool {
        self.statement.is_some()
    }

    /// Returns the next row, or `None` once the result is exhausted.
    pub fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch_page() {
                self.done = true;
                self.release();
                return Err(e);
            }
        }

        let row = self.buffer.pop_front();
        if self.buffer.is_empty() && self.done {
            self.release();
        }
        Ok(row)
    }

    /// Stops reading and releases the connection. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        self.done = true;
        match self.statement.take() {
            Some(statement) => {
                debug!(rows = self.fetched, "closing cursor");
                statement.into_heads().conn.close()
            }
            None => Ok(()),
        }
    }

    /// Steps the statement for up to one page of rows.
    fn fetch_page(&mut self) -> Result<()> {
        let statement = match self.statement.as_mut() {
            Some(statement) => statement,
            None => {
                self.done = true;
                return Ok(());
            }
        };

        let width = self.columns.len();
        let mut fetched = 0;
        while fetched < self.page_size {
            let next = statement.with_rows_mut(|rows| {
                rows.next()?
                    .map(|row| {
                        (0..width)
                            .map(|i| row.get_ref(i).map(Value::from))
                            .collect::<rusqlite::Result<Vec<_>>>()
                    })
                    .transpose()
            })?;
            match next {
                Some(values) => {
                    self.buffer.push_back(values);
                    fetched += 1;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        trace!(offset = self.fetched, fetched, "fetched cursor page");
        self.fetched += fetched;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(statement) = self.statement.take() {
            debug!(rows = self.fetched, "cursor exhausted");
            if let Err(e) = statement.into_heads().conn.close() {
                warn!("cursor connection did not close cleanly: {}", e);
            }
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("columns", &self.columns)
            .field("buffered", &self.buffer.len())
            .field("fetched", &self.fetched)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Iterator for Cursor {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ConnectionConfig, GatewayConfig, ReaderConfig};
    use crate::core::db::{Gateway, StatementRequest, Value};
    use crate::core::{GatewayError, Result};
    use crate::test_utils::TempDatabase;

    fn paged_gateway(page_size: usize) -> Gateway {
        Gateway::new(GatewayConfig {
            reader: ReaderConfig { page_size },
            ..GatewayConfig::default()
        })
    }

    #[test]
    fn test_reads_all_rows_across_pages() {
        let db = TempDatabase::with_orders(10);
        let cursor = paged_gateway(3)
            .execute_reader(&db.descriptor(), &"SELECT id FROM orders ORDER BY id;".into())
            .unwrap();

        assert_eq!(cursor.columns().to_vec(), vec!["id".to_string()]);
        let ids: Vec<i64> = cursor
            .map(|row| row.unwrap()[0].as_i64().unwrap())
            .collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_releases_when_exhausted() {
        let db = TempDatabase::with_orders(5);
        let mut cursor = paged_gateway(2)
            .execute_reader(&db.descriptor(), &"SELECT id FROM orders ORDER BY id".into())
            .unwrap();

        for _ in 0..4 {
            assert!(cursor.next_row().unwrap().is_some());
            assert!(cursor.is_open());
        }
        assert_eq!(cursor.next_row().unwrap(), Some(vec![Value::Integer(5)]));
        assert!(!cursor.is_open());
        assert_eq!(cursor.next_row().unwrap(), None);
        assert!(cursor.close().is_ok());
    }

    #[test]
    fn test_empty_result_releases_immediately() {
        let db = TempDatabase::with_orders(2);
        let mut cursor = Gateway::default()
            .execute_reader(&db.descriptor(), &"SELECT * FROM orders WHERE id > 100".into())
            .unwrap();
        assert!(!cursor.is_open());
        assert_eq!(cursor.columns().len(), 5);
        assert_eq!(cursor.next_row().unwrap(), None);
    }

    #[test]
    fn test_early_close_is_idempotent() {
        let db = TempDatabase::with_orders(10);
        let mut cursor = paged_gateway(2)
            .execute_reader(&db.descriptor(), &"SELECT * FROM orders".into())
            .unwrap();

        assert!(cursor.next_row().unwrap().is_some());
        cursor.close().unwrap();
        assert!(!cursor.is_open());
        assert!(cursor.close().is_ok());
        assert_eq!(cursor.next_row().unwrap(), None);
    }

    #[test]
    fn test_binds_parameters_on_every_page() {
        let db = TempDatabase::with_orders(9);
        let cursor = paged_gateway(2)
            .execute_reader(
                &db.descriptor(),
                &StatementRequest::new("SELECT id FROM orders WHERE id > :min ORDER BY id").bind("min", 4),
            )
            .unwrap();
        assert_eq!(cursor.count(), 5);
    }

    #[test]
    fn test_failure_surfaces_as_error() {
        let db = TempDatabase::new();
        let result = Gateway::default().execute_reader(&db.descriptor(), &"SELECT * FROM missing".into());
        assert!(matches!(result, Err(GatewayError::Execution(_))));
    }

    #[test]
    fn test_runs_statements_as_written() {
        let db = TempDatabase::with_orders(2);
        let gateway = Gateway::default();

        let commented = gateway
            .execute_reader(&db.descriptor(), &"SELECT id FROM orders ORDER BY id -- all orders".into())
            .unwrap();
        assert_eq!(commented.count(), 2);

        let pragma = gateway
            .execute_reader(&db.descriptor(), &"PRAGMA table_info(orders)".into())
            .unwrap();
        let names: Vec<Value> = pragma.map(|row| row.unwrap()[1].clone()).collect();
        assert_eq!(
            names,
            ["id", "customer", "status", "total", "note"].map(Value::from).to_vec()
        );
    }

    #[test]
    fn test_insert_returning_runs_once() {
        let db = TempDatabase::with_orders(1);
        let gateway = Gateway::default();

        let rows: Vec<Vec<Value>> = gateway
            .execute_reader(
                &db.descriptor(),
                &"INSERT INTO orders (customer) VALUES ('walk-in') RETURNING id".into(),
            )
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows, vec![vec![Value::Integer(2)]]);
        assert_eq!(
            gateway.get_count(&db.descriptor(), &"SELECT COUNT(*) FROM orders".into()).unwrap(),
            2
        );
    }

    #[test]
    fn test_writes_between_pages_are_not_seen() {
        let db = TempDatabase::with_orders(4);
        let gateway = Gateway::new(GatewayConfig {
            connection: ConnectionConfig {
                journal_mode: Some("WAL".to_string()),
                ..ConnectionConfig::default()
            },
            reader: ReaderConfig { page_size: 2 },
            ..GatewayConfig::default()
        });

        let mut cursor = gateway
            .execute_reader(&db.descriptor(), &"SELECT id FROM orders ORDER BY id".into())
            .unwrap();
        let mut ids = vec![cursor.next_row().unwrap().unwrap()[0].as_i64().unwrap()];

        db.connection()
            .execute("INSERT INTO orders (id, customer) VALUES (0, 'early'), (10, 'late')", [])
            .unwrap();

        for row in cursor {
            ids.push(row.unwrap()[0].as_i64().unwrap());
        }
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
