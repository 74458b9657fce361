/// Query Execution Module
///
/// The command executor: one method per execution mode. Every method opens
/// its own connection and releases it on every exit path; reader mode hands
/// the connection to the returned cursor instead.

use super::command::{bind_parameters, StatementRequest};
use super::connection::ConnectionDescriptor;
use super::cursor::Cursor;
use super::gateway::Gateway;
use super::value::Value;
use crate::core::{GatewayError, Result};
use tracing::debug;

impl Gateway {
    /// Executes a mutation statement and returns the number of affected rows.
    ///
    /// Zero affected rows is a success, not an error.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Connectivity` if the connection cannot be opened,
    /// `GatewayError::Binding` or `GatewayError::Execution` if the backend
    /// rejects the statement (including statements that return rows).
    pub fn execute_non_query(&self, descriptor: &ConnectionDescriptor, request: &StatementRequest) -> Result<usize> {
        let parameters = request.normalized();
        let conn = self.connect(descriptor)?;

        let mut stmt = conn.prepare(&request.text)?;
        bind_parameters(&mut stmt, &parameters)?;
        let affected = stmt.raw_execute()?;

        debug!(sql = %request.text, params = parameters.len(), affected, "executed statement");
        Ok(affected)
    }

    /// Executes a statement and returns the first column of its first row.
    ///
    /// NULL and an empty result both come back as `None`.
    pub fn execute_scalar(
        &self,
        descriptor: &ConnectionDescriptor,
        request: &StatementRequest,
    ) -> Result<Option<Value>> {
        let parameters = request.normalized();
        let conn = self.connect(descriptor)?;

        let mut stmt = conn.prepare(&request.text)?;
        bind_parameters(&mut stmt, &parameters)?;

        let mut rows = stmt.raw_query();
        let value = match rows.next()? {
            Some(row) => Value::from(row.get_ref(0)?),
            None => Value::Null,
        };

        debug!(sql = %request.text, "executed scalar");
        Ok(match value {
            Value::Null => None,
            v => Some(v),
        })
    }

    /// Executes a query and returns a forward-only cursor over its rows.
    ///
    /// The cursor owns the connection and releases it once exhausted, closed
    /// or dropped.
    ///
    /// # Errors
    ///
    /// Any failure up to and including the first page fetch releases the
    /// connection and is returned here; a cursor is only handed out when it
    /// is usable.
    pub fn execute_reader(&self, descriptor: &ConnectionDescriptor, request: &StatementRequest) -> Result<Cursor> {
        let conn = self.connect(descriptor)?;
        Cursor::open(conn, request, self.config().reader.page_size)
    }

    /// Executes a counting query and returns its first cell as an integer.
    ///
    /// The connection is opened before the statement is prepared. The cell is
    /// read through its textual form, so `'42'` and `42` both count as 42. An
    /// empty result counts as 0.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Coercion` if the cell's text is not an integer.
    pub fn get_count(&self, descriptor: &ConnectionDescriptor, request: &StatementRequest) -> Result<i64> {
        let conn = self.connect(descriptor)?;
        let parameters = request.normalized();

        let mut stmt = conn.prepare(&request.text)?;
        bind_parameters(&mut stmt, &parameters)?;

        let mut rows = stmt.raw_query();
        let text = match rows.next()? {
            Some(row) => Value::from(row.get_ref(0)?).to_string(),
            None => return Ok(0),
        };

        let count = text
            .trim()
            .parse::<i64>()
            .map_err(|e| GatewayError::Coercion(format!("'{}' is not a count: {}", text, e)))?;
        debug!(sql = %request.text, count, "executed count");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::command::{Parameter, ParameterDirection};
    use crate::test_utils::TempDatabase;

    #[test]
    fn test_non_query_reports_affected_rows() {
        let db = TempDatabase::with_orders(5);
        let gateway = Gateway::default();

        let affected = gateway
            .execute_non_query(
                &db.descriptor(),
                &StatementRequest::new("UPDATE orders SET status = :status WHERE id <= :id")
                    .bind("status", "shipped")
                    .bind("id", 2),
            )
            .unwrap();
        assert_eq!(affected, 2);
    }

    #[test]
    fn test_non_query_on_missing_row_is_zero_without_error() {
        let db = TempDatabase::with_orders(3);
        let affected = Gateway::default()
            .execute_non_query(
                &db.descriptor(),
                &"UPDATE orders SET status='shipped' WHERE id=7".into(),
            )
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn test_non_query_binds_null_for_missing_input() {
        let db = TempDatabase::with_orders(1);
        let gateway = Gateway::default();
        let desc = db.descriptor();

        let request = StatementRequest {
            text: "UPDATE orders SET note = :note WHERE id = 1".to_string(),
            parameters: vec![Parameter::new("note", ParameterDirection::Input, None)],
        };
        assert_eq!(gateway.execute_non_query(&desc, &request).unwrap(), 1);

        let note = gateway
            .execute_scalar(&desc, &"SELECT note IS NULL FROM orders WHERE id = 1".into())
            .unwrap();
        assert_eq!(note, Some(Value::Integer(1)));
    }

    #[test]
    fn test_non_query_failures() {
        let db = TempDatabase::with_orders(1);
        let gateway = Gateway::default();
        let desc = db.descriptor();

        let syntax = gateway.execute_non_query(&desc, &"UPDTE orders".into());
        assert!(matches!(syntax, Err(GatewayError::Execution(_))));

        let constraint = gateway.execute_non_query(
            &desc,
            &StatementRequest::new("INSERT INTO orders (id, customer) VALUES (?1, ?2)")
                .param(Parameter::positional(1))
                .param(Parameter::positional("dup")),
        );
        assert!(matches!(constraint, Err(GatewayError::Execution(_))));

        let returns_rows = gateway.execute_non_query(&desc, &"SELECT * FROM orders".into());
        assert!(returns_rows.is_err());
    }

    #[test]
    fn test_scalar_values() {
        let db = TempDatabase::with_orders(2);
        let gateway = Gateway::default();
        let desc = db.descriptor();

        let customer = gateway
            .execute_scalar(
                &desc,
                &StatementRequest::new("SELECT customer FROM orders WHERE id = :id").bind("id", 2),
            )
            .unwrap();
        assert_eq!(customer, Some(Value::from("customer-2")));

        let null = gateway
            .execute_scalar(&desc, &"SELECT note FROM orders WHERE id = 1".into())
            .unwrap();
        assert_eq!(null, None);

        let empty = gateway
            .execute_scalar(&desc, &"SELECT id FROM orders WHERE id = 99".into())
            .unwrap();
        assert_eq!(empty, None);
    }

    #[test]
    fn test_scalar_failure_is_error() {
        let db = TempDatabase::new();
        let result = Gateway::default().execute_scalar(&db.descriptor(), &"SELECT * FROM missing".into());
        match result {
            Err(e) => assert!(e.backend_message().contains("no such table")),
            Ok(v) => panic!("Expected failure, got {:?}", v),
        }
    }

    #[test]
    fn test_count() {
        let db = TempDatabase::with_orders(42);
        let count = Gateway::default()
            .get_count(&db.descriptor(), &"SELECT COUNT(*) FROM orders".into())
            .unwrap();
        assert_eq!(count, 42);
    }

    #[test]
    fn test_count_coerces_text() {
        let db = TempDatabase::new();
        let gateway = Gateway::default();
        assert_eq!(gateway.get_count(&db.descriptor(), &"SELECT ' 17 '".into()).unwrap(), 17);
        assert_eq!(
            gateway
                .get_count(&db.descriptor(), &"SELECT 1 WHERE 0".into())
                .unwrap(),
            0
        );
        assert!(matches!(
            gateway.get_count(&db.descriptor(), &"SELECT 'many'".into()),
            Err(GatewayError::Coercion(_))
        ));
    }

    #[test]
    fn test_count_against_unreachable_host() {
        let desc = ConnectionDescriptor::build("/nonexistent/dir/db.sqlite", "app", "secret");
        assert!(matches!(
            Gateway::default().get_count(&desc, &"SELECT 1".into()),
            Err(GatewayError::Connectivity(_))
        ));
    }
}
