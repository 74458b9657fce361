/// Connection Management Module
///
/// This module builds connection descriptors and opens short-lived physical
/// connections from them. A descriptor never holds a live connection; every
/// operation opens its own and releases it through `ConnectionGuard`.

use crate::config::ConnectionConfig;
use crate::core::{GatewayError, Result};
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use tracing::{debug, warn};

const KEY_DATA_SOURCE: &str = "data source";
const KEY_USER_ID: &str = "user id";
const KEY_PASSWORD: &str = "password";

/// Immutable bundle of connection parameters.
///
/// `host` is the database location understood by the backend (a file path,
/// `:memory:`, or a `file:` URI). SQLite does not authenticate, so principal
/// and credential travel with the descriptor but are never sent anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    host: String,
    principal: String,
    credential: String,
}

impl ConnectionDescriptor {
    /// Assembles a descriptor. Pure: performs no I/O.
    pub fn build(
        host: impl Into<String>,
        principal: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        ConnectionDescriptor {
            host: host.into(),
            principal: principal.into(),
            credential: credential.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Renders the descriptor as `data source=<host>;user id=<principal>;password=<credential>`.
    pub fn connection_string(&self) -> String {
        format!(
            "{}={};{}={};{}={}",
            KEY_DATA_SOURCE, self.host, KEY_USER_ID, self.principal, KEY_PASSWORD, self.credential
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("principal", &self.principal)
            .field("credential", &"***")
            .finish()
    }
}

/// Same layout as the connection string, with the credential masked.
impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={};{}={};{}=***",
            KEY_DATA_SOURCE, self.host, KEY_USER_ID, self.principal, KEY_PASSWORD
        )
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let mut host = None;
        let mut principal = String::new();
        let mut credential = String::new();

        for pair in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| GatewayError::Config(format!("expected key=value, found '{}'", pair)))?;
            let value = value.trim().to_string();

            match key.trim().to_lowercase().as_str() {
                KEY_DATA_SOURCE => host = Some(value),
                KEY_USER_ID => principal = value,
                KEY_PASSWORD => credential = value,
                other => {
                    return Err(GatewayError::Config(format!(
                        "unsupported connection attribute '{}'",
                        other
                    )))
                }
            }
        }

        match host {
            Some(host) if !host.is_empty() => Ok(ConnectionDescriptor::build(host, principal, credential)),
            _ => Err(GatewayError::Config("connection string has no data source".to_string())),
        }
    }
}

/// A physical connection scoped to one operation (or one cursor).
///
/// Dropping the guard closes the connection, so every exit path releases it.
pub struct ConnectionGuard {
    connection: Connection,
    _release: ReleaseLog,
}

impl ConnectionGuard {
    /// Closes the connection now, reporting any close failure.
    pub fn close(self) -> Result<()> {
        let ConnectionGuard { connection, _release } = self;
        connection.close().map_err(|(_, e)| GatewayError::Execution(e))
    }
}

impl Deref for ConnectionGuard {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("host", &self._release.host)
            .finish()
    }
}

/// Logs the release once the connection field has been dropped.
struct ReleaseLog {
    host: String,
}

impl Drop for ReleaseLog {
    fn drop(&mut self) {
        debug!(host = %self.host, "connection released");
    }
}

/// Opens a physical connection for `descriptor` and applies the connection settings.
///
/// # Errors
///
/// Returns `GatewayError::Connectivity` if the database cannot be opened or
/// the connection settings cannot be applied.
pub fn open(descriptor: &ConnectionDescriptor, config: &ConnectionConfig) -> Result<ConnectionGuard> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if config.create_if_missing {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    debug!(host = %descriptor.host(), user = %descriptor.principal(), "opening connection");
    let conn = Connection::open_with_flags(descriptor.host(), flags).map_err(GatewayError::Connectivity)?;
    let guard = ConnectionGuard {
        connection: conn,
        _release: ReleaseLog {
            host: descriptor.host().to_string(),
        },
    };

    if let Some(timeout) = config.busy_timeout() {
        guard.busy_timeout(timeout).map_err(GatewayError::Connectivity)?;
    }
    guard
        .pragma_update(None, "foreign_keys", config.foreign_keys)
        .map_err(GatewayError::Connectivity)?;
    if let Some(mode) = &config.journal_mode {
        guard
            .pragma_update_and_check(None, "journal_mode", mode, |row| row.get::<_, String>(0))
            .map_err(GatewayError::Connectivity)?;
    }

    Ok(guard)
}

/// Checks that `descriptor` can be opened. Exactly one attempt is made.
///
/// A connection that opens but then fails the post-open health check is
/// logged and still reported as reachable.
pub fn probe(descriptor: &ConnectionDescriptor, config: &ConnectionConfig) -> Result<()> {
    let guard = open(descriptor, config)?;

    if let Err(e) = guard.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0)) {
        warn!(host = %descriptor.host(), "connection opened but is not usable: {}", e);
    }

    if let Err(e) = guard.close() {
        warn!(host = %descriptor.host(), "probe connection did not close cleanly: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TempDatabase;

    #[test]
    fn test_connection_string_layout() {
        let desc = ConnectionDescriptor::build("dbhost", "app", "secret");
        assert_eq!(desc.connection_string(), "data source=dbhost;user id=app;password=secret");
    }

    #[test]
    fn test_credential_is_masked() {
        let desc = ConnectionDescriptor::build("dbhost", "app", "secret");
        assert!(!format!("{:?}", desc).contains("secret"));
        insta::assert_snapshot!(desc.to_string(), @"data source=dbhost;user id=app;password=***");
    }

    #[test]
    fn test_parse_connection_string() {
        let desc: ConnectionDescriptor = " Password=pw ; DATA SOURCE=/var/db/orders.db;user id=app"
            .parse()
            .unwrap();
        assert_eq!(desc, ConnectionDescriptor::build("/var/db/orders.db", "app", "pw"));

        let round_trip: ConnectionDescriptor = desc.connection_string().parse().unwrap();
        assert_eq!(round_trip, desc);
    }

    #[test]
    fn test_parse_rejects_bad_strings() {
        assert!(matches!("user id=app".parse::<ConnectionDescriptor>(), Err(GatewayError::Config(_))));
        assert!(matches!(
            "data source=x;pooling=true".parse::<ConnectionDescriptor>(),
            Err(GatewayError::Config(_))
        ));
        assert!(matches!("data source".parse::<ConnectionDescriptor>(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_probe_succeeds_for_existing_database() {
        let db = TempDatabase::new();
        assert!(probe(&db.descriptor(), &ConnectionConfig::default()).is_ok());
    }

    #[test]
    fn test_probe_reports_backend_message_for_unreachable_host() {
        let desc = ConnectionDescriptor::build("/nonexistent/path/database.db", "app", "secret");
        let err = probe(&desc, &ConnectionConfig::default()).unwrap_err();

        match &err {
            GatewayError::Connectivity(inner) => assert_eq!(err.backend_message(), inner.to_string()),
            other => panic!("Expected Connectivity error, got {:?}", other),
        }
        assert!(err.backend_message().contains("unable to open database file"));
    }

    #[test]
    fn test_missing_file_is_not_created_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");
        let desc = ConnectionDescriptor::build(path.to_string_lossy(), "", "");

        assert!(open(&desc, &ConnectionConfig::default()).is_err());
        assert!(!path.exists());

        let config = ConnectionConfig {
            create_if_missing: true,
            ..ConnectionConfig::default()
        };
        open(&desc, &config).unwrap().close().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_applies_pragmas() {
        let db = TempDatabase::new();
        let config = ConnectionConfig {
            journal_mode: Some("WAL".to_string()),
            ..ConnectionConfig::default()
        };
        let guard = open(&db.descriptor(), &config).unwrap();

        let fk: i64 = guard.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
        let mode: String = guard.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
