/// # Test Utilities Module
///
/// Fixtures for gateway tests. Every fixture is a fresh SQLite file in a
/// temporary location, so tests never share state and can open as many
/// connections to it as they like.

use crate::core::db::ConnectionDescriptor;
use rusqlite::Connection;
use tempfile::NamedTempFile;

pub const ORDERS_SCHEMA: &str = "
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer TEXT NOT NULL,
        status TEXT DEFAULT 'new',
        total REAL,
        note TEXT
    );
";

/// Isolated on-disk database, removed when dropped
pub struct TempDatabase {
    file: NamedTempFile,
}

impl TempDatabase {
    /// Creates an empty database
    pub fn new() -> Self {
        let file = NamedTempFile::new().expect("failed to create temp database file");
        TempDatabase { file }
    }

    /// Creates a database with an `orders` table holding `count` rows
    ///
    /// Row `n` has id `n`, customer `customer-n`, status `new` and total `n * 10.0`.
    pub fn with_orders(count: i64) -> Self {
        let db = Self::new();
        db.execute_batch(ORDERS_SCHEMA);

        let mut conn = db.connection();
        let tx = conn.transaction().expect("failed to begin seed transaction");
        for n in 1..=count {
            tx.execute(
                "INSERT INTO orders (id, customer, total) VALUES (?1, ?2, ?3)",
                rusqlite::params![n, format!("customer-{}", n), n as f64 * 10.0],
            )
            .expect("failed to seed orders");
        }
        tx.commit().expect("failed to commit seed data");
        db
    }

    pub fn path(&self) -> String {
        self.file.path().to_string_lossy().into_owned()
    }

    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::build(self.path(), "app", "secret")
    }

    /// Opens a direct connection, bypassing the gateway
    pub fn connection(&self) -> Connection {
        Connection::open(self.file.path()).expect("failed to open temp database")
    }

    pub fn execute_batch(&self, sql: &str) {
        self.connection().execute_batch(sql).expect("failed to run setup SQL");
    }
}
