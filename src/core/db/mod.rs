//! Database layer for persistence using Diesel ORM.

pub mod model;
pub mod schema;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::PgConnection;
use std::time::Duration;

use crate::error::{Error, Result};

/// Database connection pool type alias.
pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Per-connection session options applied on acquire.
#[derive(Debug, Clone)]
struct SessionOptions {
    statement_timeout_ms: u64,
}

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for SessionOptions {
    fn on_acquire(&self, conn: &mut PgConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        diesel::sql_query(format!("SET statement_timeout = {}", self.statement_timeout_ms))
            .execute(conn)
            .map(|_| ())
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Create a bounded connection pool for the given database URL.
///
/// Every connection gets a statement timeout so a wedged query cannot hold a
/// ledger transaction open indefinitely.
///
/// # Errors
/// Returns an error if the pool cannot be created.
pub fn create_pool(
    database_url: &str,
    max_size: u32,
    connection_timeout: Duration,
    statement_timeout_ms: u64,
) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .connection_timeout(connection_timeout)
        .connection_customizer(Box::new(SessionOptions {
            statement_timeout_ms,
        }))
        .build(manager)
        .map_err(|e| Error::Connection(e.to_string()))
}
