//! Database migration runner.

use diesel::{Connection, PgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::error::{Error, Result};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Apply all pending migrations against `database_url`.
pub fn run_migrations(database_url: &str) -> Result<()> {
    let mut conn =
        PgConnection::establish(database_url).map_err(|e| Error::Connection(e.to_string()))?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Database(e.to_string()))?;
    if applied.is_empty() {
        info!("database is up to date");
    } else {
        for migration in &applied {
            info!(migration = %migration, "migration applied");
        }
    }
    Ok(())
}
