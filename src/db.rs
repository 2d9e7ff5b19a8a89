use std::ops::DerefMut;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::DbError;

pub type DbConnection = SqliteConnection;
pub type DbPool = r2d2::Pool<ConnectionManager<DbConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const BUSY_TIMEOUT_MS: u32 = 5_000;
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Applied to every pooled connection; SQLite keeps these settings per connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl CustomizeConnection<DbConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut DbConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Builds the pool and brings the schema up to date before handing it out.
pub fn init_pool(database_url: &str, max_size: u32) -> Result<DbPool, DbError> {
    let manager = ConnectionManager::<DbConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .connection_timeout(POOL_CONNECTION_TIMEOUT)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;

    let mut conn = pool.get()?;
    let applied = conn.deref_mut().run_pending_migrations(MIGRATIONS)?;
    for migration in &applied {
        log::info!("applied migration {migration}");
    }
    Ok(pool)
}
