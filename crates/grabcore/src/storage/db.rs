use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::time::Duration;

use crate::core::StoreResult;
use crate::storage::migrations::run_migrations;

/// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Opens (or creates) the SQLite file, sets a busy timeout on every pooled
/// connection so writers queue instead of failing, and brings the schema up
/// to date before returning.
///
/// # Example
///
/// ```no_run
/// use grabcore::storage::create_pool;
///
/// let pool = create_pool("grab.sqlite")?;
/// # Ok::<(), grabcore::StorageError>(())
/// ```
pub fn create_pool(database_path: &str) -> StoreResult<DbPool> {
    let path = shellexpand::tilde(database_path).to_string();
    let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder().max_size(10).build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;
    log::info!("Database ready at {}", path);

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}
