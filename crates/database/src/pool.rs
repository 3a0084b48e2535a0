use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Opens (creating if needed) the SQLite store at `db_path` and runs pending migrations.
///
/// # Errors
///
/// Returns an error if the connection cannot be established or a migration fails.
pub async fn open(db_path: &str) -> Result<SqlitePool> {
    let url = format!("sqlite://{db_path}?mode=rwc");
    let pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// An in-memory store for tests: same schema, nothing touches disk.
///
/// # Errors
///
/// Returns an error if the connection cannot be established or a migration fails.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
