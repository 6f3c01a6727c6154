//! SQLite persistence for the adaptive decision core. The only thing this
//! crate knows how to do is implement `tutor_core::ports::Repository`
//! against a single on-disk database — no business logic lives here.

pub mod error;
pub mod models;
pub mod repository;
pub mod version;

pub use error::{Result, StorageError};
pub use repository::SqliteRepository;

use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

const EXPECTED_SCHEMA_VERSION: &str = "1.0.0";

/// Opens (creating if absent) the SQLite database at `db_path`, runs
/// pending migrations, and verifies the resulting schema version is
/// compatible with this build. Foreign keys are enabled per-connection,
/// connect, migrate, and verify schema compatibility.
pub async fn init_db(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let db_version = version::get_schema_version(&pool).await?;
    if !version::is_compatible(&db_version, EXPECTED_SCHEMA_VERSION) {
        return Err(StorageError::IncompatibleSchema {
            db_version,
            app_version: EXPECTED_SCHEMA_VERSION.to_string(),
            message: "tutor database schema is incompatible with this build".to_string(),
        });
    }

    tracing::info!(db_version = %db_version, "tutor database initialized");

    Ok(pool)
}

/// Opens an in-memory database for tests, migrated the same way a real
/// on-disk one would be.
pub async fn init_test_db() -> Result<SqlitePool> {
    init_db("sqlite::memory:").await
}
