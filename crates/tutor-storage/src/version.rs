use crate::error::Result;
use sqlx::SqlitePool;

/// Get the current schema version from the database.
pub async fn get_schema_version(pool: &SqlitePool) -> Result<String> {
    let row: (String,) = sqlx::query_as("SELECT version FROM schema_version ORDER BY applied_at DESC LIMIT 1")
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

/// Check if a database schema version is compatible with the app's expected
/// version: major versions must match exactly, and the DB minor version
/// must not be newer than the app's.
pub fn is_compatible(db_version: &str, app_version: &str) -> bool {
    let db_parts = parse_version(db_version);
    let app_parts = parse_version(app_version);

    if db_parts.0 != app_parts.0 {
        return false;
    }
    if db_parts.1 > app_parts.1 {
        return false;
    }
    true
}

fn parse_version(version: &str) -> (u32, u32, u32) {
    let parts: Vec<u32> = version.split('.').filter_map(|s| s.parse().ok()).collect();
    (
        parts.first().copied().unwrap_or(0),
        parts.get(1).copied().unwrap_or(0),
        parts.get(2).copied().unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_when_major_matches_and_db_not_ahead() {
        assert!(is_compatible("1.0.0", "1.0.0"));
        assert!(is_compatible("1.0.0", "1.1.0"));
        assert!(is_compatible("1.0.5", "1.0.0"));
    }

    #[test]
    fn incompatible_on_major_mismatch_or_db_ahead() {
        assert!(!is_compatible("2.0.0", "1.0.0"));
        assert!(!is_compatible("1.1.0", "1.0.0"));
    }
}
