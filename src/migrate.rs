use anyhow::{bail, Result};
use sqlx::SqlitePool;

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn check_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("Invalid table name: '{}'", table);
    }
    Ok(())
}

/// Create the chunk table. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool, table: &str) -> Result<()> {
    check_table_name(table)?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_key TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{{}}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    Ok(())
}
