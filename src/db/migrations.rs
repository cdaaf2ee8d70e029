use std::collections::HashSet;
use std::path::{Path, PathBuf};

use deadpool_postgres::Pool;

use super::error::DbError;

const MIGRATIONS_DIR: &str = "migrations";

/// Apply every `.sql` file under `migrations/` that is not yet recorded in
/// `_migrations`, in file name order, each in its own transaction.
pub async fn run(pool: &Pool) -> Result<(), DbError> {
    let client = pool.get().await?;

    client
        .execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )",
            &[],
        )
        .await?;

    let rows = client.query("SELECT name FROM _migrations", &[]).await?;
    let applied: HashSet<String> = rows.iter().map(|row| row.get(0)).collect();

    let pending = pending_migrations(Path::new(MIGRATIONS_DIR), &applied)?;
    if pending.is_empty() {
        tracing::info!("All migrations up to date");
        return Ok(());
    }

    for (name, path) in pending {
        let sql = std::fs::read_to_string(&path)?;

        let mut client = pool.get().await?;
        let tx = client.transaction().await?;

        tx.batch_execute(&sql).await.map_err(|e| {
            DbError::MigrationError(format!("Failed to run migration {}: {}", name, e))
        })?;

        tx.execute("INSERT INTO _migrations (name) VALUES ($1)", &[&name])
            .await?;

        tx.commit().await?;

        tracing::info!("Applied migration: {}", name);
    }

    tracing::info!("All migrations up to date");
    Ok(())
}

/// Migration files in `dir` not contained in `applied`, sorted by name.
fn pending_migrations(
    dir: &Path,
    applied: &HashSet<String>,
) -> Result<Vec<(String, PathBuf)>, DbError> {
    if !dir.exists() {
        tracing::info!("No migrations directory found, skipping migrations");
        return Ok(Vec::new());
    }

    let mut entries: Vec<(String, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|x| x == "sql").unwrap_or(false))
        .filter_map(|p| {
            let name = p.file_name()?.to_string_lossy().to_string();
            Some((name, p))
        })
        .filter(|(name, _)| !applied.contains(name))
        .collect();

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_migrations_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["002_functions.sql", "001_tables.sql", "notes.txt", "003_more.sql"] {
            std::fs::write(dir.path().join(name), "SELECT 1;").unwrap();
        }

        let applied: HashSet<String> = ["003_more.sql".to_string()].into_iter().collect();
        let pending = pending_migrations(dir.path(), &applied).unwrap();
        let names: Vec<&str> = pending.iter().map(|(n, _)| n.as_str()).collect();

        assert_eq!(names, vec!["001_tables.sql", "002_functions.sql"]);
    }

    #[test]
    fn test_missing_directory_has_no_pending() {
        let pending =
            pending_migrations(Path::new("does/not/exist"), &HashSet::new()).unwrap();
        assert!(pending.is_empty());
    }
}
