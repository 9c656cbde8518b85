use std::collections::HashSet;
use std::path::{Path, PathBuf};

use deadpool_postgres::Pool;

use super::error::DbError;

/// Apply every `.sql` file in `dir` not yet recorded in `_migrations`, in file name order.
pub async fn run(pool: &Pool, dir: &Path) -> Result<(), DbError> {
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

    if !dir.exists() {
        tracing::info!(
            "No migrations directory found at {}, skipping migrations",
            dir.display()
        );
        return Ok(());
    }

    let pending = pending_migrations(dir, &applied)?;
    let pending_count = pending.len();

    for (name, path) in pending {
        let sql = std::fs::read_to_string(&path)?;

        let mut client = pool.get().await?;
        let tx = client.transaction().await?;

        tx.batch_execute(&sql)
            .await
            .map_err(|source| DbError::Migration {
                name: name.clone(),
                source,
            })?;

        tx.execute("INSERT INTO _migrations (name) VALUES ($1)", &[&name])
            .await?;

        tx.commit().await?;

        tracing::info!("Applied migration: {}", name);
    }

    tracing::info!(
        "All migrations up to date ({} newly applied, {} already present)",
        pending_count,
        applied.len()
    );
    Ok(())
}

fn pending_migrations(
    dir: &Path,
    applied: &HashSet<String>,
) -> Result<Vec<(String, PathBuf)>, DbError> {
    let mut entries: Vec<(String, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.extension().is_some_and(|x| x == "sql"))
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().to_string();
            (!applied.contains(&name)).then_some((name, path))
        })
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
        for name in ["002_checkpoint.sql", "001_balance.sql", "README.md", "003_index.sql"] {
            std::fs::write(dir.path().join(name), "SELECT 1;").unwrap();
        }
        let applied: HashSet<String> = ["001_balance.sql".to_string()].into_iter().collect();

        let pending = pending_migrations(dir.path(), &applied).unwrap();

        let names: Vec<&str> = pending.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["002_checkpoint.sql", "003_index.sql"]);
    }
}
