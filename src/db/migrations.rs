//! Database migrations
//!
//! Code-based migrations embedded in the binary as SQL strings, with
//! variants for SQLite and MySQL. Applied migrations are tracked in a
//! `_migrations` table keyed by version.
//!
//! # Usage
//!
//! ```ignore
//! use picnest::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use sqlx::Row;

use super::Db;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// All migrations for the Picnest photo album.
pub const MIGRATIONS: &[Migration] = &[
    // Migration 1: Create accounts table
    Migration {
        version: 1,
        name: "create_accounts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handle VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                display_name VARCHAR(100) NOT NULL,
                avatar VARCHAR(500),
                kind VARCHAR(20) NOT NULL DEFAULT 'regular',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_handle ON accounts(handle);
            CREATE INDEX IF NOT EXISTS idx_accounts_kind ON accounts(kind);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                handle VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                display_name VARCHAR(100) NOT NULL,
                avatar VARCHAR(500),
                kind VARCHAR(20) NOT NULL DEFAULT 'regular',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_accounts_handle ON accounts(handle);
            CREATE INDEX idx_accounts_kind ON accounts(kind);
        "#,
    },
    // Migration 2: Create sessions table
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                account_id INTEGER NOT NULL,
                account_label VARCHAR(100) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_account_id ON sessions(account_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                account_id BIGINT NOT NULL,
                account_label VARCHAR(100) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_account_id ON sessions(account_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    // Migration 3: Create collections table
    // The session FK is the cascade backstop for session-scoped content;
    // application code performs the ordered reclamation itself.
    Migration {
        version: 3,
        name: "create_collections",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(200) NOT NULL,
                description TEXT,
                kind VARCHAR(20) NOT NULL DEFAULT 'custom',
                is_temporary INTEGER NOT NULL DEFAULT 0,
                session_id VARCHAR(64),
                expires_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_collections_session_id ON collections(session_id);
            CREATE INDEX IF NOT EXISTS idx_collections_expires_at ON collections(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS collections (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(200) NOT NULL,
                description TEXT,
                kind VARCHAR(20) NOT NULL DEFAULT 'custom',
                is_temporary TINYINT NOT NULL DEFAULT 0,
                session_id VARCHAR(64),
                expires_at TIMESTAMP NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_collections_session_id ON collections(session_id);
            CREATE INDEX idx_collections_expires_at ON collections(expires_at);
        "#,
    },
    // Migration 4: Create collection_owners junction table
    Migration {
        version: 4,
        name: "create_collection_owners",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS collection_owners (
                collection_id INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                PRIMARY KEY (collection_id, account_id),
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_collection_owners_account_id ON collection_owners(account_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS collection_owners (
                collection_id BIGINT NOT NULL,
                account_id BIGINT NOT NULL,
                PRIMARY KEY (collection_id, account_id),
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_collection_owners_account_id ON collection_owners(account_id);
        "#,
    },
    // Migration 5: Create photos table
    Migration {
        version: 5,
        name: "create_photos",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS photos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                storage_key VARCHAR(255) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                liked INTEGER NOT NULL DEFAULT 0,
                is_temporary INTEGER NOT NULL DEFAULT 0,
                session_id VARCHAR(64),
                expires_at TIMESTAMP,
                uploaded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_photos_collection_id ON photos(collection_id);
            CREATE INDEX IF NOT EXISTS idx_photos_session_id ON photos(session_id);
            CREATE INDEX IF NOT EXISTS idx_photos_expires_at ON photos(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS photos (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                collection_id BIGINT NOT NULL,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                storage_key VARCHAR(255) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                liked TINYINT NOT NULL DEFAULT 0,
                is_temporary TINYINT NOT NULL DEFAULT 0,
                session_id VARCHAR(64),
                expires_at TIMESTAMP NULL,
                uploaded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_photos_collection_id ON photos(collection_id);
            CREATE INDEX idx_photos_session_id ON photos(session_id);
            CREATE INDEX idx_photos_expires_at ON photos(expires_at);
        "#,
    },
    // Migration 6: Create comments table
    Migration {
        version: 6,
        name: "create_comments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                photo_id INTEGER NOT NULL,
                account_id INTEGER,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_comments_photo_id ON comments(photo_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                photo_id BIGINT NOT NULL,
                account_id BIGINT,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_comments_photo_id ON comments(photo_id);
        "#,
    },
    // Migration 7: Create partnerships and invitations
    // The per-column UNIQUE constraints enforce "at most one partnership
    // per account" at the storage layer.
    Migration {
        version: 7,
        name: "create_partnerships",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS partnerships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_a INTEGER NOT NULL UNIQUE,
                account_b INTEGER NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_a) REFERENCES accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (account_b) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS partnership_invitations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token VARCHAR(64) NOT NULL UNIQUE,
                from_account_id INTEGER NOT NULL,
                to_account_id INTEGER,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (from_account_id) REFERENCES accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (to_account_id) REFERENCES accounts(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_invitations_token ON partnership_invitations(token);
            CREATE INDEX IF NOT EXISTS idx_invitations_from ON partnership_invitations(from_account_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS partnerships (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                account_a BIGINT NOT NULL UNIQUE,
                account_b BIGINT NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_a) REFERENCES accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (account_b) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS partnership_invitations (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                token VARCHAR(64) NOT NULL UNIQUE,
                from_account_id BIGINT NOT NULL,
                to_account_id BIGINT,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (from_account_id) REFERENCES accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (to_account_id) REFERENCES accounts(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_invitations_token ON partnership_invitations(token);
            CREATE INDEX idx_invitations_from ON partnership_invitations(from_account_id);
        "#,
    },
];

/// Run all pending migrations.
///
/// Creates the tracking table if needed, skips already-applied versions,
/// and applies the rest in order.
///
/// # Returns
///
/// Number of migrations applied
pub async fn run_migrations(pool: &Db) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;

    let mut count = 0;
    for migration in MIGRATIONS {
        if !applied.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &Db) -> Result<()> {
    let sql = match pool.as_ref() {
        crate::db::DbPool::Sqlite(_) => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        crate::db::DbPool::Mysql(_) => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// Versions of already-applied migrations
async fn applied_versions(pool: &Db) -> Result<Vec<i32>> {
    let versions: Vec<i32> = match pool.as_ref() {
        crate::db::DbPool::Sqlite(p) => {
            sqlx::query("SELECT version FROM _migrations ORDER BY version")
                .fetch_all(p)
                .await?
                .iter()
                .map(|row| row.get::<i64, _>("version") as i32)
                .collect()
        }
        crate::db::DbPool::Mysql(p) => {
            sqlx::query("SELECT version FROM _migrations ORDER BY version")
                .fetch_all(p)
                .await?
                .iter()
                .map(|row| row.get::<i32, _>("version"))
                .collect()
        }
    };
    Ok(versions)
}

/// Apply a single migration and record it
async fn apply_migration(pool: &Db, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        crate::config::DatabaseDriver::Sqlite => migration.up_sqlite,
        crate::config::DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    match pool.as_ref() {
        crate::db::DbPool::Sqlite(p) => {
            sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(p)
                .await?;
        }
        crate::db::DbPool::Mysql(p) => {
            sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(p)
                .await?;
        }
    }

    Ok(())
}

/// Split a migration script into individual statements
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    if sql.len() > 100 {
        format!("{}...", &sql[..100])
    } else {
        sql.to_string()
    }
}

/// Get the total number of migrations defined
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create pool");
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Second run is a no-op
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        for table in [
            "accounts",
            "sessions",
            "collections",
            "collection_owners",
            "photos",
            "comments",
            "partnerships",
            "partnership_invitations",
        ] {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to query sqlite_master");
            assert_eq!(count, 1, "table {} should exist", table);
        }
    }

    #[tokio::test]
    async fn test_session_cascade_to_content() {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let sqlite = pool.as_sqlite().unwrap();

        sqlx::query(
            "INSERT INTO accounts (handle, password_hash, display_name, kind) VALUES ('a', 'h', 'A', 'regular')",
        )
        .execute(sqlite)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO sessions (id, account_id, account_label, expires_at) VALUES ('tok', 1, 'A', CURRENT_TIMESTAMP)",
        )
        .execute(sqlite)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO collections (name, is_temporary, session_id, expires_at) VALUES ('c', 1, 'tok', CURRENT_TIMESTAMP)",
        )
        .execute(sqlite)
        .await
        .unwrap();

        // Deleting the session row removes the temporary collection
        sqlx::query("DELETE FROM sessions WHERE id = 'tok'")
            .execute(sqlite)
            .await
            .unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INTEGER);\n CREATE INDEX i ON a(id);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE"));
    }

    #[test]
    fn test_migration_versions_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i32 + 1);
        }
    }
}
