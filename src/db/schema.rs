//! Database schema and migrations for stowage.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded; the schema_version table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users referenced as file creators/updaters
    r#"
CREATE TABLE users (
    user_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
    // v2: file metadata with soft delete
    r#"
CREATE TABLE files (
    file_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT NOT NULL,
    mimetype         TEXT NOT NULL,
    size             INTEGER NOT NULL DEFAULT 0 CHECK (size >= 0),
    path             TEXT NOT NULL,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at       TEXT NOT NULL DEFAULT (datetime('now')),
    deleted          INTEGER NOT NULL DEFAULT 0,
    created_by_user  INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    updated_by_user  INTEGER REFERENCES users(user_id) ON DELETE SET NULL
);

CREATE INDEX idx_files_path ON files(path);
CREATE INDEX idx_files_deleted ON files(deleted);
"#,
    // v3: a path may be held by at most one live record
    r#"
CREATE UNIQUE INDEX idx_files_path_active ON files(path) WHERE deleted = 0;
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
    }

    #[test]
    fn test_first_migration_contains_users_table() {
        assert!(MIGRATIONS[0].contains("CREATE TABLE users"));
        assert!(MIGRATIONS[0].contains("username"));
    }

    #[test]
    fn test_files_migration_columns() {
        let files = MIGRATIONS[1];
        for column in [
            "file_id",
            "name",
            "mimetype",
            "size",
            "path",
            "created_at",
            "updated_at",
            "deleted",
            "created_by_user",
            "updated_by_user",
        ] {
            assert!(files.contains(column), "missing column {column}");
        }
    }

    #[test]
    fn test_active_path_index_is_partial() {
        assert!(MIGRATIONS[2].contains("UNIQUE INDEX"));
        assert!(MIGRATIONS[2].contains("WHERE deleted = 0"));
    }
}
