//! File record types and repository for stowage.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool};

use crate::{Result, StowageError};

const FILE_COLUMNS: &str = "file_id, name, mimetype, size, path, created_at, updated_at, deleted, \
                            created_by_user, updated_by_user";

/// Metadata for a stored file.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique file ID.
    pub file_id: i64,
    /// File name on disk.
    pub name: String,
    /// MIME type.
    pub mimetype: String,
    /// Size in bytes.
    pub size: i64,
    /// Filesystem path.
    pub path: String,
    /// When the record was created.
    pub created_at: String,
    /// When the record was last updated.
    pub updated_at: String,
    /// Soft-delete flag.
    pub deleted: bool,
    /// User that created the record.
    pub created_by_user: Option<i64>,
    /// User that last updated the record.
    pub updated_by_user: Option<i64>,
}

impl FileRecord {
    /// Get the created_at as DateTime<Utc>.
    pub fn created_at_datetime(&self) -> Option<DateTime<Utc>> {
        parse_sqlite_datetime(&self.created_at)
    }

    /// Get the updated_at as DateTime<Utc>.
    pub fn updated_at_datetime(&self) -> Option<DateTime<Utc>> {
        parse_sqlite_datetime(&self.updated_at)
    }
}

fn parse_sqlite_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Data for creating a new file record.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    /// File name on disk.
    pub name: String,
    /// MIME type.
    pub mimetype: String,
    /// Size in bytes.
    pub size: i64,
    /// Filesystem path.
    pub path: String,
    /// Creating user.
    pub user_id: Option<i64>,
}

impl NewFileRecord {
    /// Create a new NewFileRecord.
    pub fn new(
        name: impl Into<String>,
        mimetype: impl Into<String>,
        size: i64,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mimetype: mimetype.into(),
            size,
            path: path.into(),
            user_id: None,
        }
    }

    /// Set the creating user.
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Builder for updating a file record.
#[derive(Debug, Clone, Default)]
pub struct FileRecordUpdate {
    /// New name.
    pub name: Option<String>,
    /// New MIME type.
    pub mimetype: Option<String>,
    /// New size.
    pub size: Option<i64>,
    /// New soft-delete flag.
    pub deleted: Option<bool>,
    /// Updating user.
    pub updated_by_user: Option<i64>,
}

impl FileRecordUpdate {
    /// Create a new FileRecordUpdate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the MIME type.
    pub fn mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Set the size.
    pub fn size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the soft-delete flag.
    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = Some(deleted);
        self
    }

    /// Set the updating user.
    pub fn updated_by(mut self, user_id: i64) -> Self {
        self.updated_by_user = Some(user_id);
        self
    }
}

/// Repository for file record operations.
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new file record.
    ///
    /// Fails with [`StowageError::RepeatedQuery`] when an active record
    /// already holds the path.
    pub async fn create(&self, file: &NewFileRecord) -> Result<FileRecord> {
        let result = sqlx::query(
            "INSERT INTO files (name, mimetype, size, path, created_by_user, updated_by_user)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.name)
        .bind(&file.mimetype)
        .bind(file.size)
        .bind(&file.path)
        .bind(file.user_id)
        .bind(file.user_id)
        .execute(self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StowageError::RepeatedQuery(file.path.clone())
            }
            e => StowageError::Database(e.to_string()),
        })?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| StowageError::NotFound("file".to_string()))
    }

    /// Get a file record by ID.
    pub async fn get_by_id(&self, file_id: i64) -> Result<Option<FileRecord>> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE file_id = ?");
        let file = sqlx::query_as::<_, FileRecord>(&query)
            .bind(file_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(file)
    }

    /// Get a record at a path, deleted or not. The active record is
    /// preferred, then the most recent deleted one.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let query = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE path = ? ORDER BY deleted, file_id DESC LIMIT 1"
        );
        let file = sqlx::query_as::<_, FileRecord>(&query)
            .bind(path)
            .fetch_optional(self.pool)
            .await?;

        Ok(file)
    }

    /// Get the active (not deleted) record at a path.
    pub async fn get_active_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ? AND deleted = 0");
        let file = sqlx::query_as::<_, FileRecord>(&query)
            .bind(path)
            .fetch_optional(self.pool)
            .await?;

        Ok(file)
    }

    /// Update a file record. `updated_at` is always refreshed.
    pub async fn update(&self, file_id: i64, update: &FileRecordUpdate) -> Result<Option<FileRecord>> {
        let mut query: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE files SET updated_at = datetime('now')");

        if let Some(ref name) = update.name {
            query.push(", name = ");
            query.push_bind(name);
        }

        if let Some(ref mimetype) = update.mimetype {
            query.push(", mimetype = ");
            query.push_bind(mimetype);
        }

        if let Some(size) = update.size {
            query.push(", size = ");
            query.push_bind(size);
        }

        if let Some(deleted) = update.deleted {
            query.push(", deleted = ");
            query.push_bind(deleted);
        }

        if let Some(user_id) = update.updated_by_user {
            query.push(", updated_by_user = ");
            query.push_bind(user_id);
        }

        query.push(" WHERE file_id = ");
        query.push_bind(file_id);

        let result = query.build().execute(self.pool).await.map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StowageError::RepeatedQuery(format!("file {file_id}"))
            }
            e => StowageError::Database(e.to_string()),
        })?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(file_id).await
    }

    /// Soft-delete a record.
    pub async fn mark_deleted(&self, file_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET deleted = 1, updated_at = datetime('now') WHERE file_id = ?",
        )
        .bind(file_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List active records (ordered by file_id).
    pub async fn list_active(&self) -> Result<Vec<FileRecord>> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE deleted = 0 ORDER BY file_id");
        let files = sqlx::query_as::<_, FileRecord>(&query)
            .fetch_all(self.pool)
            .await?;

        Ok(files)
    }

    /// Count all records at a path, including deleted ones.
    pub async fn count_by_path(&self, path: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE path = ?")
            .bind(path)
            .fetch_one(self.pool)
            .await?;

        Ok(count.0)
    }
}
