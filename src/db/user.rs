//! User model for stowage.
//!
//! Users only appear as the creator/updater of file records.

/// A user that can own file records.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub user_id: i64,
    /// Login username (unique).
    pub username: String,
    /// Account creation timestamp.
    pub created_at: String,
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login username.
    pub username: String,
}

impl NewUser {
    /// Create a new user.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}
