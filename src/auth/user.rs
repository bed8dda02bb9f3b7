use sqlx::{Pool, Sqlite};

use crate::error::{AppError, Result};

/// User row type from database
type UserRow = (i64, String, String);

/// Stored user
///
/// `password` always holds a credential hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
}

impl User {
    fn from_row(row: UserRow) -> Self {
        let (id, username, password) = row;
        Self {
            id,
            username,
            password,
        }
    }
}

/// User store backed by SQLite
#[derive(Clone)]
pub struct UserStore {
    pool: Pool<Sqlite>,
}

impl UserStore {
    /// Create a new user store
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert a user whose password is already hashed
    ///
    /// Duplicate usernames fail on the table's UNIQUE constraint.
    pub async fn create(&self, username: &str, password_hash: &str) -> Result<User> {
        let result = sqlx::query("INSERT INTO users (username, password) VALUES (?1, ?2)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("user {} vanished after insert", id)))
    }

    /// Get user by ID
    pub async fn get(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, password FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from_row))
    }

    /// All users with the given username
    pub async fn find_by(&self, username: &str) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, username, password FROM users WHERE username = ?1 ORDER BY id",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from_row).collect())
    }

    /// First user with the given username
    ///
    /// Uniqueness comes from the schema; more than one match is logged, not assumed away.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let mut users = self.find_by(username).await?;
        if users.len() > 1 {
            tracing::warn!(
                "{} users share the username '{}', using the oldest",
                users.len(),
                username
            );
        }
        if users.is_empty() {
            Ok(None)
        } else {
            Ok(Some(users.swap_remove(0)))
        }
    }

    /// List all users
    pub async fn list(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, username, password FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(User::from_row).collect())
    }
}
