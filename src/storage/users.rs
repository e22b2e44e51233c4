use super::schema::Database;
use super::types::{DatabaseError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Conflict` if the name is taken.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (name, created_at, updated_at) VALUES (?, ?, ?)
             RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::conflict_or(e, format!("user '{}'", name)))?;
        Ok(row.into_user())
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<User, DatabaseError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(UserRow::into_user)
            .ok_or_else(|| DatabaseError::NotFound(format!("user '{}'", name)))
    }

    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(UserRow::into_user)
            .ok_or_else(|| DatabaseError::NotFound(format!("user #{}", id)))
    }

    /// All users, ordered by name.
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, name, created_at, updated_at FROM users ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }
}
