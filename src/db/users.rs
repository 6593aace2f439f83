//! User accounts and login sessions

use super::models::{now, NewUser, ProfileUpdate, User, UserSession};
use super::repository::{Database, DatabaseError};

impl Database {
    // ========================================================================
    // User operations
    // ========================================================================

    /// Insert a user. Duplicate email, username or mobile yields `Conflict`.
    pub async fn create_user(&self, user: &NewUser) -> Result<User, DatabaseError> {
        let now = now();
        let id = sqlx::query(
            r#"
            INSERT INTO users (email, username, mobile, password_hash, first_name, last_name, role, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(user.email.trim().to_lowercase())
        .bind(&user.username)
        .bind(&user.mobile)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.role)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| DatabaseError::conflict_on_unique(e, "User already exists"))?
        .last_insert_rowid();

        self.get_user(id).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User not found: {}", id)))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
                .bind(email.trim())
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Look up a login credential: email or username ignoring case, mobile exactly
    pub async fn find_user_by_credential(
        &self,
        credential: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let credential = credential.trim();
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE LOWER(email) = LOWER(?) OR LOWER(username) = LOWER(?) OR mobile = ?
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(credential)
        .bind(credential)
        .bind(credential)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Whether any of the identifiers is already taken
    pub async fn user_exists(
        &self,
        email: &str,
        username: Option<&str>,
        mobile: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE LOWER(email) = LOWER(?)
               OR (? IS NOT NULL AND LOWER(username) = LOWER(?))
               OR (? IS NOT NULL AND mobile = ?)
            "#,
        )
        .bind(email.trim())
        .bind(username)
        .bind(username)
        .bind(mobile)
        .bind(mobile)
        .fetch_one(self.pool())
        .await?;

        Ok(count > 0)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC, id DESC")
            .fetch_all(self.pool())
            .await?)
    }

    /// Ids of active users, optionally restricted to one role
    pub async fn active_user_ids(&self, role: Option<&str>) -> Result<Vec<i64>, DatabaseError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM users WHERE is_active = 1 AND (? IS NULL OR role = ?) ORDER BY id",
        )
        .bind(role)
        .bind(role)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn update_profile(
        &self,
        id: i64,
        update: &ProfileUpdate,
    ) -> Result<User, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                username = COALESCE(?, username),
                mobile = COALESCE(?, mobile),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.username)
        .bind(&update.mobile)
        .bind(now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| DatabaseError::conflict_on_unique(e, "Username or mobile already in use"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        }

        self.get_user(id).await
    }

    pub async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        }
        Ok(())
    }

    pub async fn update_role(&self, id: i64, role: &str) -> Result<User, DatabaseError> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role)
            .bind(now())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        }
        self.get_user(id).await
    }

    pub async fn set_user_active(&self, id: i64, active: bool) -> Result<User, DatabaseError> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        }
        self.get_user(id).await
    }

    pub async fn touch_last_login(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        }
        Ok(())
    }

    // ========================================================================
    // Session operations
    // ========================================================================

    pub async fn create_user_session(&self, session: &UserSession) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions (id, user_id, ip_address, user_agent, login_time, last_activity, is_active)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.login_time)
        .bind(&session.last_activity)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_user_session(&self, id: &str) -> Result<UserSession, DatabaseError> {
        sqlx::query_as::<_, UserSession>("SELECT * FROM user_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Session not found: {}", id)))
    }

    pub async fn touch_session(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE user_sessions SET last_activity = ? WHERE id = ? AND is_active = 1")
            .bind(now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// End one session. Returns false when it was not active.
    pub async fn end_session(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = 0, logout_time = ? WHERE id = ? AND is_active = 1",
        )
        .bind(now())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// End every active session of a user except `keep`
    pub async fn end_user_sessions(
        &self,
        user_id: i64,
        keep: Option<&str>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions SET is_active = 0, logout_time = ?
            WHERE user_id = ? AND is_active = 1 AND (? IS NULL OR id != ?)
            "#,
        )
        .bind(now())
        .bind(user_id)
        .bind(keep)
        .bind(keep)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_user_sessions(
        &self,
        user_id: i64,
        active_only: bool,
        limit: i64,
    ) -> Result<Vec<UserSession>, DatabaseError> {
        Ok(sqlx::query_as::<_, UserSession>(
            r#"
            SELECT * FROM user_sessions
            WHERE user_id = ? AND (? = 0 OR is_active = 1)
            ORDER BY login_time DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(active_only)
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }
}
