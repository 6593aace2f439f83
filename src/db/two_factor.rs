//! Two-factor secrets and backup codes

use super::models::{now, TwoFactorRecord};
use super::repository::{Database, DatabaseError};
use crate::security::totp;
use sqlx::types::Json;

impl Database {
    pub async fn get_two_factor(&self, user_id: i64) -> Result<Option<TwoFactorRecord>, DatabaseError> {
        Ok(sqlx::query_as::<_, TwoFactorRecord>(
            "SELECT user_id, secret, backup_codes, is_enabled, enabled_at FROM user_2fa WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Store a pending secret. An existing row is reset to disabled.
    pub async fn save_two_factor_setup(
        &self,
        user_id: i64,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<(), DatabaseError> {
        let now = now();
        sqlx::query(
            r#"
            INSERT INTO user_2fa (user_id, secret, backup_codes, is_enabled, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                secret = excluded.secret,
                backup_codes = excluded.backup_codes,
                is_enabled = 0,
                enabled_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(secret)
        .bind(Json(backup_codes))
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn set_two_factor_enabled(
        &self,
        user_id: i64,
        enabled: bool,
    ) -> Result<(), DatabaseError> {
        let now = now();
        let result = sqlx::query(
            r#"
            UPDATE user_2fa
            SET is_enabled = ?, enabled_at = CASE WHEN ? THEN ? ELSE NULL END, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(enabled)
        .bind(enabled)
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "2FA not set up for user {}",
                user_id
            )));
        }
        Ok(())
    }

    /// Spend one backup code. Returns the number left, or `None` when the
    /// code is not on the list.
    ///
    /// The write only lands if the list is still the one that was read, so
    /// concurrent requests with the same code cannot both succeed.
    pub async fn consume_backup_code(
        &self,
        user_id: i64,
        submitted: &str,
    ) -> Result<Option<usize>, DatabaseError> {
        loop {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT backup_codes FROM user_2fa WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(self.pool())
                    .await?;
            let Some(stored) = stored else {
                return Ok(None);
            };

            let mut codes: Vec<String> = serde_json::from_str(&stored)
                .map_err(|e| DatabaseError::Sqlx(sqlx::Error::Decode(Box::new(e))))?;
            if !totp::consume_backup_code(&mut codes, submitted) {
                return Ok(None);
            }

            let result = sqlx::query(
                "UPDATE user_2fa SET backup_codes = ?, updated_at = ? WHERE user_id = ? AND backup_codes = ?",
            )
            .bind(Json(&codes))
            .bind(now())
            .bind(user_id)
            .bind(&stored)
            .execute(self.pool())
            .await?;

            if result.rows_affected() == 1 {
                return Ok(Some(codes.len()));
            }
            // Lost the race; re-read and check the code again
        }
    }

    pub async fn delete_two_factor(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM user_2fa WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
