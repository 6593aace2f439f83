//! Custom role permissions

use super::models::{now, CustomPermission};
use super::repository::{Database, DatabaseError};

impl Database {
    pub async fn list_custom_permissions(&self) -> Result<Vec<CustomPermission>, DatabaseError> {
        Ok(sqlx::query_as::<_, CustomPermission>(
            "SELECT * FROM permissions ORDER BY role, resource, action",
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Returns false when the grant already existed
    pub async fn add_custom_permission(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO permissions (role, resource, action, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(role)
        .bind(resource)
        .bind(action)
        .bind(now())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_custom_permission(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM permissions WHERE role = ? AND resource = ? AND action = ?")
                .bind(role)
                .bind(resource)
                .bind(action)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
