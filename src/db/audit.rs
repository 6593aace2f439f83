//! Audit trail

use super::models::{now, AuditLog, NewAuditLog};
use super::repository::{Database, DatabaseError};

impl Database {
    pub async fn log_audit(&self, entry: &NewAuditLog) -> Result<i64, DatabaseError> {
        let id = sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, entity_type, entity_id, old_values, new_values, ip_address, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.old_values.as_ref().map(|v| v.to_string()))
        .bind(entry.new_values.as_ref().map(|v| v.to_string()))
        .bind(&entry.ip_address)
        .bind(now())
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    /// Audit entries, newest first. `user_id` and `action` narrow the result.
    pub async fn list_audit_logs(
        &self,
        user_id: Option<i64>,
        action: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AuditLog>, DatabaseError> {
        Ok(sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR action = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(action)
        .bind(action)
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use serde_json::json;

    #[tokio::test]
    async fn test_audit_roundtrip_and_filters() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .create_user(&NewUser::new("a@example.com", "h", "A", "B"))
            .await
            .unwrap();

        db.log_audit(
            &NewAuditLog::new(user.id, "USER_STORY_CREATED", "user_story")
                .entity(7)
                .new_values(json!({"title": "Checkout"})),
        )
        .await
        .unwrap();
        db.log_audit(&NewAuditLog::new(user.id, "USER_LOGIN", "user").entity(user.id))
            .await
            .unwrap();

        let all = db.list_audit_logs(Some(user.id), None, 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let created = db
            .list_audit_logs(None, Some("USER_STORY_CREATED"), 10)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].entity_id.as_deref(), Some("7"));
        assert!(created[0].new_values.as_deref().unwrap().contains("Checkout"));
    }
}
