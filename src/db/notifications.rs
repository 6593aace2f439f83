//! Notifications, their per-type settings and templates

use super::models::{now, NewNotification, Notification, NotificationSetting, NotificationTemplate};
use super::repository::{Database, DatabaseError};

impl Database {
    pub async fn insert_notification(&self, n: &NewNotification) -> Result<i64, DatabaseError> {
        let id = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, actor_id, type, resource_id, resource_type, message, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(n.user_id)
        .bind(n.actor_id)
        .bind(&n.kind)
        .bind(&n.resource_id)
        .bind(&n.resource_type)
        .bind(&n.message)
        .bind(now())
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    pub async fn list_notifications(
        &self,
        user_id: i64,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, DatabaseError> {
        Ok(sqlx::query_as::<_, Notification>(
            r#"
            SELECT n.id, n.user_id, n.actor_id,
                   CASE WHEN a.id IS NULL THEN NULL ELSE (a.first_name || ' ' || a.last_name) END AS actor_name,
                   n.type, n.resource_id, n.resource_type, n.message, n.is_read, n.created_at
            FROM notifications n
            LEFT JOIN users a ON a.id = n.actor_id
            WHERE n.user_id = ? AND (? = 0 OR n.is_read = 0)
            ORDER BY n.created_at DESC, n.id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn unread_notification_count(&self, user_id: i64) -> Result<i64, DatabaseError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?,
        )
    }

    /// Mark one of the user's notifications read; NotFound when nothing matched
    pub async fn mark_notification_read(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Notification not found".to_string()));
        }
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Settings & templates
    // ========================================================================

    pub async fn notification_setting(
        &self,
        kind: &str,
    ) -> Result<Option<NotificationSetting>, DatabaseError> {
        Ok(sqlx::query_as::<_, NotificationSetting>(
            "SELECT type, is_enabled_in_app, is_enabled_email, description FROM notification_settings WHERE type = ?",
        )
        .bind(kind)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn list_notification_settings(&self) -> Result<Vec<NotificationSetting>, DatabaseError> {
        Ok(sqlx::query_as::<_, NotificationSetting>(
            "SELECT type, is_enabled_in_app, is_enabled_email, description FROM notification_settings ORDER BY type",
        )
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn upsert_notification_setting(
        &self,
        setting: &NotificationSetting,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO notification_settings (type, is_enabled_in_app, is_enabled_email, description)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(type) DO UPDATE SET
                is_enabled_in_app = excluded.is_enabled_in_app,
                is_enabled_email = excluded.is_enabled_email,
                description = COALESCE(excluded.description, notification_settings.description)
            "#,
        )
        .bind(&setting.kind)
        .bind(setting.is_enabled_in_app)
        .bind(setting.is_enabled_email)
        .bind(&setting.description)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn notification_template(
        &self,
        kind: &str,
    ) -> Result<Option<NotificationTemplate>, DatabaseError> {
        Ok(sqlx::query_as::<_, NotificationTemplate>(
            "SELECT type, subject_template, message_template FROM notification_templates WHERE type = ?",
        )
        .bind(kind)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn list_notification_templates(&self) -> Result<Vec<NotificationTemplate>, DatabaseError> {
        Ok(sqlx::query_as::<_, NotificationTemplate>(
            "SELECT type, subject_template, message_template FROM notification_templates ORDER BY type",
        )
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn upsert_notification_template(
        &self,
        template: &NotificationTemplate,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO notification_templates (type, subject_template, message_template)
            VALUES (?, ?, ?)
            ON CONFLICT(type) DO UPDATE SET
                subject_template = excluded.subject_template,
                message_template = excluded.message_template
            "#,
        )
        .bind(&template.kind)
        .bind(&template.subject_template)
        .bind(&template.message_template)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;

    #[tokio::test]
    async fn test_notifications_read_flow() {
        let db = Database::in_memory().await.unwrap();
        let actor = db
            .create_user(&NewUser::new("actor@example.com", "h", "Grace", "Hopper"))
            .await
            .unwrap();
        let user = db
            .create_user(&NewUser::new("u@example.com", "h", "U", "S"))
            .await
            .unwrap();

        let id = db
            .insert_notification(&NewNotification {
                user_id: user.id,
                actor_id: Some(actor.id),
                kind: "MENTION".into(),
                resource_id: Some("brd-1".into()),
                resource_type: Some("brd".into()),
                message: "hi".into(),
            })
            .await
            .unwrap();

        let listed = db.list_notifications(user.id, true, 50).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].actor_name.as_deref(), Some("Grace Hopper"));

        // Only the recipient can mark it
        assert!(db.mark_notification_read(actor.id, id).await.is_err());
        db.mark_notification_read(user.id, id).await.unwrap();
        assert!(db.list_notifications(user.id, true, 50).await.unwrap().is_empty());
        assert_eq!(db.unread_notification_count(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settings_and_templates_upsert() {
        let db = Database::in_memory().await.unwrap();

        let mut setting = db.notification_setting("USER_LOGIN").await.unwrap().unwrap();
        assert!(setting.is_enabled_in_app);
        setting.is_enabled_in_app = false;
        db.upsert_notification_setting(&setting).await.unwrap();
        assert!(!db.notification_setting("USER_LOGIN").await.unwrap().unwrap().is_enabled_in_app);

        db.upsert_notification_template(&NotificationTemplate {
            kind: "MENTION".into(),
            subject_template: "Ping".into(),
            message_template: "{{actor_name}} pinged you".into(),
        })
        .await
        .unwrap();
        let template = db.notification_template("MENTION").await.unwrap().unwrap();
        assert_eq!(template.subject_template, "Ping");
        assert_eq!(db.list_notification_templates().await.unwrap().len(), 6);
    }
}
