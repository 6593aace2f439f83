//! Persisted collaboration operations and dashboard counters

use super::models::{CollaborationOperation, StatusCount};
use super::repository::{Database, DatabaseError};
use serde::Serialize;
use sqlx::types::Json;

/// Operation as held by the in-memory log, before persistence
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub brd_id: String,
    pub user_id: i64,
    pub operation_type: String,
    pub data: serde_json::Value,
    pub created_at: String,
}

/// Counters shown on the caller's dashboard
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub stories: i64,
    pub stories_by_status: Vec<StatusCount>,
    pub brds: i64,
    pub diagrams: i64,
    pub unread_notifications: i64,
}

impl Database {
    pub async fn persist_operations(&self, ops: &[NewOperation]) -> Result<usize, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        for op in ops {
            sqlx::query(
                r#"
                INSERT INTO collaboration_operations (brd_id, user_id, operation_type, data, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&op.brd_id)
            .bind(op.user_id)
            .bind(&op.operation_type)
            .bind(Json(&op.data))
            .bind(&op.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ops.len())
    }

    /// Most recent `limit` operations of a BRD, oldest first
    pub async fn restore_operations(
        &self,
        brd_id: &str,
        limit: i64,
    ) -> Result<Vec<CollaborationOperation>, DatabaseError> {
        let mut ops = sqlx::query_as::<_, CollaborationOperation>(
            r#"
            SELECT * FROM collaboration_operations
            WHERE brd_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(brd_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        ops.reverse();
        Ok(ops)
    }

    pub async fn dashboard_stats(&self, user_id: i64) -> Result<DashboardStats, DatabaseError> {
        let stories_by_status = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM user_stories WHERE user_id = ? GROUP BY status ORDER BY status",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let brds: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brd_documents WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;

        let diagrams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM diagrams WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;

        Ok(DashboardStats {
            stories: stories_by_status.iter().map(|s| s.count).sum(),
            stories_by_status,
            brds,
            diagrams,
            unread_notifications: self.unread_notification_count(user_id).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, StoryInput};
    use serde_json::json;

    #[tokio::test]
    async fn test_persist_and_restore_order() {
        let db = Database::in_memory().await.unwrap();

        let ops: Vec<NewOperation> = (1..=3)
            .map(|i| NewOperation {
                brd_id: "brd-1".into(),
                user_id: 1,
                operation_type: "content-change".into(),
                data: json!({ "seq": i }),
                created_at: format!("2026-01-01T00:00:0{}Z", i),
            })
            .collect();
        assert_eq!(db.persist_operations(&ops).await.unwrap(), 3);

        let restored = db.restore_operations("brd-1", 2).await.unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].data.0["seq"], 2);
        assert_eq!(restored[1].data.0["seq"], 3);
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .create_user(&NewUser::new("dash@example.com", "h", "D", "B"))
            .await
            .unwrap();

        for status in ["draft", "draft", "ready"] {
            db.create_story(
                user.id,
                &StoryInput {
                    title: Some("S".into()),
                    status: Some(status.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let stats = db.dashboard_stats(user.id).await.unwrap();
        assert_eq!(stats.stories, 3);
        assert_eq!(stats.stories_by_status[0].status, "draft");
        assert_eq!(stats.stories_by_status[0].count, 2);
        assert_eq!(stats.brds, 0);
    }
}
