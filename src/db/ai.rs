//! Per-user AI settings and model-generated stories

use super::models::{now, AiConfiguration, AiStory};
use super::repository::{Database, DatabaseError};
use sqlx::types::Json;

/// Story fields produced by the model, ready to store
#[derive(Debug, Clone)]
pub struct NewAiStory {
    pub brd_id: Option<String>,
    pub diagram_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub estimated_points: i64,
    pub priority: String,
    pub business_value: Option<String>,
}

impl Database {
    // ========================================================================
    // AI configuration
    // ========================================================================

    pub async fn get_ai_config(&self, user_id: i64) -> Result<Option<AiConfiguration>, DatabaseError> {
        Ok(sqlx::query_as::<_, AiConfiguration>(
            r#"
            SELECT user_id, api_key, model, temperature, max_tokens, language, detail_level, created_at, updated_at
            FROM ai_configurations WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Insert or replace the user's settings. `config.api_key` must already be encrypted.
    pub async fn save_ai_config(&self, config: &AiConfiguration) -> Result<(), DatabaseError> {
        let now = now();
        sqlx::query(
            r#"
            INSERT INTO ai_configurations (user_id, api_key, model, temperature, max_tokens, language, detail_level, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                api_key = excluded.api_key,
                model = excluded.model,
                temperature = excluded.temperature,
                max_tokens = excluded.max_tokens,
                language = excluded.language,
                detail_level = excluded.detail_level,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(config.user_id)
        .bind(&config.api_key)
        .bind(&config.model)
        .bind(config.temperature)
        .bind(config.max_tokens)
        .bind(&config.language)
        .bind(&config.detail_level)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn delete_ai_config(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM ai_configurations WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // AI stories
    // ========================================================================

    pub async fn insert_ai_stories(
        &self,
        user_id: i64,
        stories: &[NewAiStory],
    ) -> Result<Vec<AiStory>, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let mut ids = Vec::with_capacity(stories.len());
        let now = now();

        for story in stories {
            let id = sqlx::query(
                r#"
                INSERT INTO ai_stories
                    (user_id, brd_id, diagram_id, title, description, acceptance_criteria, estimated_points, priority, business_value, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(&story.brd_id)
            .bind(story.diagram_id)
            .bind(&story.title)
            .bind(&story.description)
            .bind(Json(&story.acceptance_criteria))
            .bind(story.estimated_points)
            .bind(&story.priority)
            .bind(&story.business_value)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            ids.push(id);
        }

        tx.commit().await?;

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            created.push(self.get_ai_story(user_id, id).await?);
        }
        Ok(created)
    }

    pub async fn get_ai_story(&self, user_id: i64, id: i64) -> Result<AiStory, DatabaseError> {
        sqlx::query_as::<_, AiStory>("SELECT * FROM ai_stories WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound("AI story not found".to_string()))
    }

    pub async fn list_ai_stories(
        &self,
        user_id: i64,
        brd_id: Option<&str>,
    ) -> Result<Vec<AiStory>, DatabaseError> {
        Ok(sqlx::query_as::<_, AiStory>(
            r#"
            SELECT * FROM ai_stories
            WHERE user_id = ? AND (? IS NULL OR brd_id = ?)
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(brd_id)
        .bind(brd_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn delete_ai_story(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM ai_stories WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("AI story not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Brd, NewUser};

    #[tokio::test]
    async fn test_ai_config_upsert() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .create_user(&NewUser::new("ai@example.com", "h", "A", "I"))
            .await
            .unwrap();

        assert!(db.get_ai_config(user.id).await.unwrap().is_none());

        let mut config = AiConfiguration {
            user_id: user.id,
            api_key: "cipher".into(),
            model: "gpt-4".into(),
            temperature: 0.2,
            max_tokens: 1500,
            language: "en".into(),
            detail_level: "brief".into(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        db.save_ai_config(&config).await.unwrap();
        config.model = "gpt-4-turbo".into();
        db.save_ai_config(&config).await.unwrap();

        let stored = db.get_ai_config(user.id).await.unwrap().unwrap();
        assert_eq!(stored.model, "gpt-4-turbo");
        assert_eq!(stored.max_tokens, 1500);

        assert!(db.delete_ai_config(user.id).await.unwrap());
        assert!(!db.delete_ai_config(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_ai_stories_by_brd() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .create_user(&NewUser::new("s@example.com", "h", "S", "T"))
            .await
            .unwrap();
        let brd = db.create_brd(&Brd::new(user.id, "B", "c")).await.unwrap();

        let stories = db
            .insert_ai_stories(
                user.id,
                &[NewAiStory {
                    brd_id: Some(brd.id.clone()),
                    diagram_id: None,
                    title: "Pay by card".into(),
                    description: "As a buyer...".into(),
                    acceptance_criteria: vec!["card accepted".into()],
                    estimated_points: 3,
                    priority: "P1".into(),
                    business_value: None,
                }],
            )
            .await
            .unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].acceptance_criteria.0.len(), 1);

        assert_eq!(db.list_ai_stories(user.id, Some(&brd.id)).await.unwrap().len(), 1);
        assert!(db.list_ai_stories(user.id, Some("other")).await.unwrap().is_empty());

        db.delete_ai_story(user.id, stories[0].id).await.unwrap();
        assert!(db.list_ai_stories(user.id, None).await.unwrap().is_empty());
    }
}
