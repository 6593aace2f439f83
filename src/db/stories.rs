//! User stories, owner scoped

use super::models::{now, StoryFilter, StoryInput, UserStory};
use super::repository::{Database, DatabaseError};
use sqlx::types::Json;

impl Database {
    pub async fn create_story(
        &self,
        user_id: i64,
        input: &StoryInput,
    ) -> Result<UserStory, DatabaseError> {
        let title = input
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DatabaseError::QueryError("Title is required".to_string()))?;

        let now = now();
        let id = sqlx::query(
            r#"
            INSERT INTO user_stories
                (user_id, group_id, title, description, acceptance_criteria, priority, status, tags, estimated_points, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(input.group_id)
        .bind(title)
        .bind(&input.description)
        .bind(&input.acceptance_criteria)
        .bind(input.priority.as_deref().unwrap_or("Medium"))
        .bind(input.status.as_deref().unwrap_or("draft"))
        .bind(Json(input.tags.clone().unwrap_or_default()))
        .bind(input.estimated_points)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        self.get_story(user_id, id).await
    }

    pub async fn get_story(&self, user_id: i64, id: i64) -> Result<UserStory, DatabaseError> {
        sqlx::query_as::<_, UserStory>("SELECT * FROM user_stories WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound("User story not found".to_string()))
    }

    pub async fn list_stories(
        &self,
        user_id: i64,
        filter: &StoryFilter,
    ) -> Result<Vec<UserStory>, DatabaseError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        Ok(sqlx::query_as::<_, UserStory>(
            r#"
            SELECT * FROM user_stories
            WHERE user_id = ?
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR priority = ?)
              AND (? IS NULL OR title LIKE ? OR description LIKE ?)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(&filter.status)
        .bind(&filter.status)
        .bind(&filter.priority)
        .bind(&filter.priority)
        .bind(&search)
        .bind(&search)
        .bind(&search)
        .fetch_all(self.pool())
        .await?)
    }

    /// Stories among `ids` that belong to the user, in the order requested
    pub async fn stories_by_ids(
        &self,
        user_id: i64,
        ids: &[i64],
    ) -> Result<Vec<UserStory>, DatabaseError> {
        let mut stories = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_story(user_id, *id).await {
                Ok(story) => stories.push(story),
                Err(DatabaseError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(stories)
    }

    /// COALESCE update: absent fields keep their stored value
    pub async fn update_story(
        &self,
        user_id: i64,
        id: i64,
        input: &StoryInput,
    ) -> Result<UserStory, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE user_stories SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                acceptance_criteria = COALESCE(?, acceptance_criteria),
                priority = COALESCE(?, priority),
                status = COALESCE(?, status),
                tags = COALESCE(?, tags),
                group_id = COALESCE(?, group_id),
                estimated_points = COALESCE(?, estimated_points),
                updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.acceptance_criteria)
        .bind(&input.priority)
        .bind(&input.status)
        .bind(input.tags.as_ref().map(Json))
        .bind(input.group_id)
        .bind(input.estimated_points)
        .bind(now())
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("User story not found".to_string()));
        }

        self.get_story(user_id, id).await
    }

    pub async fn delete_story(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM user_stories WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("User story not found".to_string()));
        }
        Ok(())
    }
}
