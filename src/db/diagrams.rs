//! Diagrams, owner scoped

use super::models::{now, Diagram, DiagramFilter, DiagramInput};
use super::repository::{Database, DatabaseError};

impl Database {
    pub async fn create_diagram(
        &self,
        user_id: i64,
        input: &DiagramInput,
    ) -> Result<Diagram, DatabaseError> {
        let title = input
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DatabaseError::QueryError("Title is required".to_string()))?;

        let now = now();
        let id = sqlx::query(
            r#"
            INSERT INTO diagrams (user_id, title, description, diagram_type, content, brd_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(&input.description)
        .bind(input.diagram_type.as_deref().unwrap_or("flowchart"))
        .bind(input.content.as_deref().unwrap_or(""))
        .bind(&input.brd_id)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        self.get_diagram(user_id, id).await
    }

    pub async fn get_diagram(&self, user_id: i64, id: i64) -> Result<Diagram, DatabaseError> {
        sqlx::query_as::<_, Diagram>("SELECT * FROM diagrams WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Diagram not found".to_string()))
    }

    pub async fn list_diagrams(
        &self,
        user_id: i64,
        filter: &DiagramFilter,
    ) -> Result<Vec<Diagram>, DatabaseError> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        Ok(sqlx::query_as::<_, Diagram>(
            r#"
            SELECT * FROM diagrams
            WHERE user_id = ?
              AND (? IS NULL OR diagram_type = ?)
              AND (? IS NULL OR title LIKE ? OR description LIKE ?)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(&filter.diagram_type)
        .bind(&filter.diagram_type)
        .bind(&search)
        .bind(&search)
        .bind(&search)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn update_diagram(
        &self,
        user_id: i64,
        id: i64,
        input: &DiagramInput,
    ) -> Result<Diagram, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE diagrams SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                diagram_type = COALESCE(?, diagram_type),
                content = COALESCE(?, content),
                brd_id = COALESCE(?, brd_id),
                updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.diagram_type)
        .bind(&input.content)
        .bind(&input.brd_id)
        .bind(now())
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Diagram not found".to_string()));
        }
        self.get_diagram(user_id, id).await
    }

    pub async fn delete_diagram(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM diagrams WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Diagram not found".to_string()));
        }
        Ok(())
    }
}
