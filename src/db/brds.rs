//! BRD documents, versions, analysis cache and comments

use super::models::{now, Brd, BrdAnalysis, BrdComment, BrdUpdate, BrdVersion};
use super::repository::{Database, DatabaseError};

impl Database {
    // ========================================================================
    // Documents
    // ========================================================================

    /// Insert a BRD together with its version 1 snapshot
    pub async fn create_brd(&self, brd: &Brd) -> Result<Brd, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO brd_documents (id, user_id, title, content, story_ids, template, status, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&brd.id)
        .bind(brd.user_id)
        .bind(&brd.title)
        .bind(&brd.content)
        .bind(&brd.story_ids)
        .bind(&brd.template)
        .bind(&brd.status)
        .bind(brd.version)
        .bind(&brd.created_at)
        .bind(&brd.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO brd_versions (brd_id, version_number, title, content, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&brd.id)
        .bind(brd.version)
        .bind(&brd.title)
        .bind(&brd.content)
        .bind(brd.user_id)
        .bind(&brd.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_brd(brd.user_id, &brd.id).await
    }

    pub async fn get_brd(&self, user_id: i64, id: &str) -> Result<Brd, DatabaseError> {
        sqlx::query_as::<_, Brd>("SELECT * FROM brd_documents WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound("BRD not found".to_string()))
    }

    /// One page of the user's BRDs, newest first, with the total count
    pub async fn list_brds(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Brd>, i64), DatabaseError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brd_documents WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;

        let rows = sqlx::query_as::<_, Brd>(
            r#"
            SELECT * FROM brd_documents
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(self.pool())
        .await?;

        Ok((rows, total))
    }

    /// Apply an update. A content or title change bumps the version and snapshots it.
    pub async fn update_brd(
        &self,
        user_id: i64,
        id: &str,
        update: &BrdUpdate,
    ) -> Result<Brd, DatabaseError> {
        let current = self.get_brd(user_id, id).await?;

        let title = update.title.clone().unwrap_or_else(|| current.title.clone());
        let content = update.content.clone().unwrap_or_else(|| current.content.clone());
        let status = update.status.clone().unwrap_or_else(|| current.status.clone());

        let changed = title != current.title || content != current.content;
        let version = if changed { current.version + 1 } else { current.version };
        let now = now();

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            UPDATE brd_documents
            SET title = ?, content = ?, status = ?, version = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&title)
        .bind(&content)
        .bind(&status)
        .bind(version)
        .bind(&now)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if changed {
            sqlx::query(
                r#"
                INSERT INTO brd_versions (brd_id, version_number, title, content, created_by, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(version)
            .bind(&title)
            .bind(&content)
            .bind(user_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_brd(user_id, id).await
    }

    pub async fn delete_brd(&self, user_id: i64, id: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM brd_documents WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("BRD not found".to_string()));
        }
        Ok(())
    }

    /// Whether a BRD with this id exists for anyone
    pub async fn brd_exists(&self, id: &str) -> Result<bool, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brd_documents WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(count > 0)
    }

    // ========================================================================
    // Versions
    // ========================================================================

    pub async fn list_brd_versions(
        &self,
        user_id: i64,
        brd_id: &str,
    ) -> Result<Vec<BrdVersion>, DatabaseError> {
        self.get_brd(user_id, brd_id).await?;

        Ok(sqlx::query_as::<_, BrdVersion>(
            "SELECT * FROM brd_versions WHERE brd_id = ? ORDER BY version_number DESC",
        )
        .bind(brd_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn get_brd_version(
        &self,
        user_id: i64,
        brd_id: &str,
        version_number: i64,
    ) -> Result<BrdVersion, DatabaseError> {
        self.get_brd(user_id, brd_id).await?;

        sqlx::query_as::<_, BrdVersion>(
            "SELECT * FROM brd_versions WHERE brd_id = ? AND version_number = ?",
        )
        .bind(brd_id)
        .bind(version_number)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Version {} not found", version_number)))
    }

    // ========================================================================
    // Analysis cache
    // ========================================================================

    pub async fn save_brd_analysis(&self, analysis: &BrdAnalysis) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO brd_analysis (brd_id, score, risk_level, summary, strengths, gaps, suggestions, analyzed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(brd_id) DO UPDATE SET
                score = excluded.score,
                risk_level = excluded.risk_level,
                summary = excluded.summary,
                strengths = excluded.strengths,
                gaps = excluded.gaps,
                suggestions = excluded.suggestions,
                analyzed_at = excluded.analyzed_at
            "#,
        )
        .bind(&analysis.brd_id)
        .bind(analysis.score)
        .bind(&analysis.risk_level)
        .bind(&analysis.summary)
        .bind(&analysis.strengths)
        .bind(&analysis.gaps)
        .bind(&analysis.suggestions)
        .bind(&analysis.analyzed_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_brd_analysis(&self, brd_id: &str) -> Result<BrdAnalysis, DatabaseError> {
        sqlx::query_as::<_, BrdAnalysis>(
            r#"
            SELECT brd_id, score, risk_level, summary, strengths, gaps, suggestions, analyzed_at
            FROM brd_analysis WHERE brd_id = ?
            "#,
        )
        .bind(brd_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound("No analysis for this BRD".to_string()))
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub async fn add_brd_comment(
        &self,
        brd_id: &str,
        user_id: i64,
        section_id: Option<&str>,
        content: &str,
    ) -> Result<BrdComment, DatabaseError> {
        let id = sqlx::query(
            "INSERT INTO brd_comments (brd_id, user_id, section_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(brd_id)
        .bind(user_id)
        .bind(section_id)
        .bind(content)
        .bind(now())
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        self.get_brd_comment(id).await
    }

    pub async fn get_brd_comment(&self, id: i64) -> Result<BrdComment, DatabaseError> {
        sqlx::query_as::<_, BrdComment>(
            r#"
            SELECT c.id, c.brd_id, c.user_id, (u.first_name || ' ' || u.last_name) AS author_name,
                   c.section_id, c.content, c.created_at
            FROM brd_comments c
            JOIN users u ON u.id = c.user_id
            WHERE c.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound("Comment not found".to_string()))
    }

    pub async fn list_brd_comments(&self, brd_id: &str) -> Result<Vec<BrdComment>, DatabaseError> {
        Ok(sqlx::query_as::<_, BrdComment>(
            r#"
            SELECT c.id, c.brd_id, c.user_id, (u.first_name || ' ' || u.last_name) AS author_name,
                   c.section_id, c.content, c.created_at
            FROM brd_comments c
            JOIN users u ON u.id = c.user_id
            WHERE c.brd_id = ?
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(brd_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn delete_brd_comment(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM brd_comments WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Comment not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use sqlx::types::Json;

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .create_user(&NewUser::new("brd@example.com", "h", "B", "R"))
            .await
            .unwrap();
        (db, user.id)
    }

    #[tokio::test]
    async fn test_create_writes_first_version() {
        let (db, user) = setup().await;
        let brd = db
            .create_brd(&Brd::new(user, "Payments", "# Intro").with_stories(vec![1, 2]))
            .await
            .unwrap();

        assert_eq!(brd.version, 1);
        assert_eq!(brd.story_ids.0, vec![1, 2]);

        let versions = db.list_brd_versions(user, &brd.id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].content, "# Intro");
    }

    #[tokio::test]
    async fn test_update_bumps_version_only_on_change() {
        let (db, user) = setup().await;
        let brd = db.create_brd(&Brd::new(user, "Payments", "v1")).await.unwrap();

        let same = db
            .update_brd(
                user,
                &brd.id,
                &BrdUpdate {
                    status: Some("review".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.version, 1);
        assert_eq!(same.status, "review");

        let changed = db
            .update_brd(
                user,
                &brd.id,
                &BrdUpdate {
                    content: Some("v2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(changed.version, 2);

        let v2 = db.get_brd_version(user, &brd.id, 2).await.unwrap();
        assert_eq!(v2.content, "v2");
        let v1 = db.get_brd_version(user, &brd.id, 1).await.unwrap();
        assert_eq!(v1.content, "v1");
        assert!(db.get_brd_version(user, &brd.id, 3).await.is_err());
    }

    #[tokio::test]
    async fn test_pagination() {
        let (db, user) = setup().await;
        for i in 0..5 {
            db.create_brd(&Brd::new(user, format!("BRD {}", i), "x"))
                .await
                .unwrap();
        }

        let (page, total) = db.list_brds(user, 3, 20).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_analysis_upsert() {
        let (db, user) = setup().await;
        let brd = db.create_brd(&Brd::new(user, "A", "x")).await.unwrap();

        let mut analysis = BrdAnalysis {
            brd_id: brd.id.clone(),
            score: 60,
            risk_level: "Medium".into(),
            summary: "ok".into(),
            strengths: Json(vec!["clear".into()]),
            gaps: Json(vec![]),
            suggestions: Json(vec![]),
            analyzed_at: now(),
        };
        db.save_brd_analysis(&analysis).await.unwrap();
        analysis.score = 85;
        db.save_brd_analysis(&analysis).await.unwrap();

        let stored = db.get_brd_analysis(&brd.id).await.unwrap();
        assert_eq!(stored.score, 85);
        assert_eq!(stored.strengths.0, vec!["clear".to_string()]);
    }

    #[tokio::test]
    async fn test_comments_and_cascade() {
        let (db, user) = setup().await;
        let brd = db.create_brd(&Brd::new(user, "A", "x")).await.unwrap();

        let comment = db
            .add_brd_comment(&brd.id, user, Some("scope"), "Needs numbers")
            .await
            .unwrap();
        assert_eq!(comment.author_name, "B R");
        assert_eq!(db.list_brd_comments(&brd.id).await.unwrap().len(), 1);

        db.delete_brd(user, &brd.id).await.unwrap();
        assert!(db.get_brd_comment(comment.id).await.is_err());
        assert!(!db.brd_exists(&brd.id).await.unwrap());
    }
}
