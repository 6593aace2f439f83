//! User groups and memberships

use super::models::{now, Group, GroupMember};
use super::repository::{Database, DatabaseError};

const GROUP_SELECT: &str = r#"
    SELECT g.id, g.name, g.description, g.created_by,
           u.email AS created_by_email,
           (SELECT COUNT(*) FROM user_group_members m WHERE m.group_id = g.id) AS member_count,
           g.created_at, g.updated_at
    FROM user_groups g
    LEFT JOIN users u ON u.id = g.created_by
"#;

impl Database {
    pub async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: i64,
    ) -> Result<Group, DatabaseError> {
        let now = now();
        let id = sqlx::query(
            "INSERT INTO user_groups (name, description, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name.trim())
        .bind(description)
        .bind(created_by)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| DatabaseError::conflict_on_unique(e, "Group already exists"))?
        .last_insert_rowid();

        self.get_group(id).await
    }

    pub async fn get_group(&self, id: i64) -> Result<Group, DatabaseError> {
        let sql = format!("{} WHERE g.id = ?", GROUP_SELECT);
        sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Group not found".to_string()))
    }

    pub async fn list_groups(&self, limit: i64, offset: i64) -> Result<(Vec<Group>, i64), DatabaseError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_groups")
            .fetch_one(self.pool())
            .await?;

        let sql = format!("{} ORDER BY g.created_at DESC, g.id DESC LIMIT ? OFFSET ?", GROUP_SELECT);
        let rows = sqlx::query_as::<_, Group>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;

        Ok((rows, total))
    }

    /// Groups the user belongs to
    pub async fn groups_for_user(&self, user_id: i64) -> Result<Vec<Group>, DatabaseError> {
        let sql = format!(
            "{} WHERE g.id IN (SELECT group_id FROM user_group_members WHERE user_id = ?) ORDER BY g.name",
            GROUP_SELECT
        );
        Ok(sqlx::query_as::<_, Group>(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?)
    }

    pub async fn update_group(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Group, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE user_groups
            SET name = COALESCE(?, name), description = COALESCE(?, description), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name.map(str::trim))
        .bind(description)
        .bind(now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| DatabaseError::conflict_on_unique(e, "Group already exists"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Group not found".to_string()));
        }
        self.get_group(id).await
    }

    pub async fn delete_group(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM user_groups WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Group not found".to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Add a member after checking the group and user exist
    pub async fn add_group_member(
        &self,
        group_id: i64,
        user_id: i64,
        role: &str,
    ) -> Result<GroupMember, DatabaseError> {
        self.get_group(group_id).await?;
        self.get_user(user_id).await?;

        sqlx::query(
            "INSERT INTO user_group_members (group_id, user_id, role, added_at) VALUES (?, ?, ?, ?)",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .bind(now())
        .execute(self.pool())
        .await
        .map_err(|e| DatabaseError::conflict_on_unique(e, "User is already a member of this group"))?;

        self.list_group_members(group_id)
            .await?
            .into_iter()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| DatabaseError::QueryError("Membership not visible after insert".to_string()))
    }

    pub async fn remove_group_member(&self, group_id: i64, user_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM user_group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("Member not found in group".to_string()));
        }
        Ok(())
    }

    pub async fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMember>, DatabaseError> {
        Ok(sqlx::query_as::<_, GroupMember>(
            r#"
            SELECT m.group_id, m.user_id, m.role, m.added_at, u.email, u.first_name, u.last_name
            FROM user_group_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = ?
            ORDER BY m.added_at ASC, m.id ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(self.pool())
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;

    #[tokio::test]
    async fn test_groups_and_members() {
        let db = Database::in_memory().await.unwrap();
        let admin = db
            .create_user(&NewUser::new("admin@example.com", "h", "A", "D").with_role("admin"))
            .await
            .unwrap();
        let member = db
            .create_user(&NewUser::new("m@example.com", "h", "M", "E"))
            .await
            .unwrap();

        let group = db.create_group("Payments", Some("Squad"), admin.id).await.unwrap();
        assert_eq!(group.created_by_email.as_deref(), Some("admin@example.com"));
        assert_eq!(group.member_count, 0);

        assert!(matches!(
            db.create_group("Payments", None, admin.id).await,
            Err(DatabaseError::Conflict(_))
        ));

        let added = db.add_group_member(group.id, member.id, "member").await.unwrap();
        assert_eq!(added.email, "m@example.com");
        assert!(matches!(
            db.add_group_member(group.id, member.id, "member").await,
            Err(DatabaseError::Conflict(_))
        ));
        assert!(matches!(
            db.add_group_member(group.id, 9999, "member").await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(matches!(
            db.add_group_member(9999, member.id, "member").await,
            Err(DatabaseError::NotFound(_))
        ));

        let (groups, total) = db.list_groups(20, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(groups[0].member_count, 1);
        assert_eq!(db.groups_for_user(member.id).await.unwrap().len(), 1);

        db.remove_group_member(group.id, member.id).await.unwrap();
        assert!(db.remove_group_member(group.id, member.id).await.is_err());
        db.delete_group(group.id).await.unwrap();
    }
}
