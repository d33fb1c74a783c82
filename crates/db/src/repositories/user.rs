use async_trait::async_trait;
use sqlx::Row;

use claimdesk_core::lifecycle::{ManagerDirectory, StoreError};
use claimdesk_core::Role;

use super::{parse_timestamp, RepositoryError, UserRecord, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: String =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = Role::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_str}`")))?;

    Ok(UserRecord {
        id,
        name,
        role,
        manager_id,
        department,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

#[async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, role, manager_id, department, created_at, updated_at
             FROM app_user WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_user(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user: UserRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, role, manager_id, department, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 role = excluded.role,
                 manager_id = excluded.manager_id,
                 department = excluded.department,
                 updated_at = excluded.updated_at",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(&user.manager_id)
        .bind(&user.department)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ManagerDirectory for SqlUserRepository {
    async fn manager_of(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let manager: Option<Option<String>> =
            sqlx::query_scalar("SELECT manager_id FROM app_user WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        Ok(manager.flatten())
    }

    async fn department_manager(&self, department: &str) -> Result<Option<String>, StoreError> {
        // Deterministic pick when a department has several managers.
        let manager: Option<String> = sqlx::query_scalar(
            "SELECT id FROM app_user
             WHERE department = ? AND role = 'manager'
             ORDER BY id ASC LIMIT 1",
        )
        .bind(department)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use claimdesk_core::lifecycle::ManagerDirectory;
    use claimdesk_core::Role;

    use super::SqlUserRepository;
    use crate::repositories::{UserRecord, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn user(id: &str, role: Role, manager_id: Option<&str>, department: &str) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: id.to_string(),
            name: id.to_string(),
            role,
            manager_id: manager_id.map(String::from),
            department: department.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trips_a_principal() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(user("u-mgr-1", Role::Manager, None, "engineering")).await.expect("save mgr");
        repo.save(user("u-emp", Role::Employee, Some("u-mgr-1"), "engineering"))
            .await
            .expect("save emp");

        let found = repo.find_by_id("u-emp").await.expect("find").expect("present");
        assert_eq!(found.role, Role::Employee);
        let principal = found.principal();
        assert_eq!(principal.manager_id.as_deref(), Some("u-mgr-1"));
        assert_eq!(principal.department, "engineering");
    }

    #[tokio::test]
    async fn manager_lookup_follows_the_reporting_line() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(user("u-mgr-1", Role::Manager, None, "engineering")).await.expect("save mgr");
        repo.save(user("u-emp", Role::Employee, Some("u-mgr-1"), "engineering"))
            .await
            .expect("save emp");

        assert_eq!(repo.manager_of("u-emp").await.expect("lookup").as_deref(), Some("u-mgr-1"));
        assert_eq!(repo.manager_of("u-mgr-1").await.expect("lookup"), None);
        assert_eq!(repo.manager_of("u-ghost").await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn department_manager_picks_a_manager_in_the_department() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(user("u-mgr-b", Role::Manager, None, "sales")).await.expect("save");
        repo.save(user("u-mgr-a", Role::Manager, None, "sales")).await.expect("save");
        repo.save(user("u-fin", Role::Finance, None, "finance")).await.expect("save");

        let picked = repo.department_manager("sales").await.expect("lookup");
        assert_eq!(picked.as_deref(), Some("u-mgr-a"));
        assert_eq!(repo.department_manager("finance").await.expect("lookup"), None);
    }
}
