use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::Row;

use claimdesk_core::lifecycle::{PolicyLookup, StoreError};
use claimdesk_core::{normalize_category, CategoryPolicy};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlCategoryRepository {
    pool: DbPool,
}

impl SqlCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, policy: &CategoryPolicy) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO expense_category (name, requires_approval, requires_receipt, spending_limit, is_active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 requires_approval = excluded.requires_approval,
                 requires_receipt = excluded.requires_receipt,
                 spending_limit = excluded.spending_limit,
                 is_active = excluded.is_active",
        )
        .bind(normalize_category(&policy.name))
        .bind(policy.requires_approval)
        .bind(policy.requires_receipt)
        .bind(policy.spending_limit.to_string())
        .bind(policy.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<CategoryPolicy>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, requires_approval, requires_receipt, spending_limit, is_active
             FROM expense_category ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_policy).collect()
    }
}

fn row_to_policy(row: &sqlx::sqlite::SqliteRow) -> Result<CategoryPolicy, RepositoryError> {
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requires_approval: bool =
        row.try_get("requires_approval").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requires_receipt: bool =
        row.try_get("requires_receipt").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let spending_limit_str: String =
        row.try_get("spending_limit").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_active: bool =
        row.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let spending_limit = Decimal::from_str(&spending_limit_str).map_err(|error| {
        RepositoryError::Decode(format!("bad spending limit `{spending_limit_str}`: {error}"))
    })?;

    Ok(CategoryPolicy { name, requires_approval, requires_receipt, spending_limit, is_active })
}

#[async_trait]
impl PolicyLookup for SqlCategoryRepository {
    async fn get(&self, category: &str) -> Result<Option<CategoryPolicy>, StoreError> {
        let row = sqlx::query(
            "SELECT name, requires_approval, requires_receipt, spending_limit, is_active
             FROM expense_category WHERE name = ?",
        )
        .bind(normalize_category(category))
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::Unavailable(error.to_string()))?;

        match row {
            Some(ref row) => Ok(Some(row_to_policy(row).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use claimdesk_core::lifecycle::PolicyLookup;
    use claimdesk_core::{builtin_categories, CategoryPolicy};

    use super::SqlCategoryRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlCategoryRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlCategoryRepository::new(pool)
    }

    #[tokio::test]
    async fn save_and_get_normalizes_the_category_key() {
        let repo = setup().await;
        repo.save(&CategoryPolicy::new("Office Supplies").auto_approvable())
            .await
            .expect("save");

        let policy = repo.get(" office-supplies ").await.expect("get").expect("present");
        assert_eq!(policy.name, "office_supplies");
        assert!(!policy.requires_approval);
        assert!(repo.get("helicopters").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn list_returns_the_seeded_set() {
        let repo = setup().await;
        for policy in builtin_categories() {
            repo.save(&policy).await.expect("save");
        }

        let names: Vec<String> =
            repo.list().await.expect("list").into_iter().map(|policy| policy.name).collect();
        assert_eq!(names, ["accommodation", "food", "office_supplies", "others", "travel"]);
    }

    #[tokio::test]
    async fn upsert_replaces_policy_flags() {
        let repo = setup().await;
        repo.save(&CategoryPolicy::new("travel")).await.expect("save");

        let mut retired = CategoryPolicy::new("travel")
            .with_spending_limit(Decimal::new(2_500_00, 2));
        retired.is_active = false;
        repo.save(&retired).await.expect("upsert");

        let stored = repo.get("travel").await.expect("get").expect("present");
        assert!(!stored.is_active);
        assert_eq!(stored.spending_limit, Decimal::new(2_500_00, 2));
    }
}
