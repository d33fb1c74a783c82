use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::Row;

use claimdesk_core::lifecycle::{ClaimQuery, ClaimStore, StoreError};
use claimdesk_core::{Claim, ClaimId, ClaimStatus, ReimbursementMode, StatusChange};

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

const CLAIM_COLUMNS: &str = "id, owner_id, amount, tax_amount, total_amount, currency, category,
    description, expense_date, status, approver_id, finance_approver_id, rejection_reason,
    receipt_ref, reimbursement_mode, submission_date, approval_date, reimbursement_date,
    version, created_at, updated_at";

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_history(&self, claim_id: &str) -> Result<Vec<StatusChange>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT entry_id, status, changed_by, comments, changed_at
             FROM claim_status_history
             WHERE claim_id = ?
             ORDER BY changed_at ASC, rowid ASC",
        )
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_status_change).collect()
    }

    async fn fetch_claim(&self, id: &str) -> Result<Option<Claim>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CLAIM_COLUMNS} FROM claim WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => {
                let mut claim = row_to_claim(row)?;
                claim.status_history = self.fetch_history(id).await?;
                Ok(Some(claim))
            }
            None => Ok(None),
        }
    }
}

fn decode_decimal(raw: &str, column: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("bad decimal in `{column}`: {error}")))
}

fn decode_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("bad expense_date `{raw}`: {error}")))
}

fn decode_status(raw: &str) -> Result<ClaimStatus, RepositoryError> {
    ClaimStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown claim status `{raw}`")))
}

fn get_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn get_opt_text(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<String>, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_status_change(row: &sqlx::sqlite::SqliteRow) -> Result<StatusChange, RepositoryError> {
    Ok(StatusChange {
        entry_id: get_text(row, "entry_id")?,
        status: decode_status(&get_text(row, "status")?)?,
        changed_by: get_text(row, "changed_by")?,
        comments: get_opt_text(row, "comments")?,
        changed_at: parse_timestamp(&get_text(row, "changed_at")?)?,
    })
}

fn row_to_claim(row: &sqlx::sqlite::SqliteRow) -> Result<Claim, RepositoryError> {
    let reimbursement_mode = match get_opt_text(row, "reimbursement_mode")? {
        Some(raw) => Some(ReimbursementMode::parse(&raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown reimbursement mode `{raw}`"))
        })?),
        None => None,
    };
    let submission_date =
        get_opt_text(row, "submission_date")?.map(|raw| parse_timestamp(&raw)).transpose()?;
    let approval_date =
        get_opt_text(row, "approval_date")?.map(|raw| parse_timestamp(&raw)).transpose()?;
    let reimbursement_date =
        get_opt_text(row, "reimbursement_date")?.map(|raw| parse_timestamp(&raw)).transpose()?;
    let version: i64 = row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Claim {
        id: ClaimId(get_text(row, "id")?),
        owner_id: get_text(row, "owner_id")?,
        amount: decode_decimal(&get_text(row, "amount")?, "amount")?,
        tax_amount: decode_decimal(&get_text(row, "tax_amount")?, "tax_amount")?,
        total_amount: decode_decimal(&get_text(row, "total_amount")?, "total_amount")?,
        currency: get_text(row, "currency")?,
        category: get_text(row, "category")?,
        description: get_text(row, "description")?,
        expense_date: decode_date(&get_text(row, "expense_date")?)?,
        status: decode_status(&get_text(row, "status")?)?,
        approver_id: get_opt_text(row, "approver_id")?,
        finance_approver_id: get_opt_text(row, "finance_approver_id")?,
        rejection_reason: get_opt_text(row, "rejection_reason")?,
        receipt_ref: get_opt_text(row, "receipt_ref")?,
        reimbursement_mode,
        submission_date,
        approval_date,
        reimbursement_date,
        status_history: Vec::new(),
        version,
        created_at: parse_timestamp(&get_text(row, "created_at")?)?,
        updated_at: parse_timestamp(&get_text(row, "updated_at")?)?,
    })
}

#[async_trait]
impl ClaimStore for SqlClaimRepository {
    async fn get(&self, id: &ClaimId) -> Result<Option<Claim>, StoreError> {
        self.fetch_claim(&id.0).await.map_err(StoreError::from)
    }

    async fn insert(&self, claim: Claim) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let result = sqlx::query(&format!(
            "INSERT INTO claim ({CLAIM_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&claim.id.0)
        .bind(&claim.owner_id)
        .bind(claim.amount.to_string())
        .bind(claim.tax_amount.to_string())
        .bind(claim.total_amount.to_string())
        .bind(&claim.currency)
        .bind(&claim.category)
        .bind(&claim.description)
        .bind(claim.expense_date.format("%Y-%m-%d").to_string())
        .bind(claim.status.as_str())
        .bind(&claim.approver_id)
        .bind(&claim.finance_approver_id)
        .bind(&claim.rejection_reason)
        .bind(&claim.receipt_ref)
        .bind(claim.reimbursement_mode.map(|mode| mode.as_str()))
        .bind(claim.submission_date.map(|dt| dt.to_rfc3339()))
        .bind(claim.approval_date.map(|dt| dt.to_rfc3339()))
        .bind(claim.reimbursement_date.map(|dt| dt.to_rfc3339()))
        .bind(claim.version)
        .bind(claim.created_at.to_rfc3339())
        .bind(claim.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        if let Err(error) = result {
            if is_unique_violation(&error) {
                return Err(StoreError::DuplicateId(claim.id.0.clone()));
            }
            return Err(map_sqlx(error));
        }

        append_history(&mut tx, &claim).await?;
        tx.commit().await.map_err(map_sqlx)
    }

    async fn update(&self, claim: Claim) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Version-guarded write: only the writer holding the current
        // version commits, and the row moves to version + 1.
        let updated = sqlx::query(
            "UPDATE claim SET
                 owner_id = ?, amount = ?, tax_amount = ?, total_amount = ?, currency = ?,
                 category = ?, description = ?, expense_date = ?, status = ?, approver_id = ?,
                 finance_approver_id = ?, rejection_reason = ?, receipt_ref = ?,
                 reimbursement_mode = ?, submission_date = ?, approval_date = ?,
                 reimbursement_date = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&claim.owner_id)
        .bind(claim.amount.to_string())
        .bind(claim.tax_amount.to_string())
        .bind(claim.total_amount.to_string())
        .bind(&claim.currency)
        .bind(&claim.category)
        .bind(&claim.description)
        .bind(claim.expense_date.format("%Y-%m-%d").to_string())
        .bind(claim.status.as_str())
        .bind(&claim.approver_id)
        .bind(&claim.finance_approver_id)
        .bind(&claim.rejection_reason)
        .bind(&claim.receipt_ref)
        .bind(claim.reimbursement_mode.map(|mode| mode.as_str()))
        .bind(claim.submission_date.map(|dt| dt.to_rfc3339()))
        .bind(claim.approval_date.map(|dt| dt.to_rfc3339()))
        .bind(claim.reimbursement_date.map(|dt| dt.to_rfc3339()))
        .bind(claim.updated_at.to_rfc3339())
        .bind(&claim.id.0)
        .bind(claim.version)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if updated.rows_affected() == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM claim WHERE id = ?)")
                .bind(&claim.id.0)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if exists == 1 {
                return Err(StoreError::VersionConflict {
                    claim_id: claim.id.0.clone(),
                    expected: claim.version,
                });
            }
            return Err(StoreError::Unavailable(format!("claim `{}` vanished", claim.id.0)));
        }

        append_history(&mut tx, &claim).await?;
        tx.commit().await.map_err(map_sqlx)
    }

    async fn delete(&self, id: &ClaimId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM claim WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find(&self, query: &ClaimQuery) -> Result<Vec<Claim>, StoreError> {
        let limit = query.limit.map(i64::from).unwrap_or(-1);
        let offset = i64::from(query.offset.unwrap_or(0));

        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claim
             WHERE (?1 IS NULL OR owner_id = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR approver_id = ?3)
             ORDER BY created_at DESC, id ASC
             LIMIT ?4 OFFSET ?5"
        ))
        .bind(query.owner_id.as_deref())
        .bind(query.status.map(|status| status.as_str()))
        .bind(query.approver_id.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut claims = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut claim = row_to_claim(row).map_err(StoreError::from)?;
            claim.status_history =
                self.fetch_history(&claim.id.0).await.map_err(StoreError::from)?;
            claims.push(claim);
        }
        Ok(claims)
    }
}

/// History is append-only: known entry ids are left untouched so a
/// rewrite of past entries is impossible through this path.
async fn append_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    claim: &Claim,
) -> Result<(), StoreError> {
    for entry in &claim.status_history {
        sqlx::query(
            "INSERT INTO claim_status_history (entry_id, claim_id, status, changed_by, comments, changed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(entry_id) DO NOTHING",
        )
        .bind(&entry.entry_id)
        .bind(&claim.id.0)
        .bind(entry.status.as_str())
        .bind(&entry.changed_by)
        .bind(&entry.comments)
        .bind(entry.changed_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
    }
    Ok(())
}

fn map_sqlx(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}
