use std::sync::Arc;

use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use tempfile::TempDir;

use claimdesk_core::lifecycle::{ClaimLifecycle, NewClaim, ReviewInput};
use claimdesk_core::{builtin_categories, ClaimStatus, NoopAuditSink, Principal, ReimbursementMode, Role};
use claimdesk_db::repositories::{UserRecord, UserRepository};
use claimdesk_db::{
    connect_with_settings, migrations, FsReceiptStore, SqlCategoryRepository, SqlClaimRepository,
    SqlUserRepository,
};

struct SqlHarness {
    lifecycle: ClaimLifecycle,
    _receipts_dir: TempDir,
}

async fn sql_harness() -> SqlHarness {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let users = SqlUserRepository::new(pool.clone());
    let now = Utc::now();
    for (id, role, manager_id, department) in [
        ("u-mgr-1", Role::Manager, None, "engineering"),
        ("u-emp", Role::Employee, Some("u-mgr-1"), "engineering"),
        ("u-fin", Role::Finance, None, "finance"),
    ] {
        users
            .save(UserRecord {
                id: id.to_string(),
                name: id.to_string(),
                role,
                manager_id: manager_id.map(String::from),
                department: department.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed user");
    }

    let categories = SqlCategoryRepository::new(pool.clone());
    for policy in builtin_categories() {
        categories.save(&policy).await.expect("seed category");
    }

    let receipts_dir = TempDir::new().expect("tempdir");
    let lifecycle = ClaimLifecycle::new(
        Arc::new(SqlClaimRepository::new(pool.clone())),
        Arc::new(SqlCategoryRepository::new(pool.clone())),
        Arc::new(SqlUserRepository::new(pool)),
        Arc::new(FsReceiptStore::new(receipts_dir.path(), 1024 * 1024)),
        Arc::new(NoopAuditSink),
    );
    SqlHarness { lifecycle, _receipts_dir: receipts_dir }
}

fn employee() -> Principal {
    Principal::new("u-emp", Role::Employee)
        .with_manager("u-mgr-1")
        .with_department("engineering")
}

fn new_claim(amount: Decimal, category: &str) -> NewClaim {
    NewClaim {
        amount,
        tax_amount: Decimal::ZERO,
        currency: None,
        category: category.to_string(),
        description: "quarterly business trip".to_string(),
        expense_date: NaiveDate::from_ymd_opt(2026, 8, 5).expect("valid date"),
        receipt_ref: Some("demo/trip.pdf".to_string()),
    }
}

#[tokio::test]
async fn full_review_flow_persists_through_sql() {
    let harness = sql_harness().await;
    let lifecycle = &harness.lifecycle;

    let draft = lifecycle
        .create(&employee(), new_claim(Decimal::new(5_000_00, 2), "travel"))
        .await
        .expect("create");
    let submitted = lifecycle.submit(&employee(), &draft.id).await.expect("submit");
    assert_eq!(submitted.status, ClaimStatus::UnderReview);
    assert_eq!(submitted.approver_id.as_deref(), Some("u-mgr-1"));

    let manager = Principal::new("u-mgr-1", Role::Manager);
    lifecycle
        .approve(&manager, &draft.id, ReviewInput::default())
        .await
        .expect("approve");

    let finance = Principal::new("u-fin", Role::Finance);
    let reimbursed = lifecycle
        .approve(
            &finance,
            &draft.id,
            ReviewInput {
                reimbursement_mode: Some(ReimbursementMode::Cheque),
                ..ReviewInput::default()
            },
        )
        .await
        .expect("reimburse");

    assert_eq!(reimbursed.status, ClaimStatus::Reimbursed);
    assert_eq!(reimbursed.reimbursement_mode, Some(ReimbursementMode::Cheque));

    // Reload through the repository: everything survived the trip.
    let stored = lifecycle.get(&finance, &draft.id).await.expect("reload");
    let statuses: Vec<ClaimStatus> =
        stored.status_history.iter().map(|entry| entry.status).collect();
    assert_eq!(
        statuses,
        [
            ClaimStatus::Submitted,
            ClaimStatus::UnderReview,
            ClaimStatus::Approved,
            ClaimStatus::Reimbursed
        ]
    );
    assert!(stored.history_is_consistent());
    assert_eq!(stored.finance_approver_id.as_deref(), Some("u-fin"));
}

#[tokio::test]
async fn auto_approval_persists_two_history_entries() {
    let harness = sql_harness().await;
    let lifecycle = &harness.lifecycle;

    let draft = lifecycle
        .create(&employee(), new_claim(Decimal::new(200_00, 2), "office_supplies"))
        .await
        .expect("create");
    let approved = lifecycle.submit(&employee(), &draft.id).await.expect("submit");
    assert_eq!(approved.status, ClaimStatus::Approved);

    let stored = lifecycle.get(&employee(), &draft.id).await.expect("reload");
    let statuses: Vec<ClaimStatus> =
        stored.status_history.iter().map(|entry| entry.status).collect();
    assert_eq!(statuses, [ClaimStatus::Submitted, ClaimStatus::Approved]);
    assert!(stored.approval_date.is_some());
}

#[tokio::test]
async fn rejection_reason_survives_the_round_trip() {
    let harness = sql_harness().await;
    let lifecycle = &harness.lifecycle;

    let draft = lifecycle
        .create(&employee(), new_claim(Decimal::new(2_000_00, 2), "travel"))
        .await
        .expect("create");
    lifecycle.submit(&employee(), &draft.id).await.expect("submit");

    let manager = Principal::new("u-mgr-1", Role::Manager);
    lifecycle
        .reject(&manager, &draft.id, "no itinerary attached")
        .await
        .expect("reject");

    let stored = lifecycle.get(&manager, &draft.id).await.expect("reload");
    assert_eq!(stored.status, ClaimStatus::Rejected);
    assert_eq!(stored.rejection_reason.as_deref(), Some("no itinerary attached"));
    let last = stored.status_history.last().expect("history present");
    assert_eq!(last.changed_by, "u-mgr-1");
    assert_eq!(last.comments.as_deref(), Some("no itinerary attached"));
}

#[tokio::test]
async fn draft_delete_removes_the_row() {
    let harness = sql_harness().await;
    let lifecycle = &harness.lifecycle;

    let draft = lifecycle
        .create(&employee(), new_claim(Decimal::new(40_00, 2), "food"))
        .await
        .expect("create");
    lifecycle.delete(&employee(), &draft.id).await.expect("delete");

    let error = lifecycle.get(&employee(), &draft.id).await.expect_err("gone");
    assert!(matches!(error, claimdesk_core::LifecycleError::NotFound(_)));
}
