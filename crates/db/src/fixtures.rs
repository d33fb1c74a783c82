use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Contract for one seeded claim: its resting status and the exact
/// number of history entries behind it.
struct SeedClaimContract {
    claim_id: &'static str,
    owner_id: &'static str,
    status: &'static str,
    history_len: i64,
    description: &'static str,
}

const SEED_CLAIMS: &[SeedClaimContract] = &[
    SeedClaimContract {
        claim_id: "claim-demo-travel-001",
        owner_id: "u-alice",
        status: "under_review",
        history_len: 2,
        description: "High-value travel claim waiting on manager review",
    },
    SeedClaimContract {
        claim_id: "claim-demo-food-001",
        owner_id: "u-alice",
        status: "approved",
        history_len: 2,
        description: "Low-value food claim auto-approved on submission",
    },
    SeedClaimContract {
        claim_id: "claim-demo-accom-001",
        owner_id: "u-carol",
        status: "reimbursed",
        history_len: 4,
        description: "Accommodation claim reimbursed end to end",
    },
    SeedClaimContract {
        claim_id: "claim-demo-draft-001",
        owner_id: "u-carol",
        status: "draft",
        history_len: 0,
        description: "Editable draft",
    },
    SeedClaimContract {
        claim_id: "claim-demo-rejected-001",
        owner_id: "u-alice",
        status: "rejected",
        history_len: 3,
        description: "Rejected duplicate travel claim",
    },
];

const SEED_USER_IDS: &[&str] = &["u-bob", "u-eve", "u-alice", "u-carol", "u-dana", "u-root"];

const SEED_CATEGORY_NAMES: &[&str] =
    &["travel", "food", "accommodation", "office_supplies", "others"];

pub struct SeedResult {
    pub claims_seeded: Vec<ClaimSeedInfo>,
}

pub struct ClaimSeedInfo {
    pub claim_id: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Demo dataset with a small org chart, the built-in category policies,
/// and one claim per lifecycle stage.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let claims_seeded = SEED_CLAIMS
            .iter()
            .map(|claim| ClaimSeedInfo {
                claim_id: claim.claim_id,
                status: claim.status,
                description: claim.description,
            })
            .collect();
        Ok(SeedResult { claims_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM app_user")
            .fetch_one(pool)
            .await?;
        checks.push(("users", user_count >= SEED_USER_IDS.len() as i64));

        let category_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM expense_category WHERE is_active = 1")
                .fetch_one(pool)
                .await?;
        checks.push(("categories", category_count >= SEED_CATEGORY_NAMES.len() as i64));

        for claim in SEED_CLAIMS {
            let status_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM claim WHERE id = ?1 AND owner_id = ?2 AND status = ?3)",
            )
            .bind(claim.claim_id)
            .bind(claim.owner_id)
            .bind(claim.status)
            .fetch_one(pool)
            .await?;
            checks.push((claim.claim_id, status_ok == 1));

            let history_len: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM claim_status_history WHERE claim_id = ?1")
                    .bind(claim.claim_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((claim.description, history_len == claim.history_len));

            if claim.history_len > 0 {
                // The resting status must match the last history entry.
                let last_status: Option<String> = sqlx::query_scalar(
                    "SELECT status FROM claim_status_history
                     WHERE claim_id = ?1
                     ORDER BY changed_at DESC, rowid DESC LIMIT 1",
                )
                .bind(claim.claim_id)
                .fetch_optional(pool)
                .await?;
                checks.push((claim.status, last_status.as_deref() == Some(claim.status)));
            }
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}
