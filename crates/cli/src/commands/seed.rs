use crate::commands::{run_database_task, CommandResult};
use claimdesk_db::{migrations, ClaimSeedInfo, DemoSeedDataset};

pub fn run() -> CommandResult {
    let seeded = run_database_task("seed", |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if verification.all_present {
            Ok(seed_result.claims_seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        }
    });

    match seeded {
        Ok(claims) => CommandResult::success("seed", summary(&claims)),
        Err(failure) => failure,
    }
}

fn summary(claims: &[ClaimSeedInfo]) -> String {
    let lines: Vec<String> = claims
        .iter()
        .map(|claim| format!("  - {}: {} ({})", claim.claim_id, claim.status, claim.description))
        .collect();
    format!("demo dataset loaded, one claim per lifecycle stage:\n{}", lines.join("\n"))
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let message = verification_message(&[
            "claim-demo-travel-001",
            "claim-demo-rejected-001",
        ]);
        assert_eq!(
            message,
            "Seed verification failed for checks: claim-demo-travel-001, claim-demo-rejected-001"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
