use quotedesk_core::config::LoadOptions;
use quotedesk_db::{DemoSeedDataset, SeedResult};

use crate::commands::{block_on, load_config, open_database, CommandResult, Failure};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on("seed", async {
        let pool = open_database(&config).await?;
        let run_result = load_and_verify(&pool).await;
        pool.close().await;
        run_result
    });

    match result {
        Ok(Ok(seed_result)) => CommandResult::success("seed", render_summary(&seed_result)),
        Ok(Err(failure)) => CommandResult::from_failure("seed", failure),
        Err(result) => result,
    }
}

async fn load_and_verify(pool: &quotedesk_db::DbPool) -> Result<SeedResult, Failure> {
    let seed_result = DemoSeedDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

    let verification = DemoSeedDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
    if !verification.all_present {
        let failed_checks = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();
        return Err(("seed_verification", verification_message(&failed_checks), 6u8));
    }

    Ok(seed_result)
}

fn render_summary(seed_result: &SeedResult) -> String {
    let mut lines = vec!["demo dataset ready:".to_string()];
    lines.extend(
        seed_result
            .quotations_seeded
            .iter()
            .map(|info| format!("  - seeded {}: {}", info.quotation_id, info.description)),
    );
    lines.extend(
        seed_result.already_present.iter().map(|id| format!("  - {id} already present")),
    );
    lines.join("\n")
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
    use quotedesk_db::{SeedQuotationInfo, SeedResult};

    use super::{render_summary, verification_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let message = verification_message(&["priced-quotation-total", "legacy-item-inactive"]);
        assert_eq!(
            message,
            "Seed verification failed for checks: priced-quotation-total, legacy-item-inactive"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }

    #[test]
    fn summary_lists_seeded_and_existing_quotations() {
        let summary = render_summary(&SeedResult {
            quotations_seeded: vec![SeedQuotationInfo {
                quotation_id: "qt-demo-002",
                description: "Empty draft, all totals zero",
            }],
            already_present: vec!["qt-demo-001"],
        });

        assert_eq!(
            summary,
            "demo dataset ready:\n  - seeded qt-demo-002: Empty draft, all totals zero\n  \
             - qt-demo-001 already present"
        );
    }
}
