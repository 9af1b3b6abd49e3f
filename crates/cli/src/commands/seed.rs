use crate::commands::CommandResult;
use gemba_core::config::{AppConfig, LoadOptions};
use gemba_db::{connect_with_settings, migrations, SeedDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = SeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = SeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, (&'static str, String, u8)> =
            if !verification.all_passed() {
                let failed_checks = verification.failures();
                let message = if failed_checks.is_empty() {
                    "Some seed data failed to load".to_string()
                } else {
                    format!("Seed verification failed for checks: {}", failed_checks.join(", "))
                };
                Err(("seed_verification", message, 6u8))
            } else {
                Ok(SeedOutput { tickets: seed_result.tickets_seeded })
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let ticket_descriptions: Vec<String> = output
                .tickets
                .iter()
                .map(|t| format!("  - {}: {} ({})", t.ticket_id, t.status, t.description))
                .collect();
            let message = format!(
                "seed dataset loaded: contact directory, DJ-plant approval hierarchy, and 3 lifecycle tickets:\n{}",
                ticket_descriptions.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    tickets: Vec<gemba_db::TicketSeedInfo>,
}
