use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Contract for one seeded ticket: where it sits in the lifecycle and how
/// many history rows back that position.
struct SeedTicketContract {
    ticket_id: &'static str,
    ticket_number: &'static str,
    status: &'static str,
    expected_history_rows: i64,
    has_work_order_link: bool,
    description: &'static str,
}

const SEED_TICKETS: &[SeedTicketContract] = &[
    SeedTicketContract {
        ticket_id: "ticket-open-001",
        ticket_number: "AB26-00001",
        status: "open",
        expected_history_rows: 0,
        has_work_order_link: false,
        description: "Freshly reported finding awaiting L2 acceptance",
    },
    SeedTicketContract {
        ticket_id: "ticket-inprogress-001",
        ticket_number: "AB26-00002",
        status: "in_progress",
        expected_history_rows: 3,
        has_work_order_link: true,
        description: "Accepted, planned, and started work on machine M12",
    },
    SeedTicketContract {
        ticket_id: "ticket-finished-001",
        ticket_number: "AB26-00003",
        status: "finished",
        expected_history_rows: 4,
        has_work_order_link: true,
        description: "Finished work awaiting L4 review",
    },
];

const SEED_GRANT_IDS: &[&str] = &["g-seed-001", "g-seed-002", "g-seed-003", "g-seed-004"];

const SEED_CONTACT_IDS: &[&str] =
    &["u-creator-park", "u-l2-kim", "u-l3-lee", "u-l4-choi", "u-tech-jang"];

/// Deterministic development dataset: a contact directory, a small DJ-plant
/// approval hierarchy, and one ticket in each interesting lifecycle region.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let tickets_seeded = SEED_TICKETS
            .iter()
            .map(|contract| TicketSeedInfo {
                ticket_id: contract.ticket_id,
                status: contract.status,
                description: contract.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { tickets_seeded })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_contacts = sql_array_from_ids(SEED_CONTACT_IDS);
        let contact_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM contact WHERE person_id IN {quoted_contacts}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(Check {
            label: "contacts".to_string(),
            passed: contact_count == SEED_CONTACT_IDS.len() as i64,
        });

        let quoted_grants = sql_array_from_ids(SEED_GRANT_IDS);
        let grant_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM approval_grant WHERE id IN {quoted_grants}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(Check {
            label: "approval-grants".to_string(),
            passed: grant_count == SEED_GRANT_IDS.len() as i64,
        });

        for contract in SEED_TICKETS {
            let ticket_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM ticket
                 WHERE id = ?1 AND ticket_number = ?2 AND status = ?3)",
            )
            .bind(contract.ticket_id)
            .bind(contract.ticket_number)
            .bind(contract.status)
            .fetch_one(pool)
            .await?;
            checks.push(Check { label: contract.ticket_id.to_string(), passed: ticket_ok == 1 });

            let history_rows: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM ticket_status_history WHERE ticket_id = ?1",
            )
            .bind(contract.ticket_id)
            .fetch_one(pool)
            .await?;
            checks.push(Check {
                label: format!("{}-history", contract.ticket_id),
                passed: history_rows == contract.expected_history_rows,
            });

            let link_rows: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM work_order_link WHERE ticket_id = ?1")
                    .bind(contract.ticket_id)
                    .fetch_one(pool)
                    .await?;
            checks.push(Check {
                label: format!("{}-work-order", contract.ticket_id),
                passed: link_rows == i64::from(contract.has_work_order_link),
            });
        }

        Ok(VerificationResult { checks })
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

#[derive(Clone, Debug)]
pub struct TicketSeedInfo {
    pub ticket_id: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Debug)]
pub struct SeedResult {
    pub tickets_seeded: Vec<TicketSeedInfo>,
}

#[derive(Clone, Debug)]
pub struct Check {
    pub label: String,
    pub passed: bool,
}

#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub checks: Vec<Check>,
}

impl VerificationResult {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn failures(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| check.label.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_load_and_verify_pass_against_the_contract() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let result = SeedDataset::load(&pool).await.expect("load seed");
        assert_eq!(result.tickets_seeded.len(), 3);

        let verification = SeedDataset::verify(&pool).await.expect("verify seed");
        assert!(verification.all_passed(), "failed checks: {:?}", verification.failures());
    }

    #[tokio::test]
    async fn verify_fails_on_an_unseeded_database() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let verification = SeedDataset::verify(&pool).await.expect("verify empty");
        assert!(!verification.all_passed());
    }
}
