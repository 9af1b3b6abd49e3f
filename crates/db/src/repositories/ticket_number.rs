use chrono::{DateTime, Datelike, Utc};

use super::{format_ticket_number, RepositoryError, TicketNumberRepository};
use crate::DbPool;

/// Allocates ticket numbers from a per-year counter row. The upsert with
/// `RETURNING` makes concurrent allocations hand out distinct values; when
/// the counter row cannot be written the allocator falls back to a
/// timestamp-derived number rather than blocking ticket creation.
pub struct SqlTicketNumberRepository {
    pool: DbPool,
}

impl SqlTicketNumberRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn fallback_number(now: DateTime<Utc>) -> String {
    format!("AB{:02}-T{}", now.year() % 100, now.timestamp_millis() % 100_000)
}

#[async_trait::async_trait]
impl TicketNumberRepository for SqlTicketNumberRepository {
    async fn next_number(&self, now: DateTime<Utc>) -> Result<String, RepositoryError> {
        let year = i64::from(now.year());

        let allocated: Result<i64, sqlx::Error> = sqlx::query_scalar(
            "INSERT INTO ticket_number_seq (year, next_value) VALUES (?, 2)
             ON CONFLICT(year) DO UPDATE SET next_value = next_value + 1
             RETURNING next_value - 1",
        )
        .bind(year)
        .fetch_one(&self.pool)
        .await;

        match allocated {
            Ok(sequence) => Ok(format_ticket_number(now, sequence)),
            Err(error) => {
                tracing_fallback(&error);
                Ok(fallback_number(now))
            }
        }
    }
}

fn tracing_fallback(error: &sqlx::Error) {
    // The counter is best-effort; creation proceeds with a unique-enough
    // timestamp number and the failure is left in the log for follow-up.
    tracing::warn!(
        event_name = "ticket_number_fallback",
        error = %error,
        "ticket number counter unavailable, using timestamp fallback",
    );
}
