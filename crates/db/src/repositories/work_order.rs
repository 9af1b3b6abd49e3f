use chrono::{DateTime, Utc};
use sqlx::Row;

use gemba_core::domain::ticket::{SyncStatus, TicketId, WorkOrderLink};

use super::{RepositoryError, WorkOrderLinkRepository};
use crate::DbPool;

pub struct SqlWorkOrderLinkRepository {
    pool: DbPool,
}

impl SqlWorkOrderLinkRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_link(row: &sqlx::sqlite::SqliteRow) -> Result<WorkOrderLink, RepositoryError> {
    let ticket_id: String =
        row.try_get("ticket_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let external_id: String =
        row.try_get("external_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let external_code: i64 =
        row.try_get("external_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sync_status_raw: String =
        row.try_get("sync_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_sync_at_raw: String =
        row.try_get("last_sync_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_error: Option<String> =
        row.try_get("last_error").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let sync_status = SyncStatus::parse(&sync_status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown sync status `{sync_status_raw}`"))
    })?;
    let external_code = u8::try_from(external_code).map_err(|_| {
        RepositoryError::Decode(format!("external code `{external_code}` out of range"))
    })?;
    let last_sync_at = DateTime::parse_from_rfc3339(&last_sync_at_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(WorkOrderLink {
        ticket_id: TicketId(ticket_id),
        external_id,
        external_code,
        sync_status,
        last_sync_at,
        last_error,
    })
}

#[async_trait::async_trait]
impl WorkOrderLinkRepository for SqlWorkOrderLinkRepository {
    async fn find_by_ticket(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<WorkOrderLink>, RepositoryError> {
        let row = sqlx::query(
            "SELECT ticket_id, external_id, external_code, sync_status, last_sync_at, last_error
             FROM work_order_link WHERE ticket_id = ?",
        )
        .bind(&ticket_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_link(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, link: WorkOrderLink) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO work_order_link
                 (ticket_id, external_id, external_code, sync_status, last_sync_at, last_error)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(ticket_id) DO UPDATE SET
                 external_id = excluded.external_id,
                 external_code = excluded.external_code,
                 sync_status = excluded.sync_status,
                 last_sync_at = excluded.last_sync_at,
                 last_error = excluded.last_error",
        )
        .bind(&link.ticket_id.0)
        .bind(&link.external_id)
        .bind(i64::from(link.external_code))
        .bind(link.sync_status.as_str())
        .bind(link.last_sync_at.to_rfc3339())
        .bind(&link.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
