use chrono::{DateTime, Utc};
use sqlx::Row;

use gemba_core::domain::grant::PersonId;
use gemba_core::domain::scope::UnitScope;
use gemba_core::domain::ticket::{
    HistoryEntryId, StatusHistoryEntry, Ticket, TicketId, TicketStatus,
};

use super::{RepositoryError, TicketRepository};
use crate::DbPool;

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: &str) -> Result<TicketStatus, RepositoryError> {
    TicketStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown ticket status `{raw}`")))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn opt_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn get<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    for<'r> T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

const TICKET_COLUMNS: &str = "id, ticket_number, status, plant, area, line, machine,
        created_by, assigned_to, escalated_to, description,
        accepted_at, planned_at, started_at, finished_at, reviewed_at,
        closed_at, rejected_at, reopened_at, schedule_start, schedule_finish,
        work_order_ref, version, created_at, updated_at";

fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, RepositoryError> {
    let status_str: String = get(row, "status")?;

    Ok(Ticket {
        id: TicketId(get(row, "id")?),
        ticket_number: get(row, "ticket_number")?,
        status: parse_status(&status_str)?,
        unit_scope: UnitScope::new(
            get::<String>(row, "plant")?,
            get(row, "area")?,
            get(row, "line")?,
            get(row, "machine")?,
        ),
        created_by: PersonId(get(row, "created_by")?),
        assigned_to: get::<Option<String>>(row, "assigned_to")?.map(PersonId),
        escalated_to: get::<Option<String>>(row, "escalated_to")?.map(PersonId),
        description: get(row, "description")?,
        accepted_at: opt_timestamp(get(row, "accepted_at")?),
        planned_at: opt_timestamp(get(row, "planned_at")?),
        started_at: opt_timestamp(get(row, "started_at")?),
        finished_at: opt_timestamp(get(row, "finished_at")?),
        reviewed_at: opt_timestamp(get(row, "reviewed_at")?),
        closed_at: opt_timestamp(get(row, "closed_at")?),
        rejected_at: opt_timestamp(get(row, "rejected_at")?),
        reopened_at: opt_timestamp(get(row, "reopened_at")?),
        schedule_start: opt_timestamp(get(row, "schedule_start")?),
        schedule_finish: opt_timestamp(get(row, "schedule_finish")?),
        work_order_ref: get(row, "work_order_ref")?,
        version: get(row, "version")?,
        created_at: parse_timestamp(&get::<String>(row, "created_at")?),
        updated_at: parse_timestamp(&get::<String>(row, "updated_at")?),
    })
}

fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<StatusHistoryEntry, RepositoryError> {
    let old_status: String = get(row, "old_status")?;
    let new_status: String = get(row, "new_status")?;

    Ok(StatusHistoryEntry {
        id: HistoryEntryId(get(row, "id")?),
        ticket_id: TicketId(get(row, "ticket_id")?),
        old_status: parse_status(&old_status)?,
        new_status: parse_status(&new_status)?,
        changed_by: PersonId(get(row, "changed_by")?),
        changed_to: get::<Option<String>>(row, "changed_to")?.map(PersonId),
        notes: get(row, "notes")?,
        changed_at: parse_timestamp(&get::<String>(row, "changed_at")?),
    })
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_ticket(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_number(
        &self,
        ticket_number: &str,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE ticket_number = ?"))
                .bind(ticket_number)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_ticket(r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ticket (id, ticket_number, status, plant, area, line, machine,
                                 created_by, assigned_to, escalated_to, description,
                                 accepted_at, planned_at, started_at, finished_at, reviewed_at,
                                 closed_at, rejected_at, reopened_at,
                                 schedule_start, schedule_finish,
                                 work_order_ref, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ticket.id.0)
        .bind(&ticket.ticket_number)
        .bind(ticket.status.as_str())
        .bind(&ticket.unit_scope.plant)
        .bind(&ticket.unit_scope.area)
        .bind(&ticket.unit_scope.line)
        .bind(&ticket.unit_scope.machine)
        .bind(&ticket.created_by.0)
        .bind(ticket.assigned_to.as_ref().map(|p| p.0.as_str()))
        .bind(ticket.escalated_to.as_ref().map(|p| p.0.as_str()))
        .bind(&ticket.description)
        .bind(ticket.accepted_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.planned_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.started_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.finished_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.reviewed_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.closed_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.reopened_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.schedule_start.map(|dt| dt.to_rfc3339()))
        .bind(ticket.schedule_finish.map(|dt| dt.to_rfc3339()))
        .bind(&ticket.work_order_ref)
        .bind(ticket.version)
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_transition(
        &self,
        ticket: &Ticket,
        entry: &StatusHistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE ticket SET
                 status = ?, assigned_to = ?, escalated_to = ?,
                 accepted_at = ?, planned_at = ?, started_at = ?, finished_at = ?,
                 reviewed_at = ?, closed_at = ?, rejected_at = ?, reopened_at = ?,
                 schedule_start = ?, schedule_finish = ?, work_order_ref = ?,
                 version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(ticket.status.as_str())
        .bind(ticket.assigned_to.as_ref().map(|p| p.0.as_str()))
        .bind(ticket.escalated_to.as_ref().map(|p| p.0.as_str()))
        .bind(ticket.accepted_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.planned_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.started_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.finished_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.reviewed_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.closed_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.reopened_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.schedule_start.map(|dt| dt.to_rfc3339()))
        .bind(ticket.schedule_finish.map(|dt| dt.to_rfc3339()))
        .bind(&ticket.work_order_ref)
        .bind(ticket.updated_at.to_rfc3339())
        .bind(&ticket.id.0)
        .bind(ticket.version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "ticket {} changed since version {}",
                ticket.id.0, ticket.version
            )));
        }

        sqlx::query(
            "INSERT INTO ticket_status_history
                 (id, ticket_id, old_status, new_status, changed_by, changed_to, notes, changed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.ticket_id.0)
        .bind(entry.old_status.as_str())
        .bind(entry.new_status.as_str())
        .bind(&entry.changed_by.0)
        .bind(entry.changed_to.as_ref().map(|p| p.0.as_str()))
        .bind(&entry.notes)
        .bind(entry.changed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket WHERE status = ? ORDER BY created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_ticket).collect()
    }

    async fn list_history(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, ticket_id, old_status, new_status, changed_by, changed_to, notes, changed_at
             FROM ticket_status_history WHERE ticket_id = ? ORDER BY changed_at ASC, id ASC",
        )
        .bind(&ticket_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use gemba_core::domain::grant::PersonId;
    use gemba_core::domain::scope::UnitScope;
    use gemba_core::domain::ticket::{
        HistoryEntryId, StatusHistoryEntry, Ticket, TicketId, TicketStatus,
    };

    use super::SqlTicketRepository;
    use crate::repositories::{RepositoryError, TicketRepository};
    use crate::{connect_with_settings, migrations};

    async fn test_pool() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_ticket(id: &str, number: &str) -> Ticket {
        Ticket::new(
            TicketId(id.to_string()),
            number.to_string(),
            UnitScope::new("DJ", Some("DMH".to_string()), Some("L03".to_string()), None),
            PersonId("u-creator".to_string()),
            Some("Hydraulic leak at press station".to_string()),
            Utc::now(),
        )
    }

    fn transition_entry(ticket: &Ticket, new_status: TicketStatus) -> StatusHistoryEntry {
        StatusHistoryEntry {
            id: HistoryEntryId(format!("h-{}-{}", ticket.id.0, new_status)),
            ticket_id: ticket.id.clone(),
            old_status: ticket.status,
            new_status,
            changed_by: PersonId("u-approver".to_string()),
            changed_to: None,
            notes: None,
            changed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let pool = test_pool().await;
        let repo = SqlTicketRepository::new(pool);
        let ticket = sample_ticket("t-1", "AB26-00001");

        repo.insert(ticket.clone()).await.expect("insert");

        let by_id = repo.find_by_id(&ticket.id).await.expect("find by id").expect("found");
        assert_eq!(by_id.ticket_number, "AB26-00001");
        assert_eq!(by_id.status, TicketStatus::Open);
        assert_eq!(by_id.unit_scope, ticket.unit_scope);
        assert_eq!(by_id.version, 0);

        let by_number =
            repo.find_by_number("AB26-00001").await.expect("find by number").expect("found");
        assert_eq!(by_number.id, ticket.id);
    }

    #[tokio::test]
    async fn save_transition_bumps_version_and_appends_history() {
        let pool = test_pool().await;
        let repo = SqlTicketRepository::new(pool);
        let mut ticket = sample_ticket("t-1", "AB26-00001");
        repo.insert(ticket.clone()).await.expect("insert");

        let entry = transition_entry(&ticket, TicketStatus::Accepted);
        ticket.status = TicketStatus::Accepted;
        ticket.accepted_at = Some(Utc::now());
        repo.save_transition(&ticket, &entry).await.expect("save transition");

        let stored = repo.find_by_id(&ticket.id).await.expect("find").expect("found");
        assert_eq!(stored.status, TicketStatus::Accepted);
        assert_eq!(stored.version, 1);
        assert!(stored.accepted_at.is_some());

        let history = repo.list_history(&ticket.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_status, TicketStatus::Open);
        assert_eq!(history[0].new_status, TicketStatus::Accepted);
    }

    #[tokio::test]
    async fn stale_version_yields_conflict_and_writes_nothing() {
        let pool = test_pool().await;
        let repo = SqlTicketRepository::new(pool);
        let ticket = sample_ticket("t-1", "AB26-00001");
        repo.insert(ticket.clone()).await.expect("insert");

        // First writer wins.
        let mut first = ticket.clone();
        let first_entry = transition_entry(&first, TicketStatus::Accepted);
        first.status = TicketStatus::Accepted;
        repo.save_transition(&first, &first_entry).await.expect("first transition");

        // Second writer still holds version 0.
        let mut second = ticket.clone();
        let second_entry = transition_entry(&second, TicketStatus::RejectedFinal);
        second.status = TicketStatus::RejectedFinal;
        let result = repo.save_transition(&second, &second_entry).await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));

        let stored = repo.find_by_id(&ticket.id).await.expect("find").expect("found");
        assert_eq!(stored.status, TicketStatus::Accepted);
        assert_eq!(stored.version, 1);

        let history = repo.list_history(&ticket.id).await.expect("history");
        assert_eq!(history.len(), 1, "losing writer must not append history");
    }

    #[tokio::test]
    async fn list_by_status_orders_by_creation() {
        let pool = test_pool().await;
        let repo = SqlTicketRepository::new(pool);

        let mut early = sample_ticket("t-1", "AB26-00001");
        early.created_at = Utc::now() - chrono::Duration::hours(2);
        let late = sample_ticket("t-2", "AB26-00002");

        repo.insert(late.clone()).await.expect("insert late");
        repo.insert(early.clone()).await.expect("insert early");

        let open = repo.list_by_status(TicketStatus::Open).await.expect("list");
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].id, early.id);
        assert_eq!(open[1].id, late.id);
    }
}
