use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use gemba_core::domain::contact::ContactCard;
use gemba_core::domain::grant::{ApprovalGrant, ApprovalLevel, GrantId, PersonId};
use gemba_core::domain::ticket::{
    StatusHistoryEntry, Ticket, TicketId, TicketStatus, WorkOrderLink,
};

pub mod contact;
pub mod grant;
pub mod memory;
pub mod ticket;
pub mod ticket_number;
pub mod work_order;

pub use contact::SqlContactRepository;
pub use grant::SqlGrantRepository;
pub use memory::{
    InMemoryContactRepository, InMemoryGrantRepository, InMemoryTicketNumberRepository,
    InMemoryTicketRepository, InMemoryWorkOrderLinkRepository,
};
pub use ticket::SqlTicketRepository;
pub use ticket_number::SqlTicketNumberRepository;
pub use work_order::SqlWorkOrderLinkRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError>;

    async fn find_by_number(&self, ticket_number: &str)
        -> Result<Option<Ticket>, RepositoryError>;

    async fn insert(&self, ticket: Ticket) -> Result<(), RepositoryError>;

    /// Persists a validated transition: the full ticket row is written
    /// together with its history entry in one transaction, guarded by the
    /// version the caller read. A stale version yields
    /// [`RepositoryError::Conflict`] and writes nothing.
    ///
    /// `ticket.version` must be the value observed before the transition;
    /// the stored row gets `version + 1`.
    async fn save_transition(
        &self,
        ticket: &Ticket,
        entry: &StatusHistoryEntry,
    ) -> Result<(), RepositoryError>;

    async fn list_by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>, RepositoryError>;

    async fn list_history(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError>;
}

#[async_trait]
pub trait GrantRepository: Send + Sync {
    async fn grants_for_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Vec<ApprovalGrant>, RepositoryError>;

    async fn grants_at_level(
        &self,
        level: ApprovalLevel,
    ) -> Result<Vec<ApprovalGrant>, RepositoryError>;

    async fn save(&self, grant: ApprovalGrant) -> Result<(), RepositoryError>;

    /// Removes an administrator-revoked grant. Deleting an unknown id is
    /// not an error.
    async fn delete(&self, id: &GrantId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn find_by_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Option<ContactCard>, RepositoryError>;

    async fn save(&self, contact: ContactCard) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait WorkOrderLinkRepository: Send + Sync {
    async fn find_by_ticket(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<WorkOrderLink>, RepositoryError>;

    async fn save(&self, link: WorkOrderLink) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TicketNumberRepository: Send + Sync {
    /// Allocates the next ticket number for the year of `now`, formatted
    /// `AB{YY}-{NNNNN}`. Allocation is atomic per year; numbers are never
    /// reissued even when ticket creation later fails.
    async fn next_number(&self, now: DateTime<Utc>) -> Result<String, RepositoryError>;
}

pub(crate) fn format_ticket_number(now: DateTime<Utc>, sequence: i64) -> String {
    use chrono::Datelike;
    format!("AB{:02}-{:05}", now.year() % 100, sequence)
}
