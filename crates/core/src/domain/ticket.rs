use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::grant::PersonId;
use crate::domain::scope::UnitScope;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

/// Lifecycle status of an abnormal-finding ticket. Wire strings keep the
/// legacy spellings (`planed`, `rejected_pending_l3_review`) because the
/// external work-order bridge and stored history rows depend on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Accepted,
    Planed,
    InProgress,
    RejectedPendingL3Review,
    RejectedFinal,
    Finished,
    Reviewed,
    Escalated,
    Closed,
    ReopenedInProgress,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Planed => "planed",
            Self::InProgress => "in_progress",
            Self::RejectedPendingL3Review => "rejected_pending_l3_review",
            Self::RejectedFinal => "rejected_final",
            Self::Finished => "finished",
            Self::Reviewed => "reviewed",
            Self::Escalated => "escalated",
            Self::Closed => "closed",
            Self::ReopenedInProgress => "reopened_in_progress",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(Self::Open),
            "accepted" => Some(Self::Accepted),
            "planed" => Some(Self::Planed),
            "in_progress" => Some(Self::InProgress),
            "rejected_pending_l3_review" => Some(Self::RejectedPendingL3Review),
            "rejected_final" => Some(Self::RejectedFinal),
            "finished" => Some(Self::Finished),
            "reviewed" => Some(Self::Reviewed),
            "escalated" => Some(Self::Escalated),
            "closed" => Some(Self::Closed),
            "reopened_in_progress" => Some(Self::ReopenedInProgress),
            _ => None,
        }
    }

    /// Terminal unless explicitly reopened by the creator or an L3.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::RejectedFinal)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abnormal-finding maintenance ticket. `status` only changes through a
/// state-machine validated transition; `version` is the optimistic lock
/// counter bumped on every committed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub ticket_number: String,
    pub status: TicketStatus,
    pub unit_scope: UnitScope,
    pub created_by: PersonId,
    pub assigned_to: Option<PersonId>,
    pub escalated_to: Option<PersonId>,
    pub description: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub planned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub schedule_start: Option<DateTime<Utc>>,
    pub schedule_finish: Option<DateTime<Utc>>,
    pub work_order_ref: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        id: TicketId,
        ticket_number: String,
        unit_scope: UnitScope,
        created_by: PersonId,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            ticket_number,
            status: TicketStatus::Open,
            unit_scope,
            created_by,
            assigned_to: None,
            escalated_to: None,
            description,
            accepted_at: None,
            planned_at: None,
            started_at: None,
            finished_at: None,
            reviewed_at: None,
            closed_at: None,
            rejected_at: None,
            reopened_at: None,
            schedule_start: None,
            schedule_finish: None,
            work_order_ref: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

/// Append-only record of one committed transition. Never mutated or
/// deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: HistoryEntryId,
    pub ticket_id: TicketId,
    pub old_status: TicketStatus,
    pub new_status: TicketStatus,
    pub changed_by: PersonId,
    pub changed_to: Option<PersonId>,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Success,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Mirror of the external CMMS work order tied to a ticket, updated on
/// every sync attempt independently of ticket status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderLink {
    pub ticket_id: TicketId,
    pub external_id: String,
    pub external_code: u8,
    pub sync_status: SyncStatus,
    pub last_sync_at: DateTime<Utc>,
    pub last_error: Option<String>,
}
