pub mod config;
pub mod domain;
pub mod errors;
pub mod matcher;
pub mod workflow;

pub use domain::contact::ContactCard;
pub use domain::grant::{level_rank, ApprovalGrant, ApprovalLevel, GrantId, PersonId};
pub use domain::recipient::{NotificationRecipient, RecipientType};
pub use domain::scope::UnitScope;
pub use domain::ticket::{
    HistoryEntryId, StatusHistoryEntry, SyncStatus, Ticket, TicketId, TicketStatus, WorkOrderLink,
};
pub use errors::DomainError;
pub use matcher::{approvers_for_unit, effective_level, ScopedApprover};
pub use workflow::{
    plan_transition, ActionPayload, ActionType, GuardContext, TransitionError, TransitionPlan,
    TransitionStamp,
};
