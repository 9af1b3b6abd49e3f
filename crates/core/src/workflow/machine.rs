use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::grant::{level_rank, ApprovalLevel, PersonId};
use crate::domain::ticket::TicketStatus;
use crate::workflow::actions::{ActionPayload, ActionType};

/// Everything the guard needs to decide whether an actor may take an
/// action on a ticket in its current state.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardContext<'a> {
    pub actor_id: &'a PersonId,
    /// The actor's effective level for the ticket's unit scope; `None`
    /// means no matching grant (level 0).
    pub actor_level: Option<ApprovalLevel>,
    pub created_by: &'a PersonId,
    pub assigned_to: Option<&'a PersonId>,
    pub payload: &'a ActionPayload,
}

impl GuardContext<'_> {
    fn is_creator(&self) -> bool {
        self.actor_id == self.created_by
    }

    fn is_assignee(&self) -> bool {
        self.assigned_to.is_some_and(|assignee| assignee == self.actor_id)
    }

    fn has_level(&self, required: ApprovalLevel) -> bool {
        level_rank(self.actor_level) >= required.rank()
    }
}

/// Which ticket timestamp a committed transition stamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStamp {
    Accepted,
    Planned,
    Started,
    Finished,
    Reviewed,
    Closed,
    Rejected,
    Reopened,
}

/// Outcome of a successful guard evaluation: the edge to take plus the
/// side fields the orchestrator must update when committing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: TicketStatus,
    pub to: TicketStatus,
    pub action: ActionType,
    /// `None` for edges with no dedicated ticket timestamp (`escalate`).
    pub stamp: Option<TransitionStamp>,
    /// The transition hands the ticket to a new assignee taken from the
    /// payload (`reassign` only).
    pub reassigns: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("action `{action}` is not valid from status `{from}`")]
    InvalidTransition { from: TicketStatus, action: ActionType },
    #[error("action `{action}` requires approval level {required} but actor has level {actual}")]
    InsufficientApprovalLevel { action: ActionType, required: u8, actual: u8 },
    #[error("action `{action}` may only be performed by the assigned person")]
    NotAssignee { action: ActionType },
    #[error("action `reassign` requires a new assignee in the payload")]
    MissingAssignee,
}

/// Pure transition guard. Evaluates the edge first (`InvalidTransition`
/// when the current status has no row for the action), then authority.
/// Produces a plan; it never mutates the ticket.
pub fn plan_transition(
    status: TicketStatus,
    action: ActionType,
    ctx: &GuardContext<'_>,
) -> Result<TransitionPlan, TransitionError> {
    use ActionType::{
        Accept, ApproveClose, ApproveReview, Escalate, Finish, Plan, Reassign, Reject, Reopen,
        Start,
    };
    use TicketStatus::{
        Accepted, Closed, Escalated, Finished, InProgress, Open, Planed, RejectedFinal,
        RejectedPendingL3Review, ReopenedInProgress, Reviewed,
    };

    let plan = |to: TicketStatus, stamp: Option<TransitionStamp>, reassigns: bool| TransitionPlan {
        from: status,
        to,
        action,
        stamp,
        reassigns,
    };

    match (status, action) {
        (Open, Accept) => {
            require_level(action, ApprovalLevel::L2, ctx)?;
            Ok(plan(Accepted, Some(TransitionStamp::Accepted), false))
        }
        (Open, Reject) => {
            require_level(action, ApprovalLevel::L2, ctx)?;
            let to = if ctx.payload.escalate_to_l3 { RejectedPendingL3Review } else { RejectedFinal };
            Ok(plan(to, Some(TransitionStamp::Rejected), false))
        }
        (Accepted, Plan) => {
            require_level(action, ApprovalLevel::L2, ctx)?;
            Ok(plan(Planed, Some(TransitionStamp::Planned), false))
        }
        (Planed, Start) => {
            require_level(action, ApprovalLevel::L2, ctx)?;
            require_assignee(action, ctx)?;
            Ok(plan(InProgress, Some(TransitionStamp::Started), false))
        }
        (InProgress | ReopenedInProgress, Finish) => {
            require_level(action, ApprovalLevel::L2, ctx)?;
            require_assignee(action, ctx)?;
            Ok(plan(Finished, Some(TransitionStamp::Finished), false))
        }
        (Accepted | Planed | InProgress, Escalate) => {
            require_level(action, ApprovalLevel::L2, ctx)?;
            Ok(plan(Escalated, None, false))
        }
        (Finished, ApproveReview) => {
            require_level(action, ApprovalLevel::L4, ctx)?;
            Ok(plan(Reviewed, Some(TransitionStamp::Reviewed), false))
        }
        (Reviewed, ApproveClose) => {
            // The original creator may close without any grant; anyone
            // else needs L4 for the ticket's scope.
            if !ctx.is_creator() {
                require_level(action, ApprovalLevel::L4, ctx)?;
            }
            Ok(plan(Closed, Some(TransitionStamp::Closed), false))
        }
        (RejectedPendingL3Review | Escalated, Reassign) => {
            require_level(action, ApprovalLevel::L3, ctx)?;
            if ctx.payload.assignee.is_none() {
                return Err(TransitionError::MissingAssignee);
            }
            Ok(plan(InProgress, Some(TransitionStamp::Started), true))
        }
        (Closed | RejectedFinal, Reopen) => {
            if !ctx.is_creator() {
                require_level(action, ApprovalLevel::L3, ctx)?;
            }
            Ok(plan(ReopenedInProgress, Some(TransitionStamp::Reopened), false))
        }
        _ => Err(TransitionError::InvalidTransition { from: status, action }),
    }
}

fn require_level(
    action: ActionType,
    required: ApprovalLevel,
    ctx: &GuardContext<'_>,
) -> Result<(), TransitionError> {
    if ctx.has_level(required) {
        return Ok(());
    }

    Err(TransitionError::InsufficientApprovalLevel {
        action,
        required: required.rank(),
        actual: level_rank(ctx.actor_level),
    })
}

fn require_assignee(action: ActionType, ctx: &GuardContext<'_>) -> Result<(), TransitionError> {
    if ctx.is_assignee() {
        return Ok(());
    }

    Err(TransitionError::NotAssignee { action })
}
