use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::grant::PersonId;

/// Every caller-invokable workflow action. `Create` participates only in
/// notification routing; it is not an edge in the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Accept,
    Reject,
    Plan,
    Start,
    Finish,
    Escalate,
    ApproveReview,
    ApproveClose,
    Reassign,
    Reopen,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Plan => "plan",
            Self::Start => "start",
            Self::Finish => "finish",
            Self::Escalate => "escalate",
            Self::ApproveReview => "approve_review",
            Self::ApproveClose => "approve_close",
            Self::Reassign => "reassign",
            Self::Reopen => "reopen",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Self::Create),
            "accept" => Some(Self::Accept),
            "reject" => Some(Self::Reject),
            "plan" => Some(Self::Plan),
            "start" => Some(Self::Start),
            "finish" => Some(Self::Finish),
            "escalate" => Some(Self::Escalate),
            "approve_review" => Some(Self::ApproveReview),
            "approve_close" => Some(Self::ApproveClose),
            "reassign" => Some(Self::Reassign),
            "reopen" => Some(Self::Reopen),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action-specific inputs supplied by the caller alongside the action.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    /// On `reject`: route the ticket to L3 review instead of closing it
    /// out as a final rejection.
    pub escalate_to_l3: bool,
    /// On `reassign`: the new assignee. On `escalate`: the person the
    /// ticket is escalated to, if known.
    pub assignee: Option<PersonId>,
    pub schedule_start: Option<DateTime<Utc>>,
    pub schedule_finish: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}
