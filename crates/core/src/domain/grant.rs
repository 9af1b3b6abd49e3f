use serde::{Deserialize, Serialize};

use crate::domain::scope::UnitScope;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(pub String);

/// Authority tier for workflow actions. L1 creators, L2 accept/reject/
/// escalate/finish, L3 reassign and final-reject review, L4 final close
/// approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    L1,
    L2,
    L3,
    L4,
}

impl ApprovalLevel {
    pub fn rank(self) -> u8 {
        match self {
            Self::L1 => 1,
            Self::L2 => 2,
            Self::L3 => 3,
            Self::L4 => 4,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            3 => Some(Self::L3),
            4 => Some(Self::L4),
            _ => None,
        }
    }
}

/// Rank of an optional effective level; no matching grant means level 0.
pub fn level_rank(level: Option<ApprovalLevel>) -> u8 {
    level.map(ApprovalLevel::rank).unwrap_or(0)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId(pub String);

/// Administrator-managed authority grant. A person may hold any number of
/// grants with different scopes and levels; grants never expire implicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGrant {
    pub id: GrantId,
    pub person_id: PersonId,
    pub level: ApprovalLevel,
    pub scope: UnitScope,
}
