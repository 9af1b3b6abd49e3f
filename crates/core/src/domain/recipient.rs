use serde::{Deserialize, Serialize};

use crate::domain::grant::PersonId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    Approver,
    Creator,
    Assignee,
    Actor,
}

/// Transient, per-resolution notification target. Never persisted; the
/// resolver recomputes the list for every workflow action. Within one
/// resolution no `person_id` appears twice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecipient {
    pub person_id: PersonId,
    pub name: String,
    pub email: Option<String>,
    pub chat_id: Option<String>,
    pub avatar_url: Option<String>,
    pub reason: String,
    pub recipient_type: RecipientType,
}
