use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use gemba_core::domain::grant::{ApprovalLevel, PersonId};
use gemba_core::domain::recipient::{NotificationRecipient, RecipientType};
use gemba_core::domain::scope::UnitScope;
use gemba_core::domain::ticket::Ticket;
use gemba_core::workflow::ActionType;
use gemba_db::repositories::ContactRepository;

use crate::registry::ApprovalRegistry;

/// Which approval levels get notified for each action. Only actions that
/// hand the ticket to a new authority tier fan out to approvers; the rest
/// notify the involved people only.
fn approver_levels(action: ActionType) -> &'static [ApprovalLevel] {
    match action {
        ActionType::Create => &[ApprovalLevel::L2],
        ActionType::Reject => &[ApprovalLevel::L3],
        ActionType::Escalate => &[ApprovalLevel::L3, ApprovalLevel::L4],
        ActionType::Finish | ActionType::ApproveReview => &[ApprovalLevel::L4],
        ActionType::Reopen => &[ApprovalLevel::L2],
        ActionType::Accept
        | ActionType::Plan
        | ActionType::Start
        | ActionType::ApproveClose
        | ActionType::Reassign => &[],
    }
}

fn include_creator(action: ActionType) -> bool {
    action != ActionType::Create
}

fn include_assignee(action: ActionType) -> bool {
    matches!(
        action,
        ActionType::Plan | ActionType::Escalate | ActionType::Reassign | ActionType::ApproveClose
    )
}

/// Builds the ordered, deduplicated recipient list for one workflow
/// action: approver groups in level order, then the creator and assignee,
/// then the acting person. The first entry for a person wins; later
/// appearances are dropped. Resolution never fails as a whole: a broken
/// group is logged and skipped so the remaining recipients still go out.
pub struct RecipientResolver {
    registry: Arc<ApprovalRegistry>,
    contacts: Arc<dyn ContactRepository>,
}

impl RecipientResolver {
    pub fn new(registry: Arc<ApprovalRegistry>, contacts: Arc<dyn ContactRepository>) -> Self {
        Self { registry, contacts }
    }

    pub async fn resolve(
        &self,
        ticket: &Ticket,
        action: ActionType,
        actor: &PersonId,
    ) -> Vec<NotificationRecipient> {
        let mut recipients: Vec<NotificationRecipient> = Vec::new();
        let mut seen: HashSet<PersonId> = HashSet::new();

        for level in approver_levels(action) {
            let approvers = match self
                .registry
                .find_approvers(*level, &ticket.unit_scope, Some(actor))
                .await
            {
                Ok(approvers) => approvers,
                Err(error) => {
                    warn!(
                        event_name = "resolver.approver_group_failed",
                        ticket_number = %ticket.ticket_number,
                        level = level.rank(),
                        error = %error,
                        "approver lookup failed; continuing with remaining groups"
                    );
                    continue;
                }
            };

            for approver in approvers {
                if !seen.insert(approver.person_id.clone()) {
                    continue;
                }
                let recipient = self
                    .enrich(
                        &approver.person_id,
                        approver.scope_description.clone(),
                        RecipientType::Approver,
                    )
                    .await;
                recipients.push(recipient);
            }
        }

        if include_creator(action) && seen.insert(ticket.created_by.clone()) {
            let recipient = self
                .enrich(&ticket.created_by, "Ticket creator".to_string(), RecipientType::Creator)
                .await;
            recipients.push(recipient);
        }

        if include_assignee(action) {
            if let Some(assignee) = &ticket.assigned_to {
                if seen.insert(assignee.clone()) {
                    let recipient = self
                        .enrich(assignee, "Assigned person".to_string(), RecipientType::Assignee)
                        .await;
                    recipients.push(recipient);
                }
            }
        }

        self.append_actor(&mut recipients, &mut seen, action, actor).await;

        recipients
    }

    /// Preview variant used for administrative testing: same approver and
    /// role groups, but against explicit participants instead of a stored
    /// ticket, and without the trailing actor entry.
    pub async fn resolve_for_unit(
        &self,
        unit: &UnitScope,
        action: ActionType,
        created_by: &PersonId,
        assigned_to: Option<&PersonId>,
        actor: &PersonId,
    ) -> Vec<NotificationRecipient> {
        let mut recipients: Vec<NotificationRecipient> = Vec::new();
        let mut seen: HashSet<PersonId> = HashSet::new();

        for level in approver_levels(action) {
            let approvers =
                match self.registry.find_approvers(*level, unit, Some(actor)).await {
                    Ok(approvers) => approvers,
                    Err(error) => {
                        warn!(
                            event_name = "resolver.approver_group_failed",
                            level = level.rank(),
                            error = %error,
                            "approver lookup failed; continuing with remaining groups"
                        );
                        continue;
                    }
                };

            for approver in approvers {
                if !seen.insert(approver.person_id.clone()) {
                    continue;
                }
                let recipient = self
                    .enrich(
                        &approver.person_id,
                        approver.scope_description.clone(),
                        RecipientType::Approver,
                    )
                    .await;
                recipients.push(recipient);
            }
        }

        if include_creator(action) && seen.insert(created_by.clone()) {
            let recipient = self
                .enrich(created_by, "Ticket creator".to_string(), RecipientType::Creator)
                .await;
            recipients.push(recipient);
        }

        if include_assignee(action) {
            if let Some(assignee) = assigned_to {
                if seen.insert(assignee.clone()) {
                    let recipient = self
                        .enrich(assignee, "Assigned person".to_string(), RecipientType::Assignee)
                        .await;
                    recipients.push(recipient);
                }
            }
        }

        recipients
    }

    /// The acting person tails the list, but only when they have a contact
    /// card on file.
    async fn append_actor(
        &self,
        recipients: &mut Vec<NotificationRecipient>,
        seen: &mut HashSet<PersonId>,
        action: ActionType,
        actor: &PersonId,
    ) {
        if !seen.insert(actor.clone()) {
            return;
        }

        let card = match self.contacts.find_by_person(actor).await {
            Ok(Some(card)) => card,
            Ok(None) => {
                debug!(
                    event_name = "resolver.actor_unresolvable",
                    person_id = %actor.0,
                    "actor has no contact record; not notified"
                );
                return;
            }
            Err(error) => {
                warn!(
                    event_name = "resolver.contact_lookup_failed",
                    person_id = %actor.0,
                    error = %error,
                    "actor contact lookup failed; not notified"
                );
                return;
            }
        };

        recipients.push(NotificationRecipient {
            person_id: card.person_id,
            name: card.name,
            email: card.email,
            chat_id: card.chat_id,
            avatar_url: card.avatar_url,
            reason: format!("Actor Notification - Performed Action: {action}"),
            recipient_type: RecipientType::Actor,
        });
    }

    /// Attaches directory details to a person id. A missing or unreadable
    /// contact card degrades to an id-only recipient so the person still
    /// shows up in the list even if unreachable.
    async fn enrich(
        &self,
        person_id: &PersonId,
        reason: String,
        recipient_type: RecipientType,
    ) -> NotificationRecipient {
        let card = match self.contacts.find_by_person(person_id).await {
            Ok(card) => card,
            Err(error) => {
                warn!(
                    event_name = "resolver.contact_lookup_failed",
                    person_id = %person_id.0,
                    error = %error,
                    "contact lookup failed; using bare person id"
                );
                None
            }
        };

        match card {
            Some(card) => NotificationRecipient {
                person_id: card.person_id,
                name: card.name,
                email: card.email,
                chat_id: card.chat_id,
                avatar_url: card.avatar_url,
                reason,
                recipient_type,
            },
            None => {
                debug!(
                    event_name = "resolver.contact_missing",
                    person_id = %person_id.0,
                    "no contact card for recipient"
                );
                NotificationRecipient {
                    person_id: person_id.clone(),
                    name: person_id.0.clone(),
                    email: None,
                    chat_id: None,
                    avatar_url: None,
                    reason,
                    recipient_type,
                }
            }
        }
    }
}
