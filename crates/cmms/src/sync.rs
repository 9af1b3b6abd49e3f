use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use gemba_core::domain::ticket::{SyncStatus, Ticket, TicketStatus, WorkOrderLink};
use gemba_db::repositories::WorkOrderLinkRepository;

use crate::status::external_status_code;
use crate::system::WorkOrderSystem;

/// What one sync pass did. `Skipped` covers tickets before acceptance:
/// no work order exists externally until an L2 accepts the finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { external_id: String },
    Updated { external_id: String, status_code: u8 },
    Skipped,
    Failed { reason: String },
}

/// Bridges committed ticket transitions to the external work-order
/// system. Sync is best-effort and runs after the transition is already
/// durable: a bridge outage is recorded on the link row and logged, it
/// never rolls back or blocks the ticket.
pub struct SyncAdapter {
    system: Arc<dyn WorkOrderSystem>,
    links: Arc<dyn WorkOrderLinkRepository>,
}

impl SyncAdapter {
    pub fn new(system: Arc<dyn WorkOrderSystem>, links: Arc<dyn WorkOrderLinkRepository>) -> Self {
        Self { system, links }
    }

    pub async fn sync_after_transition(&self, ticket: &Ticket) -> SyncOutcome {
        let existing = match self.links.find_by_ticket(&ticket.id).await {
            Ok(existing) => existing,
            Err(error) => {
                warn!(
                    event_name = "cmms.link_lookup_failed",
                    ticket_number = %ticket.ticket_number,
                    error = %error,
                    "could not read work order link; skipping sync pass"
                );
                return SyncOutcome::Failed { reason: error.to_string() };
            }
        };

        let status_code = external_status_code(ticket.status);

        match existing {
            None if ticket.status == TicketStatus::Accepted => {
                self.create_order(ticket, status_code).await
            }
            None => SyncOutcome::Skipped,
            Some(link) => self.update_order(ticket, link, status_code).await,
        }
    }

    async fn create_order(&self, ticket: &Ticket, status_code: u8) -> SyncOutcome {
        match self.system.create_work_order(ticket, status_code).await {
            Ok(snapshot) => {
                let link = WorkOrderLink {
                    ticket_id: ticket.id.clone(),
                    external_id: snapshot.external_id.clone(),
                    external_code: snapshot.status_code,
                    sync_status: SyncStatus::Success,
                    last_sync_at: Utc::now(),
                    last_error: None,
                };
                self.store_link(ticket, link).await;
                info!(
                    event_name = "cmms.work_order_created",
                    ticket_number = %ticket.ticket_number,
                    external_id = %snapshot.external_id,
                    "created external work order"
                );
                SyncOutcome::Created { external_id: snapshot.external_id }
            }
            Err(error) => {
                warn!(
                    event_name = "cmms.work_order_create_failed",
                    ticket_number = %ticket.ticket_number,
                    error = %error,
                    "work order creation failed; will retry on next transition"
                );
                SyncOutcome::Failed { reason: error.to_string() }
            }
        }
    }

    async fn update_order(
        &self,
        ticket: &Ticket,
        mut link: WorkOrderLink,
        status_code: u8,
    ) -> SyncOutcome {
        match self.system.update_status(&link.external_id, status_code).await {
            Ok(snapshot) => {
                link.external_code = snapshot.status_code;
                link.sync_status = SyncStatus::Success;
                link.last_sync_at = Utc::now();
                link.last_error = None;
                let external_id = link.external_id.clone();
                self.store_link(ticket, link).await;
                info!(
                    event_name = "cmms.work_order_updated",
                    ticket_number = %ticket.ticket_number,
                    external_id = %external_id,
                    status_code,
                    "pushed status to external work order"
                );
                SyncOutcome::Updated { external_id, status_code }
            }
            Err(error) => {
                link.sync_status = SyncStatus::Error;
                link.last_sync_at = Utc::now();
                link.last_error = Some(error.to_string());
                self.store_link(ticket, link).await;
                warn!(
                    event_name = "cmms.work_order_update_failed",
                    ticket_number = %ticket.ticket_number,
                    error = %error,
                    "work order update failed; link marked errored"
                );
                SyncOutcome::Failed { reason: error.to_string() }
            }
        }
    }

    async fn store_link(&self, ticket: &Ticket, link: WorkOrderLink) {
        if let Err(error) = self.links.save(link).await {
            warn!(
                event_name = "cmms.link_save_failed",
                ticket_number = %ticket.ticket_number,
                error = %error,
                "could not persist work order link"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use gemba_core::domain::grant::PersonId;
    use gemba_core::domain::scope::UnitScope;
    use gemba_core::domain::ticket::{SyncStatus, Ticket, TicketId, TicketStatus};
    use gemba_db::repositories::{InMemoryWorkOrderLinkRepository, WorkOrderLinkRepository};

    use crate::system::InMemoryWorkOrderSystem;

    use super::{SyncAdapter, SyncOutcome};

    fn ticket(status: TicketStatus) -> Ticket {
        let mut ticket = Ticket::new(
            TicketId("t-1".to_string()),
            "AB26-00001".to_string(),
            UnitScope::plant("DJ"),
            PersonId("u-creator".to_string()),
            None,
            Utc::now(),
        );
        ticket.status = status;
        ticket
    }

    #[tokio::test]
    async fn acceptance_creates_a_work_order_and_link() {
        let system = Arc::new(InMemoryWorkOrderSystem::default());
        let links = Arc::new(InMemoryWorkOrderLinkRepository::default());
        let adapter = SyncAdapter::new(system.clone(), links.clone());

        let outcome = adapter.sync_after_transition(&ticket(TicketStatus::Accepted)).await;
        assert!(matches!(outcome, SyncOutcome::Created { .. }));

        let link = links
            .find_by_ticket(&TicketId("t-1".to_string()))
            .await
            .expect("find link")
            .expect("link exists");
        assert_eq!(link.external_code, 10);
        assert_eq!(link.sync_status, SyncStatus::Success);
        assert_eq!(system.order_count().await, 1);
    }

    #[tokio::test]
    async fn pre_acceptance_statuses_are_skipped() {
        let system = Arc::new(InMemoryWorkOrderSystem::default());
        let links = Arc::new(InMemoryWorkOrderLinkRepository::default());
        let adapter = SyncAdapter::new(system.clone(), links.clone());

        let outcome = adapter.sync_after_transition(&ticket(TicketStatus::Open)).await;
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(system.order_count().await, 0);
    }

    #[tokio::test]
    async fn linked_tickets_push_status_updates() {
        let system = Arc::new(InMemoryWorkOrderSystem::default());
        let links = Arc::new(InMemoryWorkOrderLinkRepository::default());
        let adapter = SyncAdapter::new(system.clone(), links.clone());

        adapter.sync_after_transition(&ticket(TicketStatus::Accepted)).await;
        let outcome = adapter.sync_after_transition(&ticket(TicketStatus::InProgress)).await;

        assert!(matches!(outcome, SyncOutcome::Updated { status_code: 50, .. }));
        let link = links
            .find_by_ticket(&TicketId("t-1".to_string()))
            .await
            .expect("find link")
            .expect("link exists");
        assert_eq!(link.external_code, 50);
    }

    #[tokio::test]
    async fn bridge_outage_marks_the_link_errored() {
        let healthy = Arc::new(InMemoryWorkOrderSystem::default());
        let links = Arc::new(InMemoryWorkOrderLinkRepository::default());

        // Create the link while the bridge is up, then fail updates.
        SyncAdapter::new(healthy, links.clone())
            .sync_after_transition(&ticket(TicketStatus::Accepted))
            .await;

        let failing = Arc::new(InMemoryWorkOrderSystem::failing());
        let adapter = SyncAdapter::new(failing, links.clone());
        let outcome = adapter.sync_after_transition(&ticket(TicketStatus::InProgress)).await;

        assert!(matches!(outcome, SyncOutcome::Failed { .. }));
        let link = links
            .find_by_ticket(&TicketId("t-1".to_string()))
            .await
            .expect("find link")
            .expect("link exists");
        assert_eq!(link.sync_status, SyncStatus::Error);
        assert!(link.last_error.is_some());
    }
}
