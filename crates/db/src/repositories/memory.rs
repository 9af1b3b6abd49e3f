use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use gemba_core::domain::contact::ContactCard;
use gemba_core::domain::grant::{ApprovalGrant, ApprovalLevel, GrantId, PersonId};
use gemba_core::domain::ticket::{
    StatusHistoryEntry, Ticket, TicketId, TicketStatus, WorkOrderLink,
};

use super::{
    format_ticket_number, ContactRepository, GrantRepository, RepositoryError,
    TicketNumberRepository, TicketRepository, WorkOrderLinkRepository,
};

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
    history: RwLock<Vec<StatusHistoryEntry>>,
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(&id.0).cloned())
    }

    async fn find_by_number(
        &self,
        ticket_number: &str,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.values().find(|ticket| ticket.ticket_number == ticket_number).cloned())
    }

    async fn insert(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.0.clone(), ticket);
        Ok(())
    }

    async fn save_transition(
        &self,
        ticket: &Ticket,
        entry: &StatusHistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        let stored = tickets.get_mut(&ticket.id.0).ok_or_else(|| {
            RepositoryError::Conflict(format!("ticket {} does not exist", ticket.id.0))
        })?;

        if stored.version != ticket.version {
            return Err(RepositoryError::Conflict(format!(
                "ticket {} changed since version {}",
                ticket.id.0, ticket.version
            )));
        }

        let mut updated = ticket.clone();
        updated.version += 1;
        *stored = updated;

        let mut history = self.history.write().await;
        history.push(entry.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        let mut matching: Vec<Ticket> =
            tickets.values().filter(|ticket| ticket.status == status).cloned().collect();
        matching.sort_by_key(|ticket| ticket.created_at);
        Ok(matching)
    }

    async fn list_history(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let history = self.history.read().await;
        Ok(history.iter().filter(|entry| &entry.ticket_id == ticket_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryGrantRepository {
    grants: RwLock<Vec<ApprovalGrant>>,
}

#[async_trait::async_trait]
impl GrantRepository for InMemoryGrantRepository {
    async fn grants_for_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Vec<ApprovalGrant>, RepositoryError> {
        let grants = self.grants.read().await;
        Ok(grants.iter().filter(|grant| &grant.person_id == person_id).cloned().collect())
    }

    async fn grants_at_level(
        &self,
        level: ApprovalLevel,
    ) -> Result<Vec<ApprovalGrant>, RepositoryError> {
        let grants = self.grants.read().await;
        Ok(grants.iter().filter(|grant| grant.level == level).cloned().collect())
    }

    async fn save(&self, grant: ApprovalGrant) -> Result<(), RepositoryError> {
        let mut grants = self.grants.write().await;
        if let Some(existing) = grants.iter_mut().find(|candidate| candidate.id == grant.id) {
            *existing = grant;
        } else {
            grants.push(grant);
        }
        Ok(())
    }

    async fn delete(&self, id: &GrantId) -> Result<(), RepositoryError> {
        let mut grants = self.grants.write().await;
        grants.retain(|grant| &grant.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: RwLock<HashMap<String, ContactCard>>,
}

#[async_trait::async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn find_by_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Option<ContactCard>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts.get(&person_id.0).cloned())
    }

    async fn save(&self, contact: ContactCard) -> Result<(), RepositoryError> {
        let mut contacts = self.contacts.write().await;
        contacts.insert(contact.person_id.0.clone(), contact);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWorkOrderLinkRepository {
    links: RwLock<HashMap<String, WorkOrderLink>>,
}

#[async_trait::async_trait]
impl WorkOrderLinkRepository for InMemoryWorkOrderLinkRepository {
    async fn find_by_ticket(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Option<WorkOrderLink>, RepositoryError> {
        let links = self.links.read().await;
        Ok(links.get(&ticket_id.0).cloned())
    }

    async fn save(&self, link: WorkOrderLink) -> Result<(), RepositoryError> {
        let mut links = self.links.write().await;
        links.insert(link.ticket_id.0.clone(), link);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTicketNumberRepository {
    counter: AtomicI64,
}

#[async_trait::async_trait]
impl TicketNumberRepository for InMemoryTicketNumberRepository {
    async fn next_number(&self, now: DateTime<Utc>) -> Result<String, RepositoryError> {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format_ticket_number(now, sequence))
    }
}
