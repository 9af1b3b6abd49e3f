use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use gemba_core::domain::ticket::Ticket;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkOrderError {
    #[error("work order request failed: {0}")]
    Request(String),
    #[error("work order `{0}` does not exist")]
    NotFound(String),
}

/// Identifier plus current status code of a work order on the external
/// side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkOrderSnapshot {
    pub external_id: String,
    pub status_code: u8,
}

/// Seam to the external maintenance system. One work order per ticket;
/// the external id is assigned by the remote side on creation.
#[async_trait]
pub trait WorkOrderSystem: Send + Sync {
    async fn create_work_order(
        &self,
        ticket: &Ticket,
        status_code: u8,
    ) -> Result<WorkOrderSnapshot, WorkOrderError>;

    async fn update_status(
        &self,
        external_id: &str,
        status_code: u8,
    ) -> Result<WorkOrderSnapshot, WorkOrderError>;

    async fn get_status(&self, external_id: &str)
        -> Result<WorkOrderSnapshot, WorkOrderError>;
}

/// In-process stand-in used in tests and when the bridge is disabled.
/// Assigns sequential `WO-{n}` ids and can be scripted to fail.
#[derive(Default)]
pub struct InMemoryWorkOrderSystem {
    state: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    orders: HashMap<String, u8>,
    next_id: u64,
    fail_requests: bool,
}

impl InMemoryWorkOrderSystem {
    pub fn failing() -> Self {
        Self {
            state: Mutex::new(InMemoryState { fail_requests: true, ..InMemoryState::default() }),
        }
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl WorkOrderSystem for InMemoryWorkOrderSystem {
    async fn create_work_order(
        &self,
        _ticket: &Ticket,
        status_code: u8,
    ) -> Result<WorkOrderSnapshot, WorkOrderError> {
        let mut state = self.state.lock().await;
        if state.fail_requests {
            return Err(WorkOrderError::Request("scripted outage".to_string()));
        }
        state.next_id += 1;
        let external_id = format!("WO-{}", 9000 + state.next_id);
        state.orders.insert(external_id.clone(), status_code);
        Ok(WorkOrderSnapshot { external_id, status_code })
    }

    async fn update_status(
        &self,
        external_id: &str,
        status_code: u8,
    ) -> Result<WorkOrderSnapshot, WorkOrderError> {
        let mut state = self.state.lock().await;
        if state.fail_requests {
            return Err(WorkOrderError::Request("scripted outage".to_string()));
        }
        let stored = state
            .orders
            .get_mut(external_id)
            .ok_or_else(|| WorkOrderError::NotFound(external_id.to_string()))?;
        *stored = status_code;
        Ok(WorkOrderSnapshot { external_id: external_id.to_string(), status_code })
    }

    async fn get_status(
        &self,
        external_id: &str,
    ) -> Result<WorkOrderSnapshot, WorkOrderError> {
        let state = self.state.lock().await;
        let status_code = state
            .orders
            .get(external_id)
            .copied()
            .ok_or_else(|| WorkOrderError::NotFound(external_id.to_string()))?;
        Ok(WorkOrderSnapshot { external_id: external_id.to_string(), status_code })
    }
}
