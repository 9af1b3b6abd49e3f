use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use gemba_core::domain::recipient::NotificationRecipient;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("channel is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("send failed: {0}")]
    Send(String),
}

/// What gets said, independent of the channel it goes out on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationMessage {
    pub ticket_number: String,
    pub subject: String,
    pub body: String,
}

/// Outbound delivery seam. Implementations send to one recipient at a
/// time; fan-out, ordering, and throttling live in the dispatcher.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(
        &self,
        recipient: &NotificationRecipient,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError>;

    async fn send_chat(
        &self,
        recipient: &NotificationRecipient,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError>;
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_email(
        &self,
        _recipient: &NotificationRecipient,
        _message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_chat(
        &self,
        _recipient: &NotificationRecipient,
        _message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Test double shared across crates: records every send and can be
/// scripted to fail a channel.
#[derive(Default)]
pub struct RecordingNotifier {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    emails: Vec<(NotificationRecipient, NotificationMessage)>,
    chats: Vec<(NotificationRecipient, NotificationMessage)>,
    fail_email: bool,
    fail_chat: bool,
}

impl RecordingNotifier {
    pub fn failing_email() -> Self {
        Self {
            state: Mutex::new(RecordingState { fail_email: true, ..RecordingState::default() }),
        }
    }

    pub fn failing_chat() -> Self {
        Self { state: Mutex::new(RecordingState { fail_chat: true, ..RecordingState::default() }) }
    }

    pub async fn emails(&self) -> Vec<(NotificationRecipient, NotificationMessage)> {
        self.state.lock().await.emails.clone()
    }

    pub async fn chats(&self) -> Vec<(NotificationRecipient, NotificationMessage)> {
        self.state.lock().await.chats.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_email(
        &self,
        recipient: &NotificationRecipient,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let mut state = self.state.lock().await;
        if state.fail_email {
            return Err(DeliveryError::Send("scripted email failure".to_string()));
        }
        state.emails.push((recipient.clone(), message.clone()));
        Ok(())
    }

    async fn send_chat(
        &self,
        recipient: &NotificationRecipient,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let mut state = self.state.lock().await;
        if state.fail_chat {
            return Err(DeliveryError::Send("scripted chat failure".to_string()));
        }
        state.chats.push((recipient.clone(), message.clone()));
        Ok(())
    }
}
