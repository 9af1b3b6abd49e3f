use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use gemba_core::domain::recipient::NotificationRecipient;

use crate::channel::{NotificationMessage, Notifier};

/// Counts for one fan-out pass. Delivery is best-effort: failed sends are
/// tallied and logged, never propagated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub emails_sent: usize,
    pub chats_sent: usize,
    pub failed: usize,
    pub unreachable: usize,
}

/// Fans one message out to a resolved recipient list. Chat sends are
/// paced: the chat gateway throttles at roughly two requests per second,
/// so consecutive sends keep a minimum interval between them.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    chat_min_interval: Duration,
    last_chat_send: Mutex<Option<Instant>>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, chat_min_interval: Duration) -> Self {
        Self { notifier, chat_min_interval, last_chat_send: Mutex::new(None) }
    }

    pub async fn dispatch(
        &self,
        recipients: &[NotificationRecipient],
        message: &NotificationMessage,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for recipient in recipients {
            let mut reached = false;

            if recipient.email.is_some() {
                match self.notifier.send_email(recipient, message).await {
                    Ok(()) => {
                        reached = true;
                        summary.emails_sent += 1;
                    }
                    Err(error) => {
                        summary.failed += 1;
                        warn!(
                            event_name = "notify.email_failed",
                            person_id = %recipient.person_id.0,
                            ticket_number = %message.ticket_number,
                            error = %error,
                            "email delivery failed; continuing fan-out"
                        );
                    }
                }
            }

            if recipient.chat_id.is_some() {
                self.pace_chat().await;
                match self.notifier.send_chat(recipient, message).await {
                    Ok(()) => {
                        reached = true;
                        summary.chats_sent += 1;
                    }
                    Err(error) => {
                        summary.failed += 1;
                        warn!(
                            event_name = "notify.chat_failed",
                            person_id = %recipient.person_id.0,
                            ticket_number = %message.ticket_number,
                            error = %error,
                            "chat delivery failed; continuing fan-out"
                        );
                    }
                }
            }

            if !reached && recipient.email.is_none() && recipient.chat_id.is_none() {
                summary.unreachable += 1;
                debug!(
                    event_name = "notify.recipient_unreachable",
                    person_id = %recipient.person_id.0,
                    ticket_number = %message.ticket_number,
                    "recipient has no email or chat id"
                );
            }
        }

        summary
    }

    async fn pace_chat(&self) {
        let mut last = self.last_chat_send.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.chat_min_interval {
                tokio::time::sleep(self.chat_min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
