use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use gemba_core::config::NotifierConfig;
use gemba_core::domain::recipient::NotificationRecipient;

use crate::channel::{DeliveryError, NotificationMessage, Notifier};

/// Webhook-backed delivery. Email goes through the mail relay's inbound
/// webhook, chat through the chat gateway with a bearer token.
pub struct HttpNotifier {
    client: reqwest::Client,
    email_webhook_url: Option<String>,
    chat_webhook_url: Option<String>,
    chat_bot_token: Option<SecretString>,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    ticket_number: &'a str,
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    ticket_number: &'a str,
}

impl HttpNotifier {
    pub fn from_config(config: &NotifierConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.send_timeout_secs.max(1)))
            .build()
            .map_err(|error| DeliveryError::Send(error.to_string()))?;

        Ok(Self {
            client,
            email_webhook_url: config.email_webhook_url.clone(),
            chat_webhook_url: config.chat_webhook_url.clone(),
            chat_bot_token: config.chat_bot_token.clone(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_email(
        &self,
        recipient: &NotificationRecipient,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let url = self
            .email_webhook_url
            .as_deref()
            .ok_or(DeliveryError::NotConfigured("email webhook"))?;
        let to = recipient.email.as_deref().ok_or(DeliveryError::NotConfigured("email"))?;

        let response = self
            .client
            .post(url)
            .json(&EmailPayload {
                to,
                subject: &message.subject,
                body: &message.body,
                ticket_number: &message.ticket_number,
            })
            .send()
            .await
            .map_err(|error| DeliveryError::Send(error.to_string()))?;

        response
            .error_for_status()
            .map_err(|error| DeliveryError::Send(error.to_string()))?;
        Ok(())
    }

    async fn send_chat(
        &self,
        recipient: &NotificationRecipient,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let url = self
            .chat_webhook_url
            .as_deref()
            .ok_or(DeliveryError::NotConfigured("chat webhook"))?;
        let chat_id =
            recipient.chat_id.as_deref().ok_or(DeliveryError::NotConfigured("chat id"))?;

        let mut request = self.client.post(url).json(&ChatPayload {
            chat_id,
            text: &message.body,
            ticket_number: &message.ticket_number,
        });
        if let Some(token) = &self.chat_bot_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| DeliveryError::Send(error.to_string()))?;

        response
            .error_for_status()
            .map_err(|error| DeliveryError::Send(error.to_string()))?;
        Ok(())
    }
}
