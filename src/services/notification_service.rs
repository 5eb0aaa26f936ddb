use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::PushConfig;
use crate::error::{Error, Result};
use crate::models::account::Account;
use crate::models::chat::Chat;
use crate::services::account_service::AccountService;
use crate::store::ChatStore;

const FALLBACK_SENDER: &str = "A user";
const FALLBACK_ANIMAL: &str = "an animal";
const CHAT_MESSAGE_KIND: &str = "chat_message";

/// Gateway-agnostic push request for one recipient device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushNotification {
    pub recipient_id: Uuid,
    pub subscription: String,
    pub heading: String,
    pub content: String,
    pub url: String,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    pub chat_id: Uuid,
    pub animal_id: Option<Uuid>,
    pub animal_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReceipt {
    pub gateway_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationResult {
    Sent {
        recipient_id: Uuid,
        gateway_id: Option<String>,
    },
    NotSubscribed {
        recipient_id: Uuid,
    },
    NotConfigured,
    Failed {
        reason: String,
    },
}

impl NotificationResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, NotificationResult::Failed { .. })
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, notification: &PushNotification) -> Result<GatewayReceipt>;
}

/// OneSignal REST delivery.
#[derive(Clone)]
pub struct OneSignalGateway {
    client: Client,
    api_url: String,
    app_id: String,
    rest_api_key: String,
}

impl OneSignalGateway {
    /// `None` unless both the app id and the REST key are configured.
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>> {
        let (Some(app_id), Some(rest_api_key)) = (&config.app_id, &config.rest_api_key) else {
            return Ok(None);
        };
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Some(Self {
            client,
            api_url: config.api_url.clone(),
            app_id: app_id.clone(),
            rest_api_key: rest_api_key.clone(),
        }))
    }

    pub fn payload(&self, notification: &PushNotification) -> JsonValue {
        json!({
            "app_id": self.app_id,
            "include_player_ids": [notification.subscription],
            "headings": { "en": notification.heading },
            "contents": { "en": notification.content },
            "data": notification.data,
            "url": notification.url,
            "web_url": notification.url,
        })
    }
}

#[async_trait]
impl PushGateway for OneSignalGateway {
    async fn send(&self, notification: &PushNotification) -> Result<GatewayReceipt> {
        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Basic {}", self.rest_api_key))
            .json(&self.payload(notification))
            .send()
            .await?;

        let status = resp.status();
        let body: JsonValue = resp.json().await.unwrap_or(JsonValue::Null);
        if !status.is_success() {
            return Err(Error::Internal(format!(
                "Push gateway returned {}: {}",
                status, body
            )));
        }
        // OneSignal reports soft failures (e.g. invalid player ids) in a 200.
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            if body.get("id").and_then(JsonValue::as_str).map_or(true, str::is_empty) {
                return Err(Error::Internal(format!("Push gateway rejected: {}", errors)));
            }
        }
        Ok(GatewayReceipt {
            gateway_id: body.get("id").and_then(JsonValue::as_str).map(str::to_string),
        })
    }
}

/// Builds the push for `recipient` about a message in `chat`.
pub fn build_notification(
    chat: &Chat,
    sender: Option<&Account>,
    recipient_id: Uuid,
    subscription: &str,
    content: &str,
    site_url: &str,
) -> PushNotification {
    let sender_name = sender
        .map(|a| a.display_name.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_SENDER);
    PushNotification {
        recipient_id,
        subscription: subscription.to_string(),
        heading: format!("Message from {}", sender_name),
        content: content.to_string(),
        url: format!("{}/chats/{}", site_url.trim_end_matches('/'), chat.id),
        data: PushData {
            chat_id: chat.id,
            animal_id: chat.animal_id,
            animal_name: chat
                .animal_name
                .clone()
                .unwrap_or_else(|| FALLBACK_ANIMAL.to_string()),
            kind: CHAT_MESSAGE_KIND.to_string(),
        },
    }
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn ChatStore>,
    accounts: AccountService,
    gateway: Option<Arc<dyn PushGateway>>,
    site_url: String,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        accounts: AccountService,
        gateway: Option<Arc<dyn PushGateway>>,
        site_url: String,
    ) -> Self {
        Self {
            store,
            accounts,
            gateway,
            site_url,
        }
    }

    /// One delivery attempt for a persisted message. Never returns an error:
    /// every failure is folded into [`NotificationResult::Failed`].
    pub async fn notify(&self, chat_id: Uuid, content: &str, sender_id: Uuid) -> NotificationResult {
        match self.try_notify(chat_id, content, sender_id).await {
            Ok(result) => result,
            Err(e) => NotificationResult::Failed {
                reason: e.to_string(),
            },
        }
    }

    async fn try_notify(
        &self,
        chat_id: Uuid,
        content: &str,
        sender_id: Uuid,
    ) -> Result<NotificationResult> {
        let chat = self
            .store
            .find_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound("Chat not found".into()))?;
        let recipient_id = chat
            .counterpart_of(sender_id)
            .ok_or_else(|| Error::Forbidden("Sender is not a party of this chat".into()))?;

        let parties = self.accounts.resolve_parties(&[sender_id, recipient_id]).await?;
        let Some(subscription) = parties
            .get(&recipient_id)
            .and_then(Account::push_subscription)
        else {
            return Ok(NotificationResult::NotSubscribed { recipient_id });
        };

        let Some(gateway) = &self.gateway else {
            return Ok(NotificationResult::NotConfigured);
        };

        let notification = build_notification(
            &chat,
            parties.get(&sender_id),
            recipient_id,
            subscription,
            content,
            &self.site_url,
        );
        let receipt = gateway.send(&notification).await?;
        Ok(NotificationResult::Sent {
            recipient_id,
            gateway_id: receipt.gateway_id,
        })
    }

    /// Fires [`NotificationService::notify`] on its own task. The outcome only
    /// reaches the logs; dropping the handle does not cancel delivery.
    pub fn dispatch_detached(
        &self,
        chat_id: Uuid,
        content: String,
        sender_id: Uuid,
    ) -> JoinHandle<NotificationResult> {
        let svc = self.clone();
        tokio::spawn(async move {
            let result = svc.notify(chat_id, &content, sender_id).await;
            match &result {
                NotificationResult::Sent { recipient_id, gateway_id } => tracing::info!(
                    chat_id = %chat_id,
                    recipient_id = %recipient_id,
                    gateway_id = ?gateway_id,
                    "push notification sent"
                ),
                NotificationResult::NotSubscribed { recipient_id } => tracing::debug!(
                    chat_id = %chat_id,
                    recipient_id = %recipient_id,
                    "recipient has no push subscription"
                ),
                NotificationResult::NotConfigured => {
                    tracing::debug!(chat_id = %chat_id, "push gateway not configured")
                }
                NotificationResult::Failed { reason } => {
                    tracing::warn!(chat_id = %chat_id, reason = %reason, "push notification failed")
                }
            }
            result
        })
    }
}
