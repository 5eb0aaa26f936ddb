use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::dto::chat_dto::{ChatDetail, ChatSummary, PartySummary};
use crate::error::{Error, Result};
use crate::models::chat::{adoption_interest_message, Chat, NewChat, PartyRole};
use crate::models::message::{Message, MessageBody};
use crate::services::account_service::AccountService;
use crate::services::notification_service::{NotificationResult, NotificationService};
use crate::store::{ChatOpening, ChatStore, OpenOutcome};

/// A persisted message plus the handle of its detached push attempt.
#[derive(Debug)]
pub struct Delivery {
    pub chat: Chat,
    pub message: Message,
    pub notification: JoinHandle<NotificationResult>,
}

#[derive(Debug)]
pub struct StartedChat {
    pub opening: ChatOpening,
    /// Present only when an opening message was written.
    pub notification: Option<JoinHandle<NotificationResult>>,
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    accounts: AccountService,
    notifier: NotificationService,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        accounts: AccountService,
        notifier: NotificationService,
    ) -> Self {
        Self {
            store,
            accounts,
            notifier,
        }
    }

    /// Backend label and reachability of the chat store.
    pub async fn store_status(&self) -> (&'static str, Result<()>) {
        (self.store.backend(), self.store.ping().await)
    }

    /// Confirms `user_id` is an adopter and `shelter_id` a shelter.
    async fn check_parties(&self, user_id: Uuid, shelter_id: Uuid) -> Result<()> {
        let parties = self.accounts.resolve_parties(&[user_id, shelter_id]).await?;
        let user = parties
            .get(&user_id)
            .ok_or_else(|| Error::NotFound("Account not found".into()))?;
        if user.is_shelter {
            return Err(Error::Forbidden("Shelters cannot start adoption chats".into()));
        }
        match parties.get(&shelter_id) {
            Some(shelter) if shelter.is_shelter => Ok(()),
            Some(_) => Err(Error::BadRequest("Target account is not a shelter".into())),
            None => Err(Error::NotFound("Shelter not found".into())),
        }
    }

    /// Returns the chat for `(user, shelter, animal)`, creating it with zeroed
    /// counters and no preview on first contact.
    pub async fn get_or_create_chat(
        &self,
        user_id: Uuid,
        shelter_id: Uuid,
        animal_id: Option<Uuid>,
        animal_name: Option<String>,
    ) -> Result<ChatOpening> {
        let request = NewChat::new(user_id, shelter_id, animal_id, animal_name)?;
        self.check_parties(user_id, shelter_id).await?;
        self.store.get_or_create_chat(&request).await
    }

    /// Adoption flow: a first-time chat is created together with the canned
    /// interest message from the user. An existing chat comes back untouched.
    pub async fn request_adoption(
        &self,
        user_id: Uuid,
        shelter_id: Uuid,
        animal_id: Option<Uuid>,
        animal_name: Option<String>,
    ) -> Result<StartedChat> {
        let request = NewChat::new(user_id, shelter_id, animal_id, animal_name)?;
        self.check_parties(user_id, shelter_id).await?;

        let body = MessageBody::parse(&adoption_interest_message(request.animal_name.as_deref()))?;
        let opening = self.store.create_chat_with_message(&request, &body).await?;

        let notification = opening.first_message.as_ref().map(|m| {
            self.notifier
                .dispatch_detached(m.chat_id, m.content.clone(), m.sender_id)
        });
        if opening.created {
            tracing::info!(chat_id = %opening.chat.id, user_id = %user_id, shelter_id = %shelter_id, "adoption chat opened");
        }
        Ok(StartedChat {
            opening,
            notification,
        })
    }

    pub async fn send_message(&self, chat_id: Uuid, sender_id: Uuid, content: &str) -> Result<Delivery> {
        let body = MessageBody::parse(content)?;
        let appended = self.store.append_message(chat_id, sender_id, &body).await?;
        tracing::debug!(chat_id = %chat_id, message_id = %appended.message.id, "message stored");

        let notification =
            self.notifier
                .dispatch_detached(chat_id, appended.message.content.clone(), sender_id);
        Ok(Delivery {
            chat: appended.chat,
            message: appended.message,
            notification,
        })
    }

    pub async fn open_chat(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<OpenOutcome> {
        let outcome = self.store.open_chat(chat_id, viewer_id).await?;
        if !outcome.read_flags_applied {
            tracing::warn!(chat_id = %chat_id, "chat opened without updating read flags");
        }
        Ok(outcome)
    }

    async fn chat_for(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<(Chat, PartyRole)> {
        let chat = self
            .store
            .find_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound("Chat not found".into()))?;
        let role = chat.require_role(viewer_id)?;
        Ok((chat, role))
    }

    pub async fn list_chats(&self, viewer_id: Uuid) -> Result<Vec<ChatSummary>> {
        let chats = self.store.chats_for_account(viewer_id).await?;
        let counterpart_ids: Vec<Uuid> = chats
            .iter()
            .filter_map(|c| c.counterpart_of(viewer_id))
            .collect();
        let parties = self.accounts.resolve_parties(&counterpart_ids).await?;

        Ok(chats
            .iter()
            .filter_map(|chat| {
                let role = chat.role_of(viewer_id)?;
                let counterpart_id = chat.party_id(role.counterpart());
                let counterpart = parties
                    .get(&counterpart_id)
                    .map(PartySummary::from)
                    .unwrap_or_else(|| {
                        PartySummary::unresolved(counterpart_id, role.counterpart() == PartyRole::Shelter)
                    });
                Some(ChatSummary::new(chat, role, counterpart))
            })
            .collect())
    }

    pub async fn chat_detail(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<ChatDetail> {
        let (chat, role) = self.chat_for(chat_id, viewer_id).await?;
        let parties = self
            .accounts
            .resolve_parties(&[chat.user_id, chat.shelter_id])
            .await?;
        let summary = |id: Uuid, is_shelter: bool| {
            parties
                .get(&id)
                .map(PartySummary::from)
                .unwrap_or_else(|| PartySummary::unresolved(id, is_shelter))
        };

        Ok(ChatDetail {
            id: chat.id,
            role,
            user: summary(chat.user_id, false),
            shelter: summary(chat.shelter_id, true),
            animal_id: chat.animal_id,
            animal_name: chat.animal_name.clone(),
            last_message: chat.last_message.clone(),
            last_message_at: chat.last_message_at,
            unread_count: chat.unread_for(role),
            created_at: chat.created_at,
        })
    }

    /// Read-only; opening the chat is a separate command.
    pub async fn list_messages(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<Vec<Message>> {
        self.chat_for(chat_id, viewer_id).await?;
        self.store.messages_for_chat(chat_id).await
    }

    pub async fn unread_total(&self, viewer_id: Uuid) -> Result<i64> {
        self.store.unread_total(viewer_id).await
    }
}
