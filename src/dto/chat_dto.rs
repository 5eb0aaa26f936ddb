use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::account::Account;
use crate::models::chat::{Chat, PartyRole};
use crate::models::message::Message;
use crate::store::OpenOutcome;

fn default_true() -> bool {
    true
}

/// Body of `POST /api/chats`. The caller is the adopting user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StartChatRequest {
    pub shelter_id: Uuid,
    pub animal_id: Option<Uuid>,
    #[validate(length(max = 200))]
    pub animal_name: Option<String>,
    /// When set, a newly created chat opens with the canned adoption message.
    #[serde(default = "default_true")]
    pub with_interest_message: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

/// Display info for one side of a chat. `display_name` is null when the
/// account could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PartySummary {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_shelter: bool,
}

impl PartySummary {
    pub fn unresolved(id: Uuid, is_shelter: bool) -> Self {
        Self {
            id,
            display_name: None,
            avatar_url: None,
            is_shelter,
        }
    }
}

impl From<&Account> for PartySummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            display_name: Some(account.display_name.clone()),
            avatar_url: account.avatar_url.clone(),
            is_shelter: account.is_shelter,
        }
    }
}

/// One row of the chat list, seen from the caller's side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatSummary {
    pub id: Uuid,
    pub role: PartyRole,
    pub counterpart: PartySummary,
    pub animal_id: Option<Uuid>,
    pub animal_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i32,
}

impl ChatSummary {
    pub fn new(chat: &Chat, role: PartyRole, counterpart: PartySummary) -> Self {
        Self {
            id: chat.id,
            role,
            counterpart,
            animal_id: chat.animal_id,
            animal_name: chat.animal_name.clone(),
            last_message: chat.last_message.clone(),
            last_message_at: chat.last_message_at,
            unread_count: chat.unread_for(role),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatDetail {
    pub id: Uuid,
    pub role: PartyRole,
    pub user: PartySummary,
    pub shelter: PartySummary,
    pub animal_id: Option<Uuid>,
    pub animal_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i32,
    pub created_at: DateTime<Utc>,
}

impl ChatDetail {
    pub fn counterpart(&self) -> &PartySummary {
        match self.role {
            PartyRole::User => &self.shelter,
            PartyRole::Shelter => &self.user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub seq: i64,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            seq: m.seq,
            chat_id: m.chat_id,
            sender_id: m.sender_id,
            content: m.content,
            read: m.read,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartChatResponse {
    pub chat_id: Uuid,
    pub created: bool,
    pub message: Option<MessageResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OpenChatResponse {
    pub messages_marked_read: u64,
    pub read_flags_applied: bool,
}

impl From<OpenOutcome> for OpenChatResponse {
    fn from(o: OpenOutcome) -> Self {
        Self {
            messages_marked_read: o.messages_marked_read,
            read_flags_applied: o.read_flags_applied,
        }
    }
}
