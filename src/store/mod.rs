//! Storage seam for chats, messages and accounts.
//!
//! Every mutating method is a single atomic unit: either all of its effects
//! are visible afterwards or none are. Unread counters are written only by
//! [`ChatStore::append_message`], [`ChatStore::create_chat_with_message`] and
//! [`ChatStore::open_chat`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::account::Account;
use crate::models::chat::{Chat, NewChat};
use crate::models::message::{Message, MessageBody};

pub use memory::{MemoryAccountDirectory, MemoryChatStore};
pub use postgres::{PgAccountDirectory, PgChatStore};

/// Result of a get-or-create call. `created` is false when an existing chat
/// with the same key was returned.
#[derive(Debug, Clone)]
pub struct ChatOpening {
    pub chat: Chat,
    pub created: bool,
    /// Present only when the chat was created by this call with an opening
    /// message.
    pub first_message: Option<Message>,
}

#[derive(Debug, Clone)]
pub struct AppendedMessage {
    pub chat: Chat,
    pub message: Message,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOutcome {
    pub messages_marked_read: u64,
    /// False when the read-flag update failed and only the counter reset was
    /// committed.
    pub read_flags_applied: bool,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Backend label reported by the health check.
    fn backend(&self) -> &'static str;

    /// Fails with [`crate::error::Error::StoreUnavailable`] when the store
    /// cannot serve requests.
    async fn ping(&self) -> Result<()>;

    async fn find_chat(&self, chat_id: Uuid) -> Result<Option<Chat>>;

    /// Returns the chat for the request's key, inserting it with zeroed
    /// counters when absent.
    async fn get_or_create_chat(&self, request: &NewChat) -> Result<ChatOpening>;

    /// Like [`ChatStore::get_or_create_chat`], but a newly created chat gets
    /// `opening` appended from the user party in the same unit of work. An
    /// existing chat is returned untouched.
    async fn create_chat_with_message(
        &self,
        request: &NewChat,
        opening: &MessageBody,
    ) -> Result<ChatOpening>;

    /// Inserts the message, refreshes the chat preview and increments the
    /// recipient's counter. Fails with `NotFound` for an unknown chat and
    /// `Forbidden` when the sender is not a party.
    async fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> Result<AppendedMessage>;

    /// Resets the viewer's counter and marks the counterpart's messages read.
    async fn open_chat(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<OpenOutcome>;

    /// Chats where the account is either party, most recent activity first.
    async fn chats_for_account(&self, account_id: Uuid) -> Result<Vec<Chat>>;

    /// Messages of a chat in display order (`created_at`, then `seq`).
    async fn messages_for_chat(&self, chat_id: Uuid) -> Result<Vec<Message>>;

    /// Sum of the account's own counter across all of its chats.
    async fn unread_total(&self, account_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>>;

    async fn find_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Account>>;

    /// Stores or clears the push subscription. Returns false when the
    /// account does not exist.
    async fn set_push_token(&self, account_id: Uuid, token: Option<&str>) -> Result<bool>;

    async fn upsert_account(&self, account: &Account) -> Result<()>;
}
