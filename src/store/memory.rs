//! Process-local store used when no database is configured and by the test
//! suite. One mutex guards all chat state, so every method is atomic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AccountDirectory, AppendedMessage, ChatOpening, ChatStore, OpenOutcome};
use crate::error::{Error, Result};
use crate::models::account::Account;
use crate::models::chat::{Chat, ChatKey, NewChat, PartyRole};
use crate::models::message::{Message, MessageBody};

#[derive(Debug, Default)]
struct ChatTables {
    chats: HashMap<Uuid, Chat>,
    by_key: HashMap<ChatKey, Uuid>,
    messages: HashMap<Uuid, Vec<Message>>,
    next_seq: i64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ChatTables {
    /// Wall-clock time, never earlier than the previous call.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = match self.last_timestamp {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last_timestamp = Some(now);
        now
    }

    fn insert_chat(&mut self, request: &NewChat) -> Chat {
        let now = self.tick();
        let chat = Chat::new(request, now);
        self.by_key.insert(chat.key(), chat.id);
        self.chats.insert(chat.id, chat.clone());
        chat
    }

    fn existing(&self, request: &NewChat) -> Option<Chat> {
        self.by_key
            .get(&request.key())
            .and_then(|id| self.chats.get(id))
            .cloned()
    }

    fn append(&mut self, chat_id: Uuid, sender_id: Uuid, body: &MessageBody) -> Result<AppendedMessage> {
        let role = self
            .chats
            .get(&chat_id)
            .ok_or_else(|| Error::NotFound("Chat not found".into()))?
            .require_role(sender_id)?;

        let now = self.tick();
        self.next_seq += 1;
        let message = Message {
            id: Uuid::new_v4(),
            seq: self.next_seq,
            chat_id,
            sender_id,
            content: body.as_str().to_string(),
            read: false,
            created_at: now,
        };

        let chat = self
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::NotFound("Chat not found".into()))?;
        chat.record_message(role, body.as_str(), now);
        let chat = chat.clone();

        self.messages.entry(chat_id).or_default().push(message.clone());
        Ok(AppendedMessage { chat, message })
    }
}

#[derive(Clone, Default)]
pub struct MemoryChatStore {
    tables: Arc<Mutex<ChatTables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a storage outage: while set, every call fails with
    /// `StoreUnavailable` and nothing is mutated.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChatTables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("chat store is unavailable".into()));
        }
        self.tables
            .lock()
            .map_err(|_| Error::Internal("chat store mutex poisoned".into()))
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn find_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        Ok(self.lock()?.chats.get(&chat_id).cloned())
    }

    async fn get_or_create_chat(&self, request: &NewChat) -> Result<ChatOpening> {
        let mut tables = self.lock()?;
        if let Some(chat) = tables.existing(request) {
            return Ok(ChatOpening {
                chat,
                created: false,
                first_message: None,
            });
        }
        let chat = tables.insert_chat(request);
        Ok(ChatOpening {
            chat,
            created: true,
            first_message: None,
        })
    }

    async fn create_chat_with_message(
        &self,
        request: &NewChat,
        opening: &MessageBody,
    ) -> Result<ChatOpening> {
        let mut tables = self.lock()?;
        if let Some(chat) = tables.existing(request) {
            return Ok(ChatOpening {
                chat,
                created: false,
                first_message: None,
            });
        }
        let chat = tables.insert_chat(request);
        let appended = tables.append(chat.id, request.user_id, opening)?;
        Ok(ChatOpening {
            chat: appended.chat,
            created: true,
            first_message: Some(appended.message),
        })
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> Result<AppendedMessage> {
        self.lock()?.append(chat_id, sender_id, body)
    }

    async fn open_chat(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<OpenOutcome> {
        let mut tables = self.lock()?;
        let chat = tables
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::NotFound("Chat not found".into()))?;
        let viewer: PartyRole = chat.require_role(viewer_id)?;
        chat.reset_unread(viewer);

        let mut marked = 0;
        if let Some(messages) = tables.messages.get_mut(&chat_id) {
            for message in messages
                .iter_mut()
                .filter(|m| m.sender_id != viewer_id && !m.read)
            {
                message.read = true;
                marked += 1;
            }
        }
        Ok(OpenOutcome {
            messages_marked_read: marked,
            read_flags_applied: true,
        })
    }

    async fn chats_for_account(&self, account_id: Uuid) -> Result<Vec<Chat>> {
        let tables = self.lock()?;
        let mut chats: Vec<Chat> = tables
            .chats
            .values()
            .filter(|c| c.role_of(account_id).is_some())
            .cloned()
            .collect();
        chats.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(chats)
    }

    async fn messages_for_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let tables = self.lock()?;
        let mut messages = tables.messages.get(&chat_id).cloned().unwrap_or_default();
        messages.sort_by(Message::display_order);
        Ok(messages)
    }

    async fn unread_total(&self, account_id: Uuid) -> Result<i64> {
        let tables = self.lock()?;
        Ok(tables
            .chats
            .values()
            .filter_map(|c| c.role_of(account_id).map(|role| c.unread_for(role) as i64))
            .sum())
    }
}

#[derive(Clone, Default)]
pub struct MemoryAccountDirectory {
    accounts: Arc<Mutex<HashMap<Uuid, Account>>>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let directory = Self::new();
        if let Ok(mut map) = directory.accounts.lock() {
            map.extend(accounts.into_iter().map(|a| (a.id, a)));
        }
        directory
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Account>>> {
        self.accounts
            .lock()
            .map_err(|_| Error::Internal("account directory mutex poisoned".into()))
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>> {
        Ok(self.lock()?.get(&account_id).cloned())
    }

    async fn find_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Account>> {
        let accounts = self.lock()?;
        Ok(account_ids
            .iter()
            .filter_map(|id| accounts.get(id).cloned())
            .collect())
    }

    async fn set_push_token(&self, account_id: Uuid, token: Option<&str>) -> Result<bool> {
        let mut accounts = self.lock()?;
        match accounts.get_mut(&account_id) {
            Some(account) => {
                account.push_token = token.map(str::to_string);
                account.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        self.lock()?.insert(account.id, account.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewChat {
        NewChat::new(Uuid::new_v4(), Uuid::new_v4(), Some(Uuid::new_v4()), Some("Toby".into()))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_chat_is_not_found() {
        let store = MemoryChatStore::new();
        let body = MessageBody::parse("hi").unwrap();
        let err = store
            .append_message(Uuid::new_v4(), Uuid::new_v4(), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn outsiders_cannot_append() {
        let store = MemoryChatStore::new();
        let opening = store.get_or_create_chat(&request()).await.unwrap();
        let body = MessageBody::parse("hi").unwrap();
        let err = store
            .append_message(opening.chat.id, Uuid::new_v4(), &body)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(store.messages_for_chat(opening.chat.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outage_leaves_state_untouched() {
        let store = MemoryChatStore::new();
        let req = request();
        store.set_unavailable(true);
        let body = MessageBody::parse("hola").unwrap();
        let err = store.create_chat_with_message(&req, &body).await.unwrap_err();
        assert!(err.is_retryable());

        store.set_unavailable(false);
        assert!(store.chats_for_account(req.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timestamps_never_go_backwards() {
        let store = MemoryChatStore::new();
        let opening = store.get_or_create_chat(&request()).await.unwrap();
        let body = MessageBody::parse("x").unwrap();
        for _ in 0..20 {
            store
                .append_message(opening.chat.id, opening.chat.user_id, &body)
                .await
                .unwrap();
        }
        let messages = store.messages_for_chat(opening.chat.id).await.unwrap();
        assert!(messages
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at && w[0].seq < w[1].seq));
    }

    #[tokio::test]
    async fn push_token_requires_known_account() {
        let directory = MemoryAccountDirectory::new();
        assert!(!directory.set_push_token(Uuid::new_v4(), Some("tok")).await.unwrap());

        let account = Account::new(Uuid::new_v4(), "Refugio", true);
        directory.upsert_account(&account).await.unwrap();
        assert!(directory.set_push_token(account.id, Some("tok")).await.unwrap());
        let stored = directory.find_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.push_subscription(), Some("tok"));
    }
}
