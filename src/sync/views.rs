//! Screen-level synchronizers built on [`Poller`].
//!
//! The server's counters are authoritative. Everything here only shapes what
//! a client renders between polls.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use super::client::ChatApi;
use super::poller::{PollSource, Poller, PollerOptions};
use crate::dto::chat_dto::{ChatSummary, MessageResponse};
use crate::error::{Error, Result};

pub struct ChatListSource {
    api: Arc<dyn ChatApi>,
}

#[async_trait]
impl PollSource for ChatListSource {
    type Output = Vec<ChatSummary>;

    fn name(&self) -> &'static str {
        "chat_list"
    }

    async fn fetch(&self) -> Result<Self::Output> {
        self.api.list_chats().await
    }
}

/// Slow-cadence chat list.
pub struct ChatListView {
    poller: Poller<ChatListSource>,
}

impl ChatListView {
    pub fn new(api: Arc<dyn ChatApi>, options: PollerOptions) -> Self {
        Self {
            poller: Poller::new(ChatListSource { api }, options),
        }
    }

    pub fn start(&mut self) {
        self.poller.start();
    }

    pub fn stop(&mut self) {
        self.poller.stop();
    }

    pub async fn refresh(&self) -> bool {
        self.poller.poll_now().await
    }

    pub fn chats(&self) -> Option<Vec<ChatSummary>> {
        self.poller.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Vec<ChatSummary>>> {
        self.poller.subscribe()
    }
}

/// Rendered message order. Messages already shown keep their position; read
/// flags only move from false to true; new arrivals are appended in
/// `(created_at, seq)` order.
#[derive(Debug, Default, Clone)]
pub struct MessageTimeline {
    messages: Vec<MessageResponse>,
    seen: HashSet<Uuid>,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[MessageResponse] {
        &self.messages
    }

    pub fn apply(&mut self, fetched: Vec<MessageResponse>) -> &[MessageResponse] {
        let mut fresh = Vec::new();
        for message in fetched {
            if self.seen.contains(&message.id) {
                if message.read {
                    if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
                        existing.read = true;
                    }
                }
            } else {
                fresh.push(message);
            }
        }

        fresh.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.seq.cmp(&b.seq)));
        for message in fresh {
            self.seen.insert(message.id);
            self.messages.push(message);
        }
        &self.messages
    }
}

pub struct MessageListSource {
    api: Arc<dyn ChatApi>,
    chat_id: Uuid,
    viewer_id: Uuid,
    timeline: Mutex<MessageTimeline>,
}

impl MessageListSource {
    fn has_unread_incoming(&self, messages: &[MessageResponse]) -> bool {
        messages
            .iter()
            .any(|m| m.sender_id != self.viewer_id && !m.read)
    }
}

#[async_trait]
impl PollSource for MessageListSource {
    type Output = Vec<MessageResponse>;

    fn name(&self) -> &'static str {
        "chat_messages"
    }

    async fn fetch(&self) -> Result<Self::Output> {
        let fetched = self.api.list_messages(self.chat_id).await?;

        // The chat is on screen, so anything new from the counterpart is read.
        if self.has_unread_incoming(&fetched) {
            if let Err(e) = self.api.open_chat(self.chat_id).await {
                tracing::warn!(chat_id = %self.chat_id, error = %e, "re-opening chat failed");
            }
        }

        let mut timeline = self
            .timeline
            .lock()
            .map_err(|_| Error::Internal("message timeline mutex poisoned".into()))?;
        Ok(timeline.apply(fetched).to_vec())
    }
}

/// Fast-cadence poller for the chat on screen. Owns at most one poller;
/// opening another chat cancels the current one first.
pub struct ChatDetailView {
    api: Arc<dyn ChatApi>,
    viewer_id: Uuid,
    options: PollerOptions,
    current: Option<(Uuid, Poller<MessageListSource>)>,
}

impl ChatDetailView {
    pub fn new(api: Arc<dyn ChatApi>, viewer_id: Uuid, options: PollerOptions) -> Self {
        Self {
            api,
            viewer_id,
            options,
            current: None,
        }
    }

    pub fn chat_id(&self) -> Option<Uuid> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    pub fn is_polling(&self) -> bool {
        self.current.as_ref().map_or(false, |(_, p)| p.is_running())
    }

    /// Marks the chat opened on the server, then starts polling its
    /// messages. A failed open is logged; polling starts regardless.
    pub async fn open(&mut self, chat_id: Uuid) -> watch::Receiver<Option<Vec<MessageResponse>>> {
        self.close();

        if let Err(e) = self.api.open_chat(chat_id).await {
            tracing::warn!(chat_id = %chat_id, error = %e, "opening chat failed");
        }

        let source = MessageListSource {
            api: Arc::clone(&self.api),
            chat_id,
            viewer_id: self.viewer_id,
            timeline: Mutex::new(MessageTimeline::new()),
        };
        let mut poller = Poller::new(source, self.options);
        poller.start();
        let rx = poller.subscribe();
        self.current = Some((chat_id, poller));
        rx
    }

    pub fn close(&mut self) {
        if let Some((chat_id, mut poller)) = self.current.take() {
            poller.stop();
            tracing::debug!(chat_id = %chat_id, "chat view closed");
        }
    }

    pub fn messages(&self) -> Option<Vec<MessageResponse>> {
        self.current.as_ref().and_then(|(_, p)| p.latest())
    }

    /// Sends and immediately re-polls so the new message shows without
    /// waiting for the next tick.
    pub async fn send(&self, content: &str) -> Result<MessageResponse> {
        let (chat_id, poller) = self
            .current
            .as_ref()
            .ok_or_else(|| Error::BadRequest("No chat is open".into()))?;
        let sent = self.api.send_message(*chat_id, content).await?;
        poller.poll_now().await;
        Ok(sent)
    }
}

/// True when the aggregate unread count rose since the previous observation.
/// The first observation only establishes a baseline.
pub fn is_new_activity(previous: Option<i64>, current: i64) -> bool {
    matches!(previous, Some(p) if current > p)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewActivity {
    pub previous: i64,
    pub current: i64,
}

pub struct UnreadCountSource {
    api: Arc<dyn ChatApi>,
    last: Mutex<Option<i64>>,
    signal: broadcast::Sender<NewActivity>,
}

#[async_trait]
impl PollSource for UnreadCountSource {
    type Output = i64;

    fn name(&self) -> &'static str {
        "unread_badge"
    }

    async fn fetch(&self) -> Result<i64> {
        let current = self.api.unread_count().await?.max(0);
        let mut last = self
            .last
            .lock()
            .map_err(|_| Error::Internal("unread badge mutex poisoned".into()))?;
        if let Some(previous) = *last {
            if is_new_activity(Some(previous), current) {
                // No subscribers is fine.
                let _ = self.signal.send(NewActivity { previous, current });
            }
        }
        *last = Some(current);
        Ok(current)
    }
}

/// Aggregate unread badge with a "new messages" signal.
pub struct UnreadBadge {
    poller: Poller<UnreadCountSource>,
}

impl UnreadBadge {
    pub fn new(api: Arc<dyn ChatApi>, options: PollerOptions) -> Self {
        let (signal, _) = broadcast::channel(16);
        Self {
            poller: Poller::new(
                UnreadCountSource {
                    api,
                    last: Mutex::new(None),
                    signal,
                },
                options,
            ),
        }
    }

    pub fn start(&mut self) {
        self.poller.start();
    }

    pub fn stop(&mut self) {
        self.poller.stop();
    }

    pub async fn refresh(&self) -> bool {
        self.poller.poll_now().await
    }

    pub fn count(&self) -> i64 {
        self.poller.latest().unwrap_or(0)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<i64>> {
        self.poller.subscribe()
    }

    pub fn new_activity(&self) -> broadcast::Receiver<NewActivity> {
        self.poller.source().signal.subscribe()
    }
}
