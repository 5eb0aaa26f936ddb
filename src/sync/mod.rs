//! Client-side polling synchronizer.
//!
//! There is no push channel to clients: a chat list, an open chat and an
//! unread badge each keep themselves current by polling the HTTP API.

pub mod client;
pub mod poller;
pub mod views;

pub use client::{ChatApi, ChatApiClient};
pub use poller::{PollSource, Poller, PollerOptions, PollingCadence};
pub use views::{ChatDetailView, ChatListView, MessageTimeline, NewActivity, UnreadBadge};
