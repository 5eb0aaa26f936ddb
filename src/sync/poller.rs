//! Cancellable fixed-cadence poller.
//!
//! One background task per [`Poller`]. Each cycle issues a single fetch,
//! bounded by a request timeout shorter than the interval, and the next cycle
//! is scheduled only after the fetch completes. A failed or timed-out fetch is
//! logged and the last good value is kept.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Prevents a zero interval from turning into a busy loop.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Self::Output>;
}

/// Refresh intervals for the three polled views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingCadence {
    pub chat_list: Duration,
    pub chat: Duration,
    pub unread: Duration,
}

impl Default for PollingCadence {
    fn default() -> Self {
        Self {
            chat_list: Duration::from_secs(30),
            chat: Duration::from_secs(3),
            unread: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerOptions {
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl PollerOptions {
    /// Request timeout defaults to four fifths of the interval.
    pub fn new(interval: Duration) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        Self {
            interval,
            request_timeout: interval * 4 / 5,
        }
    }

    /// Timeouts at or above the interval are pulled back under it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = if timeout >= self.interval {
            self.interval * 4 / 5
        } else {
            timeout
        };
        self
    }

    pub fn chat_list(cadence: &PollingCadence) -> Self {
        Self::new(cadence.chat_list)
    }

    pub fn chat(cadence: &PollingCadence) -> Self {
        Self::new(cadence.chat)
    }

    pub fn unread(cadence: &PollingCadence) -> Self {
        Self::new(cadence.unread)
    }
}

struct Shared<S: PollSource> {
    source: S,
    options: PollerOptions,
    latest: watch::Sender<Option<S::Output>>,
    in_flight: AtomicBool,
}

impl<S: PollSource> Shared<S> {
    /// Runs one fetch unless another is outstanding. Returns whether a fetch
    /// was issued.
    async fn poll_once(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(source = self.source.name(), "poll skipped, request in flight");
            return false;
        }

        match tokio::time::timeout(self.options.request_timeout, self.source.fetch()).await {
            Ok(Ok(value)) => {
                self.latest.send_replace(Some(value));
            }
            Ok(Err(e)) => {
                tracing::warn!(source = self.source.name(), error = %e, "poll failed, keeping last state");
            }
            Err(_) => {
                tracing::warn!(
                    source = self.source.name(),
                    timeout_ms = self.options.request_timeout.as_millis() as u64,
                    "poll timed out, keeping last state"
                );
            }
        }

        self.in_flight.store(false, Ordering::Release);
        true
    }
}

struct Running {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

pub struct Poller<S: PollSource> {
    shared: Arc<Shared<S>>,
    running: Option<Running>,
}

impl<S: PollSource> Poller<S> {
    pub fn new(source: S, options: PollerOptions) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                source,
                options,
                latest,
                in_flight: AtomicBool::new(false),
            }),
            running: None,
        }
    }

    pub fn options(&self) -> PollerOptions {
        self.shared.options
    }

    pub fn source(&self) -> &S {
        &self.shared.source
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<S::Output>> {
        self.shared.latest.subscribe()
    }

    /// Last successfully fetched value.
    pub fn latest(&self) -> Option<S::Output> {
        self.shared.latest.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map_or(false, |r| !r.join.is_finished())
    }

    /// Starts polling immediately. A poller that is already running is
    /// stopped first, so at most one loop exists per poller.
    pub fn start(&mut self) {
        self.stop();

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            tracing::debug!(source = shared.source.name(), "poller started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shared.poll_once() => {}
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(shared.options.interval) => {}
                }
            }
            tracing::debug!(source = shared.source.name(), "poller stopped");
        });

        self.running = Some(Running { cancel, join });
    }

    /// Stops the loop. An outstanding fetch is abandoned and its result
    /// discarded.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.join.abort();
            // An abandoned fetch must not block later manual polls.
            self.shared.in_flight.store(false, Ordering::Release);
        }
    }

    /// Fetches once outside the cadence. Returns false when a request is
    /// already in flight.
    pub async fn poll_now(&self) -> bool {
        self.shared.poll_once().await
    }
}

impl<S: PollSource> Drop for Poller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_stays_below_interval() {
        let options = PollerOptions::new(Duration::from_secs(3));
        assert!(options.request_timeout < options.interval);

        let options = options.with_request_timeout(Duration::from_secs(10));
        assert!(options.request_timeout < options.interval);

        let options = options.with_request_timeout(Duration::from_secs(1));
        assert_eq!(options.request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let options = PollerOptions::new(Duration::ZERO);
        assert_eq!(options.interval, MIN_POLL_INTERVAL);
        assert!(options.request_timeout > Duration::ZERO);
    }
}
