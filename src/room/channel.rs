use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::RoomBackend;
use crate::common::{Message, MessageDraft};
use crate::error::{ChatError, ChatResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Shared handle to one room. Cloning is cheap; all clones see the same
/// connection state and backend.
#[derive(Clone)]
pub struct RoomChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    backend: Arc<dyn RoomBackend>,
    state: watch::Sender<ConnectionState>,
    poll_interval: Duration,
}

impl RoomChannel {
    pub fn new(backend: Arc<dyn RoomBackend>) -> Self {
        Self::with_poll_interval(backend, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(backend: Arc<dyn RoomBackend>, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                backend,
                state,
                poll_interval,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Sign in anonymously and go live. Returns the participant id issued by
    /// the backend; on failure the channel falls back to `Disconnected`.
    pub async fn connect(&self) -> ChatResult<String> {
        self.set_state(ConnectionState::Connecting);
        match self.inner.backend.sign_in_anonymously().await {
            Ok(uid) => {
                self.set_state(ConnectionState::Connected);
                log::info!("Room channel connected as {uid}");
                Ok(uid)
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                log::error!("Room channel failed to connect: {err}");
                Err(err)
            }
        }
    }

    /// Drop the live connection (auth loss). Subscribers stay registered and
    /// get a full snapshot again once reconnected.
    pub fn disconnect(&self) {
        if self.set_state(ConnectionState::Disconnected) != ConnectionState::Disconnected {
            log::warn!("Room channel disconnected");
        }
    }

    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        self.inner.state.send_replace(next)
    }

    fn ensure_connected(&self) -> ChatResult<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            _ => Err(ChatError::ChannelUnavailable),
        }
    }

    pub async fn append(&self, draft: &MessageDraft) -> ChatResult<Message> {
        self.ensure_connected()?;
        let message = self.inner.backend.insert(draft).await?;
        log::debug!("Appended message {} from {}", message.id, message.author_id);
        Ok(message)
    }

    /// One-shot read of the full ordered log.
    pub async fn snapshot(&self) -> ChatResult<Vec<Message>> {
        self.ensure_connected()?;
        self.inner.backend.list_ordered().await
    }

    /// Delete every message currently in the room and return how many went.
    ///
    /// Not transactional: appends racing with the clear may or may not survive.
    pub async fn clear_all(&self) -> ChatResult<usize> {
        self.ensure_connected()?;
        let ids = self.inner.backend.list_ids().await?;
        let backend = &self.inner.backend;
        let results = join_all(ids.iter().map(|id| backend.delete(id))).await;

        let mut deleted = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(err) => {
                    log::warn!("Failed to delete message during clear: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                log::info!("Cleared {deleted} messages");
                Ok(deleted)
            }
        }
    }

    /// Stream full ordered snapshots of the room into `on_update`.
    ///
    /// Each call receives the whole log, never a delta. Backend failures go to
    /// `on_error` and the subscription keeps running. Must be called from
    /// inside a tokio runtime.
    pub fn subscribe<U, E>(&self, on_update: U, on_error: E) -> Subscription
    where
        U: FnMut(Vec<Message>) + Send + 'static,
        E: FnMut(ChatError) + Send + 'static,
    {
        let token = CancellationToken::new();
        let pump = SnapshotPump {
            backend: self.inner.backend.clone(),
            state: self.watch_state(),
            changes: Some(self.inner.backend.changes()),
            poll_interval: self.inner.poll_interval,
            last_delivered: None,
            on_update,
            on_error,
        };
        tokio::spawn(pump.run(token.clone()));
        Subscription { token }
    }
}

/// Live subscription handle. Cancelling is idempotent and dropping cancels.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

enum Wake {
    Cancelled,
    StateChanged,
    RoomChanged,
    Poll,
}

struct SnapshotPump<U, E> {
    backend: Arc<dyn RoomBackend>,
    state: watch::Receiver<ConnectionState>,
    changes: Option<broadcast::Receiver<()>>,
    poll_interval: Duration,
    last_delivered: Option<Vec<Message>>,
    on_update: U,
    on_error: E,
}

impl<U, E> SnapshotPump<U, E>
where
    U: FnMut(Vec<Message>) + Send + 'static,
    E: FnMut(ChatError) + Send + 'static,
{
    async fn run(mut self, token: CancellationToken) {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut needs_full = true;

        loop {
            let connected = *self.state.borrow_and_update() == ConnectionState::Connected;
            if !connected {
                needs_full = true;
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = self.state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            if needs_full {
                needs_full = !self.deliver(true).await;
            }

            let wake = tokio::select! {
                biased;
                _ = token.cancelled() => Wake::Cancelled,
                changed = self.state.changed() => {
                    if changed.is_err() { Wake::Cancelled } else { Wake::StateChanged }
                }
                true = next_change(&mut self.changes) => Wake::RoomChanged,
                _ = poll.tick() => Wake::Poll,
            };

            match wake {
                Wake::Cancelled => break,
                Wake::StateChanged => needs_full = true,
                Wake::RoomChanged | Wake::Poll => {
                    if needs_full {
                        continue;
                    }
                    self.deliver(false).await;
                }
            }
        }

        log::debug!("Room subscription closed");
    }

    /// Fetch the log and hand it over. Unforced deliveries are skipped when
    /// nothing changed since the last one. Returns false if the fetch failed.
    async fn deliver(&mut self, force: bool) -> bool {
        match self.backend.list_ordered().await {
            Ok(snapshot) => {
                if force || self.last_delivered.as_ref() != Some(&snapshot) {
                    self.last_delivered = Some(snapshot.clone());
                    (self.on_update)(snapshot);
                }
                true
            }
            Err(err) => {
                log::warn!("Room snapshot failed: {err}");
                (self.on_error)(err);
                false
            }
        }
    }
}

/// Resolves true on a change notice. A closed channel resolves false once and
/// then never again, leaving polling as the only source of updates.
async fn next_change(changes: &mut Option<broadcast::Receiver<()>>) -> bool {
    let Some(receiver) = changes.as_mut() else {
        return std::future::pending().await;
    };
    let result = receiver.recv().await;
    match result {
        Ok(()) | Err(RecvError::Lagged(_)) => true,
        Err(RecvError::Closed) => {
            *changes = None;
            false
        }
    }
}
