//! Latest-value streams over the session's push notifications.

use std::{
    collections::HashMap,
    future,
    sync::{Arc, Mutex, PoisonError},
};

use futures::{stream::BoxStream, StreamExt};
use shared::domain::{GroupSummary, Pusher, RoomSummary, SyncState, User, UserId};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    RoomSummaries(Vec<RoomSummary>),
    GroupSummaries(Vec<GroupSummary>),
    SyncState(SyncState),
    Pushers(Vec<Pusher>),
    User(User),
}

/// Push side of the SDK session.
pub trait SessionSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<SessionUpdate>;
}

/// Session that never pushes anything; every live stream stays silent.
pub struct MissingSessionSource;

impl SessionSource for MissingSessionSource {
    fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        broadcast::channel(1).1
    }
}

struct LatestValues {
    rooms: watch::Sender<Option<Vec<RoomSummary>>>,
    groups: watch::Sender<Option<Vec<GroupSummary>>>,
    sync_state: watch::Sender<Option<SyncState>>,
    pushers: watch::Sender<Option<Vec<Pusher>>>,
    users: Mutex<HashMap<UserId, watch::Sender<User>>>,
}

impl LatestValues {
    fn new() -> Self {
        Self {
            rooms: watch::channel(None).0,
            groups: watch::channel(None).0,
            sync_state: watch::channel(None).0,
            pushers: watch::channel(None).0,
            users: Mutex::new(HashMap::new()),
        }
    }

    fn user_sender(&self, user_id: &UserId) -> watch::Sender<User> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users
            .entry(user_id.clone())
            .or_insert_with(|| watch::channel(User::placeholder(user_id.clone())).0)
            .clone()
    }

    fn apply(&self, update: SessionUpdate) {
        match update {
            SessionUpdate::RoomSummaries(rooms) => {
                self.rooms.send_replace(Some(rooms));
            }
            SessionUpdate::GroupSummaries(groups) => {
                self.groups.send_replace(Some(groups));
            }
            SessionUpdate::SyncState(state) => {
                self.sync_state.send_replace(Some(state));
            }
            SessionUpdate::Pushers(pushers) => {
                self.pushers.send_replace(Some(pushers));
            }
            SessionUpdate::User(user) => {
                self.user_sender(&user.user_id).send_replace(user);
            }
        }
    }
}

/// Subscribers get the most recent value first and every later one; nothing older.
pub struct ReactiveSession {
    values: Arc<LatestValues>,
    pump: JoinHandle<()>,
}

impl ReactiveSession {
    pub fn spawn(source: &dyn SessionSource) -> Self {
        let values = Arc::new(LatestValues::new());
        let mut updates = source.subscribe();
        let sink = Arc::clone(&values);
        let pump = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => sink.apply(update),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: lagging behind source, older values skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("session: source closed, keeping last values");
                        break;
                    }
                }
            }
        });
        Self { values, pump }
    }

    pub fn live_room_summaries(&self) -> BoxStream<'static, Vec<RoomSummary>> {
        latest(self.values.rooms.subscribe())
    }

    pub fn live_group_summaries(&self) -> BoxStream<'static, Vec<GroupSummary>> {
        latest(self.values.groups.subscribe())
    }

    pub fn live_sync_state(&self) -> BoxStream<'static, SyncState> {
        latest(self.values.sync_state.subscribe())
    }

    pub fn live_pushers(&self) -> BoxStream<'static, Vec<Pusher>> {
        latest(self.values.pushers.subscribe())
    }

    /// Starts with [`User::placeholder`] until the session reports the user.
    pub fn observe_user(&self, user_id: &UserId) -> BoxStream<'static, User> {
        WatchStream::new(self.values.user_sender(user_id).subscribe()).boxed()
    }
}

impl Drop for ReactiveSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn latest<T>(rx: watch::Receiver<Option<T>>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    WatchStream::new(rx).filter_map(future::ready).boxed()
}

#[cfg(test)]
#[path = "tests/session_facade_tests.rs"]
mod tests;
