//! Room sessions and watchers.
//!
//! A session is the live outbound handle for one (network, room): its credentials and its
//! [`ActionScheduler`]. Sessions are created lazily and shared by every caller that touches the
//! same room afterwards. A watcher records that the bot has read presence in a Stack room,
//! which is the precondition for opening a session there on demand.

use crate::channels::{Network, RoomTransport};
use crate::scheduler::ActionScheduler;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Key for a session: the network and the room id on that network.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RoomKey {
    pub network: Network,
    pub room_id: String,
}

impl RoomKey {
    pub fn new(network: Network, room_id: impl Into<String>) -> Self {
        Self {
            network,
            room_id: room_id.into(),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.room_id)
    }
}

/// Credentials the bot uses on a host. Debug output never shows the secret.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthHandle {
    pub host: String,
    secret: Option<String>,
}

impl AuthHandle {
    pub fn new(host: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            host: host.into(),
            secret,
        }
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

impl fmt::Debug for AuthHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHandle")
            .field("host", &self.host)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Live outbound session for one room.
pub struct RoomSession {
    pub key: RoomKey,
    pub auth: AuthHandle,
    pub scheduler: Arc<ActionScheduler>,
    last_used: Mutex<Instant>,
}

impl RoomSession {
    pub fn new(key: RoomKey, auth: AuthHandle, scheduler: Arc<ActionScheduler>) -> Self {
        Self {
            key,
            auth,
            scheduler,
            last_used: Mutex::new(Instant::now()),
        }
    }

    /// Mark the session as used now.
    pub async fn touch(&self) {
        *self.last_used.lock().await = Instant::now();
    }

    async fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_used.lock().await)
    }
}

/// Sessions by room key. Lookup-or-create happens under one write lock.
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<RoomKey, Arc<RoomSession>>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Existing session for the room, if any.
    pub async fn get(&self, key: &RoomKey) -> Option<Arc<RoomSession>> {
        let session = self.inner.read().await.get(key).cloned()?;
        session.touch().await;
        Some(session)
    }

    /// Return the session for `key`, creating it with `create` when absent. The flag is true
    /// only for the caller whose `create` ran; concurrent callers all get the same session.
    pub async fn get_or_create_with<F>(&self, key: RoomKey, create: F) -> (Arc<RoomSession>, bool)
    where
        F: FnOnce(&RoomKey) -> RoomSession,
    {
        let mut g = self.inner.write().await;
        let existing = g.get(&key).cloned();
        if let Some(existing) = existing {
            drop(g);
            existing.touch().await;
            return (existing, false);
        }
        let session = Arc::new(create(&key));
        log::info!("opened session for {}", key);
        g.insert(key, session.clone());
        (session, true)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn keys(&self) -> Vec<RoomKey> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Drop sessions unused for at least `max_idle`. Returns the evicted keys.
    /// Keys of sessions unused for at least `max_idle`, without removing them.
    pub async fn idle_keys(&self, max_idle: Duration) -> Vec<RoomKey> {
        let now = Instant::now();
        let g = self.inner.read().await;
        let mut idle = Vec::new();
        for (key, session) in g.iter() {
            if session.idle_for(now).await >= max_idle {
                idle.push(key.clone());
            }
        }
        idle
    }

    /// Remove one session if it is still unused for at least `max_idle`.
    pub async fn remove_if_idle(&self, key: &RoomKey, max_idle: Duration) -> bool {
        let now = Instant::now();
        let mut g = self.inner.write().await;
        let idle = match g.get(key) {
            Some(session) => session.idle_for(now).await >= max_idle,
            None => false,
        };
        if idle {
            g.remove(key);
            log::info!("evicted idle session for {}", key);
        }
        idle
    }

    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<RoomKey> {
        let now = Instant::now();
        let mut g = self.inner.write().await;
        let mut evicted = Vec::new();
        for (key, session) in g.iter() {
            if session.idle_for(now).await >= max_idle {
                evicted.push(key.clone());
            }
        }
        for key in &evicted {
            g.remove(key);
            log::info!("evicted idle session for {}", key);
        }
        evicted
    }
}

/// Read presence in a Stack room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watcher {
    pub room_id: String,
    pub auth: AuthHandle,
}

/// Watchers by Stack room id.
pub struct WatcherRegistry {
    inner: RwLock<HashMap<String, Watcher>>,
}

impl Default for WatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Record a watcher. Returns false when the room was already watched (the old one is kept).
    pub async fn watch(&self, watcher: Watcher) -> bool {
        let mut g = self.inner.write().await;
        if g.contains_key(&watcher.room_id) {
            return false;
        }
        log::info!("watching room {} on {}", watcher.room_id, watcher.auth.host);
        g.insert(watcher.room_id.clone(), watcher);
        true
    }

    pub async fn unwatch(&self, room_id: &str) -> Option<Watcher> {
        self.inner.write().await.remove(room_id)
    }

    pub async fn get(&self, room_id: &str) -> Option<Watcher> {
        self.inner.read().await.get(room_id).cloned()
    }

    pub async fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.inner.read().await.keys().cloned().collect();
        rooms.sort();
        rooms
    }
}

/// Builds the scheduler for a newly opened Stack room session.
pub trait SchedulerFactory: Send + Sync {
    fn open(&self, watcher: &Watcher) -> Arc<ActionScheduler>;
}

/// Opens schedulers on one shared transport, all with the same pacing.
pub struct TransportSchedulerFactory {
    transport: Arc<dyn RoomTransport>,
    min_interval: Duration,
}

impl TransportSchedulerFactory {
    pub fn new(transport: Arc<dyn RoomTransport>, min_interval: Duration) -> Self {
        Self {
            transport,
            min_interval,
        }
    }
}

impl SchedulerFactory for TransportSchedulerFactory {
    fn open(&self, watcher: &Watcher) -> Arc<ActionScheduler> {
        Arc::new(
            ActionScheduler::new(watcher.room_id.clone(), self.transport.clone())
                .with_min_interval(self.min_interval),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::testing::RecordingTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session_for(key: &RoomKey) -> RoomSession {
        let transport = Arc::new(RecordingTransport::new(key.network));
        RoomSession::new(
            key.clone(),
            AuthHandle::default(),
            Arc::new(ActionScheduler::new(key.room_id.clone(), transport)),
        )
    }

    #[tokio::test]
    async fn concurrent_first_touch_creates_one_session() {
        let registry = Arc::new(SessionRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));
        let key = RoomKey::new(Network::StackExchange, "42");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let created = created.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_create_with(key, |k| {
                        created.fetch_add(1, Ordering::SeqCst);
                        session_for(k)
                    })
                    .await
                    .0
            }));
        }
        let mut sessions = Vec::new();
        for h in handles {
            sessions.push(h.await.unwrap());
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
        for s in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], s));
            assert!(Arc::ptr_eq(&sessions[0].scheduler, &s.scheduler));
        }
    }

    #[tokio::test]
    async fn networks_do_not_share_sessions() {
        let registry = SessionRegistry::new();
        let (_, a) = registry
            .get_or_create_with(RoomKey::new(Network::StackExchange, "1"), session_for)
            .await;
        let (_, b) = registry
            .get_or_create_with(RoomKey::new(Network::Discord, "1"), session_for)
            .await;
        assert!(a && b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted() {
        let registry = SessionRegistry::new();
        let stale = RoomKey::new(Network::StackExchange, "1");
        let fresh = RoomKey::new(Network::StackExchange, "2");
        registry.get_or_create_with(stale.clone(), session_for).await;
        registry.get_or_create_with(fresh.clone(), session_for).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(registry.get(&fresh).await.is_some());

        let evicted = registry.evict_idle(Duration::from_secs(30)).await;
        assert_eq!(evicted, vec![stale.clone()]);
        assert!(registry.get(&stale).await.is_none());
        assert!(registry.get(&fresh).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn touched_session_survives_removal() {
        let registry = SessionRegistry::new();
        let key = RoomKey::new(Network::StackExchange, "1");
        let (session, _) = registry.get_or_create_with(key.clone(), session_for).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(registry.idle_keys(Duration::from_secs(30)).await, vec![key.clone()]);
        session.touch().await;
        assert!(!registry.remove_if_idle(&key, Duration::from_secs(30)).await);
        assert_eq!(registry.len().await, 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(registry.remove_if_idle(&key, Duration::from_secs(30)).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn first_watcher_is_kept() {
        let watchers = WatcherRegistry::new();
        let a = Watcher {
            room_id: "9".into(),
            auth: AuthHandle::new("chat.stackoverflow.com", None),
        };
        let b = Watcher {
            room_id: "9".into(),
            auth: AuthHandle::new("chat.meta.stackexchange.com", None),
        };
        assert!(watchers.watch(a.clone()).await);
        assert!(!watchers.watch(b).await);
        assert_eq!(watchers.get("9").await, Some(a));
        assert_eq!(watchers.rooms().await, vec!["9".to_string()]);
    }

    #[test]
    fn auth_debug_hides_secret() {
        let auth = AuthHandle::new("chat.stackoverflow.com", Some("cookie=abc".into()));
        let shown = format!("{:?}", auth);
        assert!(!shown.contains("abc"));
        assert_eq!(auth.secret(), Some("cookie=abc"));
    }
}
