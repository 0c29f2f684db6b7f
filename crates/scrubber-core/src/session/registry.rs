//! Session registry with idle expiry.
//!
//! All registry state sits behind one mutex that is only held for map
//! lookups and updates, never across file I/O or an `.await`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::{is_valid_token, Session};

struct SessionEntry {
    session: Arc<Session>,
    last_access: Instant,
}

/// Tracks live sessions by token.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        // A panic elsewhere must not wedge every later batch.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the session for `token`, creating it if unknown.
    ///
    /// A missing or malformed token gets a fresh random token. An unknown
    /// but well-formed token starts a fresh session under that token.
    /// Either way the session's last-access time is refreshed.
    pub fn get_or_create(&self, token: Option<&str>) -> Arc<Session> {
        let token = match token {
            Some(t) if is_valid_token(t) => t.to_string(),
            Some(t) => {
                tracing::warn!(token = %t, "Rejected malformed session token, issuing a new one");
                Uuid::new_v4().to_string()
            }
            None => Uuid::new_v4().to_string(),
        };

        let now = Instant::now();
        let mut sessions = self.lock();
        let entry = sessions.entry(token).or_insert_with_key(|token| {
            tracing::debug!(session = %token, "Created session");
            SessionEntry {
                session: Arc::new(Session::new(token.clone())),
                last_access: now,
            }
        });
        entry.last_access = now;
        entry.session.clone()
    }

    /// Return the session for a well-formed `token` whose earlier outputs
    /// went up to `last_sequence`.
    ///
    /// A new session starts numbering after `last_sequence`; a live one is
    /// moved past it if needed. Malformed tokens fall back to
    /// [`get_or_create`](Self::get_or_create).
    pub fn resume(&self, token: &str, last_sequence: u64) -> Arc<Session> {
        if !is_valid_token(token) {
            return self.get_or_create(Some(token));
        }

        let now = Instant::now();
        let mut sessions = self.lock();
        match sessions.entry(token.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_access = now;
                entry.session.advance_past(last_sequence);
                entry.session.clone()
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(session = %token, last_sequence, "Resumed session");
                let session = Arc::new(Session::resumed(token, last_sequence));
                vacant.insert(SessionEntry {
                    session: session.clone(),
                    last_access: now,
                });
                session
            }
        }
    }

    /// Look up a session without refreshing its last-access time.
    pub fn get(&self, token: &str) -> Option<Arc<Session>> {
        self.lock().get(token).map(|e| e.session.clone())
    }

    /// Refresh a session's last-access time. Returns `false` if unknown.
    pub fn touch(&self, token: &str) -> bool {
        match self.lock().get_mut(token) {
            Some(entry) => {
                entry.last_access = Instant::now();
                true
            }
            None => false,
        }
    }

    /// When the session was last accessed.
    pub fn last_access(&self, token: &str) -> Option<Instant> {
        self.lock().get(token).map(|e| e.last_access)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lock().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every session idle for longer than `ttl`.
    ///
    /// Returns the number of sessions removed.
    pub fn expire_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.lock().retain(|token, entry| {
            let idle = now.saturating_duration_since(entry.last_access);
            if idle > ttl {
                tracing::debug!(
                    session = %token,
                    idle_secs = idle.as_secs(),
                    "Expired idle session"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            tracing::info!(removed, "Swept idle sessions");
        }
        removed
    }

    /// Run [`expire_idle`](Self::expire_idle) every `interval` in the background.
    ///
    /// The task holds only a weak reference and exits once the registry is
    /// dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        ttl: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    tracing::debug!("Session registry dropped, stopping sweeper");
                    break;
                };
                registry.expire_idle(ttl);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_new_token() {
        let registry = SessionRegistry::new();
        let session = registry.get_or_create(None);
        assert!(!session.token().is_empty());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(session.token()));
    }

    #[test]
    fn test_get_or_create_returns_same_session() {
        let registry = SessionRegistry::new();
        let first = registry.get_or_create(Some("client-a"));
        first.next_sequence();

        let second = registry.get_or_create(Some("client-a"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.last_sequence(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_token_starts_fresh_session() {
        let registry = SessionRegistry::new();
        let session = registry.get_or_create(Some("returning-client"));
        assert_eq!(session.token(), "returning-client");
        assert_eq!(session.last_sequence(), 0);
    }

    #[test]
    fn test_malformed_token_is_replaced() {
        let registry = SessionRegistry::new();
        let session = registry.get_or_create(Some("../../etc"));
        assert_ne!(session.token(), "../../etc");
        assert!(is_valid_token(session.token()));
    }

    #[test]
    fn test_expire_idle_removes_stale_sessions() {
        let registry = SessionRegistry::new();
        registry.get_or_create(Some("stale"));
        std::thread::sleep(Duration::from_millis(60));
        registry.get_or_create(Some("fresh"));

        let removed = registry.expire_idle(Duration::from_millis(40));
        assert_eq!(removed, 1);
        assert!(!registry.contains("stale"));
        assert!(registry.contains("fresh"));
    }

    #[test]
    fn test_access_within_ttl_survives_sweep() {
        let registry = SessionRegistry::new();
        registry.get_or_create(Some("active"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(registry.touch("active"));

        assert_eq!(registry.expire_idle(Duration::from_millis(40)), 0);
        assert!(registry.contains("active"));
    }

    #[test]
    fn test_touch_unknown() {
        let registry = SessionRegistry::new();
        assert!(!registry.touch("nobody"));
        assert!(registry.last_access("nobody").is_none());
    }

    #[test]
    fn test_get_does_not_refresh() {
        let registry = SessionRegistry::new();
        registry.get_or_create(Some("idle"));
        let before = registry.last_access("idle").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(registry.get("idle").is_some());
        assert_eq!(registry.last_access("idle").unwrap(), before);
    }

    #[test]
    fn test_expired_session_keeps_in_flight_handle_alive() {
        let registry = SessionRegistry::new();
        let held = registry.get_or_create(Some("busy"));
        std::thread::sleep(Duration::from_millis(30));
        registry.expire_idle(Duration::from_millis(10));

        assert!(!registry.contains("busy"));
        assert_eq!(held.next_sequence(), 1);

        // The next request under the same token starts over
        let fresh = registry.get_or_create(Some("busy"));
        assert!(!Arc::ptr_eq(&held, &fresh));
        assert_eq!(fresh.last_sequence(), 0);
    }

    #[test]
    fn test_resume_seeds_new_session() {
        let registry = SessionRegistry::new();
        let session = registry.resume("returning", 12);
        assert_eq!(session.token(), "returning");
        assert_eq!(session.next_sequence(), 13);
    }

    #[test]
    fn test_resume_advances_live_session() {
        let registry = SessionRegistry::new();
        let live = registry.get_or_create(Some("live"));
        live.next_sequence();

        let resumed = registry.resume("live", 5);
        assert!(Arc::ptr_eq(&live, &resumed));
        assert_eq!(resumed.next_sequence(), 6);

        // A lower floor leaves the counter alone
        registry.resume("live", 2);
        assert_eq!(live.next_sequence(), 7);
    }

    #[test]
    fn test_resume_rejects_malformed_token() {
        let registry = SessionRegistry::new();
        let session = registry.resume("../x", 4);
        assert_ne!(session.token(), "../x");
        assert_eq!(session.last_sequence(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_expires_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        registry.get_or_create(Some("short-lived"));

        let handle =
            registry.spawn_sweeper(Duration::from_millis(20), Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(registry.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_registry_dropped() {
        let registry = Arc::new(SessionRegistry::new());
        let handle = registry.spawn_sweeper(Duration::from_millis(10), Duration::from_secs(60));
        drop(registry);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper should exit")
            .unwrap();
    }
}
