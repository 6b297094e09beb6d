//! In-memory registry partitioning chat state by session key.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::store::ChatSession;
use super::traits::SessionError;

pub const DEFAULT_MAX_SESSIONS: usize = 1000;
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(3600);

/// One session's state plus the token that cancels its in-flight model call.
pub struct SessionHandle {
    pub state: tokio::sync::Mutex<ChatSession>,
    pub cancel: CancellationToken,
    last_active: Mutex<Instant>,
}

impl SessionHandle {
    fn new(session: ChatSession, now: Instant) -> Self {
        Self {
            state: tokio::sync::Mutex::new(session),
            cancel: CancellationToken::new(),
            last_active: Mutex::new(now),
        }
    }

    fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    /// Time since the session was created or last looked up.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_active.lock())
    }

    /// A session running a turn holds its state lock and is never idle.
    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        self.idle_for(now) > ttl && self.state.try_lock().is_ok()
    }
}

/// Session registry backed by a mutex-protected hash map.
///
/// The map lock is only held to look up or insert handles. Each session is
/// serialized by its own async mutex, so one user's model call never blocks
/// another session. The map is bounded by `max_sessions`; sessions idle for
/// longer than `idle_ttl` are evicted.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE)
    }

    pub fn with_limits(max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            idle_ttl,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Create a fresh session and return its id and handle.
    ///
    /// Idle sessions are evicted first. Fails when the registry is still full.
    pub fn create(&self) -> Result<(String, Arc<SessionHandle>), SessionError> {
        let now = Instant::now();
        let session = ChatSession::new();
        let id = session.session_id().to_string();
        let handle = Arc::new(SessionHandle::new(session, now));

        let mut sessions = self.sessions.lock();
        let evicted = Self::take_idle(&mut sessions, now, self.idle_ttl);
        let full = sessions.len() >= self.max_sessions;
        if !full {
            sessions.insert(id.clone(), Arc::clone(&handle));
        }
        drop(sessions);

        Self::close_all(evicted, "Session evicted after idling");
        if full {
            tracing::warn!(max = self.max_sessions, "Session registry full");
            return Err(SessionError::RegistryFull {
                max: self.max_sessions,
            });
        }

        tracing::info!(session = %id, "Session created");
        Ok((id, handle))
    }

    /// Look up a session and mark it active.
    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.lock().get(id).cloned()?;
        handle.touch();
        Some(handle)
    }

    /// Remove a session and cancel any model call it has in flight.
    pub fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(id);
        drop(sessions);

        match removed {
            Some(handle) => {
                handle.cancel.cancel();
                tracing::info!(session = %id, "Session closed");
                true
            }
            None => false,
        }
    }

    /// Drop every session idle for longer than the TTL as of `now`.
    ///
    /// Returns how many were evicted.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock();
        let evicted = Self::take_idle(&mut sessions, now, self.idle_ttl);
        drop(sessions);

        let count = evicted.len();
        Self::close_all(evicted, "Session evicted after idling");
        count
    }

    fn take_idle(
        sessions: &mut HashMap<String, Arc<SessionHandle>>,
        now: Instant,
        ttl: Duration,
    ) -> Vec<(String, Arc<SessionHandle>)> {
        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| handle.is_idle(now, ttl))
            .map(|(id, _)| id.clone())
            .collect();
        idle.into_iter()
            .filter_map(|id| sessions.remove(&id).map(|handle| (id, handle)))
            .collect()
    }

    fn close_all(handles: Vec<(String, Arc<SessionHandle>)>, reason: &str) {
        for (id, handle) in handles {
            handle.cancel.cancel();
            tracing::info!(session = %id, "{reason}");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
