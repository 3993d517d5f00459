//! Session-scoped view preference storage
//!
//! The view preference is a tri-state value stored per client session. Only
//! the negotiator and the explicit override endpoints write it.
//!
//! # Storage Options
//!
//! - [`InMemorySessionStore`]: process-local store with idle expiry
//! - Anything else (Redis, database) implements [`SessionStore`]
//!
//! Concurrent requests within one session may race; last write wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MobileViewError, Result};

// ============================================================================
// View Preference
// ============================================================================

/// Sticky per-session view choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewPreference {
    /// No choice recorded yet
    #[default]
    Unset,
    /// Mobile view chosen (explicitly or by first detection)
    MobileView,
    /// Standard view chosen explicitly
    StandardView,
}

impl ViewPreference {
    /// Whether a choice has been recorded
    pub fn is_set(&self) -> bool {
        !matches!(self, ViewPreference::Unset)
    }

    /// Name used in logs and JSON bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewPreference::Unset => "unset",
            ViewPreference::MobileView => "mobile_view",
            ViewPreference::StandardView => "standard_view",
        }
    }
}

impl fmt::Display for ViewPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session Id
// ============================================================================

/// Opaque client session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Generate a new random session id
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Wrap an existing id, rejecting blank values
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        if id.is_empty() {
            None
        } else {
            Some(Self(Arc::from(id)))
        }
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Key-value store for view preferences, scoped per session
///
/// Implementations must provide at least request-local atomicity for a
/// single `get` followed by a `set` on the same key.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Current preference; [`ViewPreference::Unset`] when nothing is stored
    async fn get(&self, session: &SessionId) -> Result<ViewPreference>;

    /// Store a preference. Storing `Unset` is equivalent to [`clear`](Self::clear).
    async fn set(&self, session: &SessionId, preference: ViewPreference) -> Result<()>;

    /// Forget the stored preference
    async fn clear(&self, session: &SessionId) -> Result<()>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// How often the background task sweeps expired sessions at most
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    preference: ViewPreference,
    last_access: Instant,
}

struct Sessions {
    entries: HashMap<SessionId, SessionEntry>,
    last_sweep: Instant,
}

/// In-memory session store
///
/// Suitable for single-instance deployments. Entries idle for longer than
/// the TTL are treated as gone. They are removed by
/// [`cleanup_expired`](Self::cleanup_expired), by the task from
/// [`start_cleanup_task`](Self::start_cleanup_task), and by a sweep on
/// [`set`](SessionStore::set) once per TTL period, so the map stays bounded
/// even without the background task.
pub struct InMemorySessionStore {
    sessions: RwLock<Sessions>,
    ttl: Option<Duration>,
}

impl InMemorySessionStore {
    /// Create a store whose entries never expire
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a store whose entries expire after `ttl` of inactivity
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::build(Some(ttl))
    }

    fn build(ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(Sessions {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            ttl,
        }
    }

    /// Idle time after which an entry expires
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_expired(&self, entry: &SessionEntry) -> bool {
        self.ttl
            .map(|ttl| entry.last_access.elapsed() > ttl)
            .unwrap_or(false)
    }

    fn sweep(&self, sessions: &mut Sessions) -> usize {
        let before = sessions.entries.len();
        sessions.entries.retain(|_, entry| !self.is_expired(entry));
        sessions.last_sweep = Instant::now();
        before - sessions.entries.len()
    }

    /// Number of stored sessions, including expired ones not yet cleaned up
    pub async fn len(&self) -> usize {
        self.sessions.read().await.entries.len()
    }

    /// Whether the store holds no sessions
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.entries.is_empty()
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let removed = self.sweep(&mut sessions);
        if removed > 0 {
            info!(removed, "Cleaned up expired view sessions");
        }
        removed
    }

    /// Spawn a background task that periodically drops expired sessions
    ///
    /// The task holds a weak reference and stops once the store is dropped.
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration) {
        let store = Arc::downgrade(&self);
        tokio::spawn(async move {
            info!("Starting session cleanup task (interval: {:?})", interval);
            loop {
                tokio::time::sleep(interval).await;
                match store.upgrade() {
                    Some(store) => {
                        store.cleanup_expired().await;
                    }
                    None => {
                        debug!("Session store dropped, stopping cleanup task");
                        break;
                    }
                }
            }
        });
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session: &SessionId) -> Result<ViewPreference> {
        let mut sessions = self.sessions.write().await;

        let expired = match sessions.entries.get(session) {
            Some(entry) => self.is_expired(entry),
            None => return Ok(ViewPreference::Unset),
        };

        if expired {
            debug!(session = %session, "View session expired");
            sessions.entries.remove(session);
            return Ok(ViewPreference::Unset);
        }

        Ok(sessions
            .entries
            .get_mut(session)
            .map(|entry| {
                entry.last_access = Instant::now();
                entry.preference
            })
            .unwrap_or_default())
    }

    async fn set(&self, session: &SessionId, preference: ViewPreference) -> Result<()> {
        if !preference.is_set() {
            return self.clear(session).await;
        }

        let mut sessions = self.sessions.write().await;
        if self
            .ttl
            .is_some_and(|ttl| sessions.last_sweep.elapsed() >= ttl)
        {
            let removed = self.sweep(&mut sessions);
            if removed > 0 {
                debug!(removed, "Swept expired view sessions");
            }
        }

        sessions.entries.insert(
            session.clone(),
            SessionEntry {
                preference,
                last_access: Instant::now(),
            },
        );
        debug!(session = %session, preference = %preference, "View preference stored");
        Ok(())
    }

    async fn clear(&self, session: &SessionId) -> Result<()> {
        self.sessions.write().await.entries.remove(session);
        debug!(session = %session, "View preference cleared");
        Ok(())
    }
}

/// A store that always fails; used to exercise degraded paths
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSessionStore;

#[async_trait::async_trait]
impl SessionStore for UnavailableSessionStore {
    async fn get(&self, _session: &SessionId) -> Result<ViewPreference> {
        Err(MobileViewError::SessionStore("store unavailable".to_string()))
    }

    async fn set(&self, _session: &SessionId, _preference: ViewPreference) -> Result<()> {
        Err(MobileViewError::SessionStore("store unavailable".to_string()))
    }

    async fn clear(&self, _session: &SessionId) -> Result<()> {
        Err(MobileViewError::SessionStore("store unavailable".to_string()))
    }
}
