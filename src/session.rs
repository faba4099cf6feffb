// Session context for backend calls.
// Replaces ad-hoc reads of tenant ids and auth tokens at call sites with a
// single accessor that is opened once per back-office session and torn down
// explicitly.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Per-session tenant context. Cheap to clone; clones share the same token
/// cell so a re-login is visible to every call site holding the context.
#[derive(Debug, Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    session_id: String,
    wholesaler_id: String,
    agency_id: String,
    markup_percent: f64,
    bearer_token: RwLock<Option<String>>,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        wholesaler_id: impl Into<String>,
        agency_id: impl Into<String>,
        markup_percent: f64,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                session_id: session_id.into(),
                wholesaler_id: wholesaler_id.into(),
                agency_id: agency_id.into(),
                markup_percent,
                bearer_token: RwLock::new(None),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn wholesaler_id(&self) -> &str {
        &self.inner.wholesaler_id
    }

    pub fn agency_id(&self) -> &str {
        &self.inner.agency_id
    }

    /// Markup percentage applied to confirmed bookings for this agency.
    pub fn markup_percent(&self) -> f64 {
        self.inner.markup_percent
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.inner.bearer_token.read().clone()
    }

    pub fn set_bearer_token(&self, token: impl Into<String>) {
        *self.inner.bearer_token.write() = Some(token.into());
    }

    pub fn clear_bearer_token(&self) {
        *self.inner.bearer_token.write() = None;
    }
}

/// Registry of live back-office sessions, keyed by session id. One wholesaler
/// tenant serves many agency operators concurrently, so lookups must not
/// serialize against each other.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<String, SessionContext>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session, replacing any previous one under the same id.
    pub fn open(
        &self,
        session_id: impl Into<String>,
        wholesaler_id: impl Into<String>,
        agency_id: impl Into<String>,
        markup_percent: f64,
    ) -> SessionContext {
        let session_id = session_id.into();
        let context = SessionContext::new(
            session_id.clone(),
            wholesaler_id,
            agency_id,
            markup_percent,
        );
        tracing::debug!(session_id = %session_id, "session opened");
        self.sessions.insert(session_id, context.clone());
        context
    }

    pub fn get(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Tear down a session. Returns false when the id was unknown.
    pub fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            tracing::debug!(session_id = %session_id, "session closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
