use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::response_state::ResponseState;

/// Stable identity for one client connection's request/response cycle.
/// Assigned at admission time and freed after `after-response`, mirroring
/// `spec.md`'s session lifetime.
pub type SessionIdentity = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_session_identity() -> SessionIdentity {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-session scratch data plugins use to pass state between lifecycle
/// events of the same session (e.g. a timer started in `before-request`
/// read back in `after-response`).
#[derive(Default)]
pub struct SessionData {
    values: DashMap<String, JsonValue>,
    pub response_state: ResponseState,
}

impl SessionData {
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: JsonValue) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<JsonValue> {
        self.values.remove(key).map(|(_, v)| v)
    }
}

/// Process-wide registry of live sessions, keyed by `SessionIdentity`.
/// Grounded on the teacher's `Lazy<DashMap<..>>` global-registry idiom
/// (see `proxy/route.rs`'s `ROUTE_MAP`), scoped to an instance owned by
/// the engine instead of a `static` so tests can create independent
/// stores.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionIdentity, Arc<SessionData>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) -> (SessionIdentity, Arc<SessionData>) {
        let id = next_session_identity();
        let data = Arc::new(SessionData::default());
        self.sessions.insert(id, data.clone());
        (id, data)
    }

    pub fn get(&self, id: SessionIdentity) -> Option<Arc<SessionData>> {
        self.sessions.get(&id).map(|v| v.clone())
    }

    pub fn close(&self, id: SessionIdentity) {
        self.sessions.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_assigns_unique_identities() {
        let store = SessionStore::new();
        let (a, _) = store.open();
        let (b, _) = store.open();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn close_frees_session_state() {
        let store = SessionStore::new();
        let (id, data) = store.open();
        data.set("k", JsonValue::from(1));
        store.close(id);
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn scratch_values_round_trip() {
        let data = SessionData::default();
        data.set("count", JsonValue::from(3));
        assert_eq!(data.get("count"), Some(JsonValue::from(3)));
        assert_eq!(data.remove("count"), Some(JsonValue::from(3)));
        assert_eq!(data.get("count"), None);
    }
}
