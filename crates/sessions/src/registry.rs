//! In-memory registry of live bot sessions, keyed by identity.
//!
//! The registry never replaces an entry: a second registration for an
//! identity that is already present returns [`RegisterResult::Conflict`]
//! with the existing session and leaves the map untouched. Whether the
//! newcomer is then refused or served anyway is the caller's policy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use bg_domain::trace::TraceEvent;
use bg_protocol::SelfId;

use crate::session::{Session, SessionInfo};

/// Outcome of [`SessionRegistry::register`].
#[derive(Debug)]
pub enum RegisterResult {
    /// The session is now the live entry for its identity. Dropping the
    /// guard unregisters it.
    Registered(RegistrationGuard),
    /// Another session already holds the identity; nothing was changed.
    Conflict(Arc<Session>),
}

/// Thread-safe identity → session map shared by all connection handlers.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SelfId, Arc<Session>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `session` unless its identity is already taken.
    ///
    /// The presence check and the insert happen under one write lock, so two
    /// concurrent registrations for the same identity cannot both succeed.
    pub fn register(self: &Arc<Self>, session: Arc<Session>) -> RegisterResult {
        {
            let mut sessions = self.sessions.write();
            if let Some(existing) = sessions.get(&session.self_id) {
                return RegisterResult::Conflict(existing.clone());
            }
            sessions.insert(session.self_id.clone(), session.clone());
        }

        TraceEvent::SessionRegistered {
            adapter: session.adapter.clone(),
            self_id: session.self_id.to_string(),
            session_id: session.session_id.clone(),
            transport: session.kind.to_string(),
        }
        .emit();

        RegisterResult::Registered(RegistrationGuard {
            registry: self.clone(),
            self_id: session.self_id.clone(),
            session_id: session.session_id.clone(),
            released: false,
        })
    }

    /// Remove whatever session holds `self_id`. Absent identities are a
    /// no-op, so concurrent teardown paths may both call this safely.
    pub fn unregister(&self, self_id: &SelfId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(self_id);
        if let Some(session) = &removed {
            emit_unregistered(session);
        }
        removed
    }

    /// Remove the entry for `self_id` only if it is still `session_id`.
    fn unregister_owned(&self, self_id: &SelfId, session_id: &str) -> Option<Arc<Session>> {
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(self_id) {
                Some(current) if current.session_id == session_id => sessions.remove(self_id),
                _ => None,
            }
        };
        if let Some(session) = &removed {
            emit_unregistered(session);
        }
        removed
    }

    pub fn get(&self, self_id: &SelfId) -> Option<Arc<Session>> {
        self.sessions.read().get(self_id).cloned()
    }

    pub fn contains(&self, self_id: &SelfId) -> bool {
        self.sessions.read().contains_key(self_id)
    }

    /// Snapshot of all live sessions, sorted by identity.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self.sessions.read().values().map(|s| s.info()).collect();
        out.sort_by(|a, b| a.self_id.cmp(&b.self_id));
        out
    }

    /// Handles to every live session, in no particular order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

fn emit_unregistered(session: &Session) {
    TraceEvent::SessionUnregistered {
        adapter: session.adapter.clone(),
        self_id: session.self_id.to_string(),
        session_id: session.session_id.clone(),
        connected_secs: Utc::now()
            .signed_duration_since(session.connected_at)
            .num_seconds(),
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Unregisters its session exactly once: on [`release`](Self::release) or
/// on drop, whichever comes first. Drop also runs when the owning task
/// unwinds or is cancelled.
pub struct RegistrationGuard {
    registry: Arc<SessionRegistry>,
    self_id: SelfId,
    session_id: String,
    released: bool,
}

impl RegistrationGuard {
    pub fn self_id(&self) -> &SelfId {
        &self.self_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Unregister now. Later calls (and the eventual drop) do nothing.
    pub fn release(&mut self) -> Option<Arc<Session>> {
        if self.released {
            return None;
        }
        self.released = true;
        self.registry
            .unregister_owned(&self.self_id, &self.session_id)
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RegistrationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationGuard")
            .field("self_id", &self.self_id)
            .field("session_id", &self.session_id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bg_protocol::{Payload, TransportKind};

    use crate::session::BotSession;

    struct NullBot {
        self_id: SelfId,
    }

    #[async_trait]
    impl BotSession for NullBot {
        fn adapter(&self) -> &str {
            "test"
        }
        fn self_id(&self) -> &SelfId {
            &self.self_id
        }
        fn kind(&self) -> TransportKind {
            TransportKind::WebSocket
        }
        async fn handle_message(&self, _payload: Payload) {}
    }

    fn make_session(id: &str) -> Arc<Session> {
        let bot = Arc::new(NullBot {
            self_id: SelfId::new(id),
        });
        Arc::new(Session::new(bot, None))
    }

    fn expect_guard(result: RegisterResult) -> RegistrationGuard {
        match result {
            RegisterResult::Registered(guard) => guard,
            RegisterResult::Conflict(existing) => {
                panic!("unexpected conflict with {}", existing.session_id)
            }
        }
    }

    #[test]
    fn register_then_lookup() {
        let reg = Arc::new(SessionRegistry::new());
        let s = make_session("B123");
        let _guard = expect_guard(reg.register(s.clone()));

        assert_eq!(reg.len(), 1);
        assert!(reg.contains(&SelfId::new("B123")));
        assert_eq!(
            reg.get(&SelfId::new("B123")).unwrap().session_id,
            s.session_id
        );
    }

    #[test]
    fn conflict_keeps_original_entry() {
        let reg = Arc::new(SessionRegistry::new());
        let first = make_session("B123");
        let second = make_session("B123");

        let _guard = expect_guard(reg.register(first.clone()));
        match reg.register(second.clone()) {
            RegisterResult::Conflict(existing) => {
                assert_eq!(existing.session_id, first.session_id);
            }
            RegisterResult::Registered(_) => panic!("duplicate identity was registered"),
        }

        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.get(&SelfId::new("B123")).unwrap().session_id,
            first.session_id
        );
    }

    #[test]
    fn unregister_absent_is_noop() {
        let reg = Arc::new(SessionRegistry::new());
        let _guard = expect_guard(reg.register(make_session("A")));

        assert!(reg.unregister(&SelfId::new("missing")).is_none());
        assert!(reg.unregister(&SelfId::new("missing")).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn guard_drop_unregisters() {
        let reg = Arc::new(SessionRegistry::new());
        {
            let _guard = expect_guard(reg.register(make_session("B123")));
            assert_eq!(reg.len(), 1);
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn guard_release_is_idempotent() {
        let reg = Arc::new(SessionRegistry::new());
        let mut guard = expect_guard(reg.register(make_session("B123")));

        assert!(guard.release().is_some());
        assert!(guard.release().is_none());
        drop(guard);
        assert!(reg.is_empty());
    }

    #[test]
    fn stale_guard_does_not_remove_successor() {
        let reg = Arc::new(SessionRegistry::new());
        let guard = expect_guard(reg.register(make_session("B123")));

        // Forced eviction, then a new session takes the identity.
        reg.unregister(&SelfId::new("B123"));
        let successor = make_session("B123");
        let _succ_guard = expect_guard(reg.register(successor.clone()));

        drop(guard);
        assert_eq!(
            reg.get(&SelfId::new("B123")).unwrap().session_id,
            successor.session_id
        );
    }

    #[test]
    fn guard_survives_panicking_owner() {
        let reg = Arc::new(SessionRegistry::new());
        let reg2 = reg.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = expect_guard(reg2.register(make_session("B123")));
            panic!("connection handler blew up");
        }));
        assert!(result.is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn list_is_sorted_and_serializable() {
        let reg = Arc::new(SessionRegistry::new());
        let _b = expect_guard(reg.register(make_session("b")));
        let _a = expect_guard(reg.register(make_session("a")));

        let list = reg.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].self_id.as_str(), "a");
        assert!(!list[0].open);

        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json[1]["self_id"], "b");
        assert_eq!(json[1]["transport"], "websocket");
    }

    #[tokio::test]
    async fn concurrent_registration_admits_exactly_one() {
        let reg = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                match reg.register(make_session("B123")) {
                    RegisterResult::Registered(guard) => Some(guard),
                    RegisterResult::Conflict(_) => None,
                }
            }));
        }

        let mut guards = Vec::new();
        for h in handles {
            if let Some(g) = h.await.unwrap() {
                guards.push(g);
            }
        }
        assert_eq!(guards.len(), 1);
        assert_eq!(reg.len(), 1);
    }
}
