//! Session Registry (spec.md §3, §4.2).
//!
//! Owns every live `Session`, keyed by an opaque session id with a parallel
//! index by user id populated at login. Shape follows the teacher's
//! `SessionManager`: a `BTreeMap`-backed registry under `RwLock`, typed
//! opaque ids, an explicit state-machine enum, and a thiserror error type —
//! generalized here from match-lifecycle state to the chess session
//! lifecycle {Connected, Authenticated, InGame}.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::error::SessionError;
use crate::network::protocol::ServerMessage;

pub type SessionId = Uuid;
pub type UserId = Uuid;
pub type GameId = Uuid;

/// Bounded send-queue depth per session. Per spec.md §4.1/§5, a full queue
/// means a slow consumer; the session is disconnected rather than blocking
/// the coordinator.
pub const SEND_QUEUE_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticated,
    InGame,
}

/// Identity attached to a session once login succeeds.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: UserId,
    pub username: String,
    pub rating: i32,
}

/// Per-connection server-side context (spec.md §3 "Session").
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    pub user: Option<SessionUser>,
    pub current_game_id: Option<GameId>,
    pub last_activity: DateTime<Utc>,
    sender: mpsc::Sender<ServerMessage>,
}

impl Session {
    fn new(id: SessionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            state: SessionState::Connected,
            user: None,
            current_game_id: None,
            last_activity: Utc::now(),
            sender,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.state, SessionState::Connected)
    }
}

/// Registry of live sessions, with a secondary index by authenticated user
/// id (spec.md §4.2). Cross-component reads go through the accessors here;
/// mutation happens only from within the coordinator (§5).
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<SessionId, Session>>,
    by_user: RwLock<BTreeMap<UserId, SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(BTreeMap::new()),
            by_user: RwLock::new(BTreeMap::new()),
        })
    }

    /// Create a Session on accept, in `Connected` state.
    pub async fn register(&self, sender: mpsc::Sender<ServerMessage>) -> SessionId {
        let id = Uuid::new_v4();
        let session = Session::new(id, sender);
        self.sessions.write().await.insert(id, session);
        id
    }

    /// Promote a session to `Authenticated` and index it by user id.
    pub async fn authenticate(&self, id: SessionId, user: SessionUser) -> Result<(), SessionError> {
        let user_id = user.user_id;
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound)?;
        session.state = SessionState::Authenticated;
        session.user = Some(user);
        drop(sessions);
        self.by_user.write().await.insert(user_id, id);
        Ok(())
    }

    /// Transition a session into `InGame` with the given game id.
    pub async fn enter_game(&self, id: SessionId, game_id: GameId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound)?;
        session.state = SessionState::InGame;
        session.current_game_id = Some(game_id);
        Ok(())
    }

    /// Transition a session back to `Authenticated`, clearing its game
    /// pointer (termination sequence step 6, spec.md §4.8).
    pub async fn leave_game(&self, id: SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound)?;
        session.state = SessionState::Authenticated;
        session.current_game_id = None;
        Ok(())
    }

    pub async fn touch(&self, id: SessionId) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.last_activity = Utc::now();
        }
    }

    pub async fn lookup_by_session(&self, id: SessionId) -> Option<SessionSnapshot> {
        self.sessions.read().await.get(&id).map(SessionSnapshot::from)
    }

    pub async fn lookup_by_user(&self, user_id: UserId) -> Option<SessionSnapshot> {
        let session_id = *self.by_user.read().await.get(&user_id)?;
        self.lookup_by_session(session_id).await
    }

    /// Best-effort send. A full queue means a slow consumer; the caller is
    /// expected to disconnect the session on `false` (backpressure policy,
    /// spec.md §4.1).
    pub async fn send_to(&self, id: SessionId, message: ServerMessage) -> bool {
        let sender = match self.sessions.read().await.get(&id) {
            Some(session) => session.sender.clone(),
            None => return false,
        };
        sender.try_send(message).is_ok()
    }

    /// Broadcast to every session matching `predicate`.
    pub async fn broadcast(
        &self,
        predicate: impl Fn(&Session) -> bool,
        message: ServerMessage,
    ) {
        let sessions = self.sessions.read().await;
        for session in sessions.values().filter(|s| predicate(s)) {
            let _ = session.sender.try_send(message.clone());
        }
    }

    /// Remove a session from the registry and its user index. Callers are
    /// responsible for then removing it from presence, the matchmaking
    /// queue, challenges, and active-game membership, in that deterministic
    /// order (spec.md §4.2, §5).
    pub async fn close(&self, id: SessionId) -> Option<Session> {
        let session = self.sessions.write().await.remove(&id)?;
        if let Some(user) = &session.user {
            self.by_user.write().await.remove(&user.user_id);
        }
        Some(session)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Every session that has completed login, for the Presence Service
    /// (spec.md §4.5). Includes InGame sessions — authentication is a
    /// superset state, not a separate track.
    pub async fn online_users(&self) -> Vec<(SessionId, SessionUser)> {
        self.sessions
            .read()
            .await
            .values()
            .filter_map(|s| s.user.clone().map(|u| (s.id, u)))
            .collect()
    }

    /// Sessions idle past `timeout_seconds` with no traffic (spec.md §5).
    pub async fn idle_sessions(&self, timeout_seconds: i64) -> Vec<SessionId> {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| (now - s.last_activity).num_seconds() >= timeout_seconds)
            .map(|s| s.id)
            .collect()
    }
}

/// Cloneable read-only view of a `Session`, since the live struct holds a
/// non-`Clone` sender.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: SessionState,
    pub user: Option<SessionUser>,
    pub current_game_id: Option<GameId>,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            state: session.state,
            user: session.user.clone(),
            current_game_id: session.current_game_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(SEND_QUEUE_DEPTH)
    }

    #[tokio::test]
    async fn register_starts_connected() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        let snapshot = registry.lookup_by_session(id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Connected);
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn authenticate_indexes_by_user() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        let user_id = Uuid::new_v4();
        registry
            .authenticate(
                id,
                SessionUser {
                    user_id,
                    username: "alice".into(),
                    rating: 1200,
                },
            )
            .await
            .unwrap();

        let by_session = registry.lookup_by_session(id).await.unwrap();
        assert_eq!(by_session.state, SessionState::Authenticated);
        let by_user = registry.lookup_by_user(user_id).await.unwrap();
        assert_eq!(by_user.id, id);
    }

    #[tokio::test]
    async fn close_removes_from_both_indices() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        let user_id = Uuid::new_v4();
        registry
            .authenticate(
                id,
                SessionUser {
                    user_id,
                    username: "alice".into(),
                    rating: 1200,
                },
            )
            .await
            .unwrap();

        registry.close(id).await.unwrap();
        assert!(registry.lookup_by_session(id).await.is_none());
        assert!(registry.lookup_by_user(user_id).await.is_none());
    }

    #[tokio::test]
    async fn enter_and_leave_game_round_trip() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        let game_id = Uuid::new_v4();
        registry.enter_game(id, game_id).await.unwrap();
        let snap = registry.lookup_by_session(id).await.unwrap();
        assert_eq!(snap.state, SessionState::InGame);
        assert_eq!(snap.current_game_id, Some(game_id));

        registry.leave_game(id).await.unwrap();
        let snap = registry.lookup_by_session(id).await.unwrap();
        assert_eq!(snap.state, SessionState::Authenticated);
        assert_eq!(snap.current_game_id, None);
    }

    #[tokio::test]
    async fn send_to_unknown_session_is_false() {
        let registry = SessionRegistry::new();
        assert!(!registry
            .send_to(Uuid::new_v4(), ServerMessage::ChallengeAccepted)
            .await);
    }
}
