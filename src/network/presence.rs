//! Presence Service (spec.md §4.5).
//!
//! The online-users set itself is derived state already held by the
//! Session Registry (every authenticated session contributes one entry);
//! this module only owns the debounced broadcast on top of it. Successive
//! triggers within 100 ms coalesce into a single push, matching the
//! teacher's pattern of a spawned background loop driven by a notify/timer
//! rather than firing inline on every mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::network::protocol::{OnlineUsersList, ServerMessage, UserSummary};
use crate::network::session::SessionRegistry;

const DEBOUNCE: Duration = Duration::from_millis(100);

pub struct PresenceService {
    sessions: Arc<SessionRegistry>,
    notify: Arc<Notify>,
}

impl PresenceService {
    /// Spawns the debounced broadcast loop and returns a handle to trigger
    /// it from login/disconnect handlers.
    pub fn spawn(sessions: Arc<SessionRegistry>) -> Arc<Self> {
        let notify = Arc::new(Notify::new());
        let service = Arc::new(Self {
            sessions: sessions.clone(),
            notify: notify.clone(),
        });

        tokio::spawn(async move {
            loop {
                notify.notified().await;
                // Coalesce a burst of triggers into one broadcast: sleep
                // out the debounce window before reading state, so any
                // additional logins/disconnects this tick fold into the
                // same push instead of firing one each.
                tokio::time::sleep(DEBOUNCE).await;
                broadcast_online_users(&sessions).await;
            }
        });

        service
    }

    /// Called after login commits and after disconnect is committed
    /// (spec.md §5 ordering guarantee).
    pub fn notify_changed(&self) {
        self.notify.notify_one();
    }
}

async fn broadcast_online_users(sessions: &Arc<SessionRegistry>) {
    let online = sessions.online_users().await;
    let all: Vec<UserSummary> = online
        .iter()
        .map(|(_, user)| UserSummary {
            user_id: user.user_id.to_string(),
            username: user.username.clone(),
            rating: user.rating,
        })
        .collect();

    for (session_id, user) in &online {
        let filtered: Vec<UserSummary> = all
            .iter()
            .filter(|u| u.user_id != user.user_id.to_string())
            .cloned()
            .collect();
        sessions
            .send_to(
                *session_id,
                ServerMessage::OnlineUsersList(OnlineUsersList { users: filtered }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session::SessionUser;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn broadcast_excludes_recipient_from_own_view() {
        let sessions = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = sessions.register(tx_a).await;
        let b = sessions.register(tx_b).await;

        sessions
            .authenticate(
                a,
                SessionUser {
                    user_id: Uuid::new_v4(),
                    username: "alice".into(),
                    rating: 1200,
                },
            )
            .await
            .unwrap();
        sessions
            .authenticate(
                b,
                SessionUser {
                    user_id: Uuid::new_v4(),
                    username: "bob".into(),
                    rating: 1200,
                },
            )
            .await
            .unwrap();

        broadcast_online_users(&sessions).await;

        let msg_a = rx_a.recv().await.unwrap();
        match msg_a {
            ServerMessage::OnlineUsersList(list) => {
                assert_eq!(list.users.len(), 1);
                assert_eq!(list.users[0].username, "bob");
            }
            _ => panic!("wrong message"),
        }

        let msg_b = rx_b.recv().await.unwrap();
        match msg_b {
            ServerMessage::OnlineUsersList(list) => {
                assert_eq!(list.users.len(), 1);
                assert_eq!(list.users[0].username, "alice");
            }
            _ => panic!("wrong message"),
        }
    }
}
