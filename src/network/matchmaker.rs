//! Matchmaker (spec.md §4.6).
//!
//! Owns the two entry paths into a game: the random-pairing FIFO queue and
//! the explicit challenge workflow. Shape follows the teacher's
//! `SessionManager`/`SessionRegistry` pattern — a small struct under
//! `RwLock`, opaque ids, a thiserror error enum — generalized from the
//! teacher's match-size queue to chess's one-challenger/one-target model.
//!
//! Queue and challenge table are owned exclusively here (spec.md §3); other
//! components read pairing outcomes only through the calls below, never the
//! underlying collections.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::MatchmakerError;
use crate::network::session::{SessionId, UserId};

/// One session waiting for a random opponent (spec.md §3 "Matchmaking
/// Queue").
#[derive(Debug, Clone)]
struct QueueEntry {
    session_id: SessionId,
    user_id: UserId,
    username: String,
    rating: i32,
    joined_at: DateTime<Utc>,
}

/// A pending challenge, keyed by `(challenger, target)` (spec.md §3
/// "Challenge Table").
#[derive(Debug, Clone)]
pub struct Challenge {
    pub challenger_session: SessionId,
    pub challenger_user: UserId,
    pub challenger_username: String,
    pub challenger_rating: i32,
    pub target_session: SessionId,
    pub expires_at: DateTime<Utc>,
}

/// The two sessions that were just paired, ready for `GameController` to
/// start a game from.
#[derive(Debug, Clone)]
pub struct Pairing {
    pub a_session: SessionId,
    pub a_user: UserId,
    pub a_username: String,
    pub a_rating: i32,
    pub b_session: SessionId,
    pub b_user: UserId,
    pub b_username: String,
    pub b_rating: i32,
}

pub struct Matchmaker {
    queue: RwLock<Vec<QueueEntry>>,
    /// Keyed by (challenger session, target session), per spec.md §3.
    challenges: RwLock<BTreeMap<(SessionId, SessionId), Challenge>>,
    rating_window: Option<u32>,
    challenge_ttl_seconds: i64,
}

impl Matchmaker {
    pub fn new(rating_window: Option<u32>, challenge_ttl_seconds: u64) -> Arc<Self> {
        Arc::new(Self {
            queue: RwLock::new(Vec::new()),
            challenges: RwLock::new(BTreeMap::new()),
            rating_window,
            challenge_ttl_seconds: challenge_ttl_seconds as i64,
        })
    }

    /// Join the tail of the queue and attempt an immediate pairing. At most
    /// one queue entry per session (spec.md §4.6 "at-most-one rule");
    /// callers must have already checked the session isn't InGame.
    pub async fn find_match(
        &self,
        session_id: SessionId,
        user_id: UserId,
        username: String,
        rating: i32,
    ) -> Result<Option<Pairing>, MatchmakerError> {
        {
            let queue = self.queue.read().await;
            if queue.iter().any(|e| e.session_id == session_id) {
                return Err(MatchmakerError::AlreadyQueued);
            }
        }

        let entry = QueueEntry {
            session_id,
            user_id,
            username,
            rating,
            joined_at: Utc::now(),
        };

        let mut queue = self.queue.write().await;
        queue.push(entry);
        Ok(self.try_pair_locked(&mut queue))
    }

    /// Scan front-first for the oldest waiting session within the rating
    /// window of the tail entry just pushed (spec.md §4.6). Tie-breaks on
    /// `(waiting-time, session-id)` make the outcome deterministic when more
    /// than one candidate qualifies (spec.md §4.6 "Tie-breaks").
    fn try_pair_locked(&self, queue: &mut Vec<QueueEntry>) -> Option<Pairing> {
        if queue.len() < 2 {
            return None;
        }

        let mut best: Option<(usize, usize)> = None;
        for i in 0..queue.len() {
            for j in (i + 1)..queue.len() {
                let (a, b) = (&queue[i], &queue[j]);
                if !self.within_window(a.rating, b.rating) {
                    continue;
                }
                let key = (a.joined_at.min(b.joined_at), a.session_id.min(b.session_id));
                let better = match best {
                    None => true,
                    Some((bi, bj)) => {
                        let (ba, bb) = (&queue[bi], &queue[bj]);
                        let best_key =
                            (ba.joined_at.min(bb.joined_at), ba.session_id.min(bb.session_id));
                        key < best_key
                    }
                };
                if better {
                    best = Some((i, j));
                }
            }
        }

        let (i, j) = best?;
        // Remove the higher index first so the lower index stays valid.
        let b = queue.remove(j);
        let a = queue.remove(i);
        Some(Pairing {
            a_session: a.session_id,
            a_user: a.user_id,
            a_username: a.username,
            a_rating: a.rating,
            b_session: b.session_id,
            b_user: b.user_id,
            b_username: b.username,
            b_rating: b.rating,
        })
    }

    fn within_window(&self, a: i32, b: i32) -> bool {
        match self.rating_window {
            None => true,
            Some(w) => (a - b).unsigned_abs() <= w,
        }
    }

    /// Leave the queue voluntarily, or as part of disconnect cleanup
    /// (spec.md §4.6 "Cancellation").
    pub async fn cancel_find_match(&self, session_id: SessionId) -> Result<(), MatchmakerError> {
        let mut queue = self.queue.write().await;
        let before = queue.len();
        queue.retain(|e| e.session_id != session_id);
        if queue.len() == before {
            return Err(MatchmakerError::NotQueued);
        }
        Ok(())
    }

    pub async fn is_queued(&self, session_id: SessionId) -> bool {
        self.queue.read().await.iter().any(|e| e.session_id == session_id)
    }

    /// Record a challenge from `challenger` to `target` (spec.md §4.6
    /// "Challenge"). Callers are responsible for verifying the target is
    /// Authenticated and not InGame before calling this.
    #[allow(clippy::too_many_arguments)]
    pub async fn challenge(
        &self,
        challenger_session: SessionId,
        challenger_user: UserId,
        challenger_username: String,
        challenger_rating: i32,
        target_session: SessionId,
    ) -> Result<(), MatchmakerError> {
        if challenger_session == target_session {
            return Err(MatchmakerError::SelfChallenge);
        }

        let mut challenges = self.challenges.write().await;
        let already_outstanding = challenges
            .keys()
            .any(|(from, _)| *from == challenger_session);
        if already_outstanding {
            return Err(MatchmakerError::DuplicateChallenge);
        }

        challenges.insert(
            (challenger_session, target_session),
            Challenge {
                challenger_session,
                challenger_user,
                challenger_username,
                challenger_rating,
                target_session,
                expires_at: Utc::now() + chrono::Duration::seconds(self.challenge_ttl_seconds),
            },
        );
        Ok(())
    }

    /// Consume the challenge keyed by `(challenger_user, target_session)`,
    /// resolved by user id since the target only knows the challenger's
    /// user id from `CHALLENGE_RECEIVED` (spec.md §6).
    pub async fn find_by_challenger_user(
        &self,
        challenger_user: UserId,
        target_session: SessionId,
    ) -> Option<(SessionId, SessionId)> {
        let challenges = self.challenges.read().await;
        challenges
            .iter()
            .find(|(&(_, to), c)| to == target_session && c.challenger_user == challenger_user)
            .map(|(&key, _)| key)
    }

    /// Accept a pending challenge, consuming it atomically (spec.md §4.6
    /// "Accept").
    pub async fn accept_challenge(
        &self,
        challenger_session: SessionId,
        target_session: SessionId,
        target_user: UserId,
        target_username: String,
        target_rating: i32,
    ) -> Result<Pairing, MatchmakerError> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .remove(&(challenger_session, target_session))
            .ok_or(MatchmakerError::NoSuchChallenge)?;

        Ok(Pairing {
            a_session: challenge.challenger_session,
            a_user: challenge.challenger_user,
            a_username: challenge.challenger_username,
            a_rating: challenge.challenger_rating,
            b_session: target_session,
            b_user: target_user,
            b_username: target_username,
            b_rating: target_rating,
        })
    }

    /// Decline a pending challenge, consuming it (spec.md §4.6 "Decline").
    /// A second decline for the same key is a no-op (spec.md §8).
    pub async fn decline_challenge(
        &self,
        challenger_session: SessionId,
        target_session: SessionId,
    ) -> Option<Challenge> {
        self.challenges
            .write()
            .await
            .remove(&(challenger_session, target_session))
    }

    /// Challenges past `challenge_ttl_seconds`, consumed and returned so the
    /// caller can emit the decline-equivalent notification (spec.md §4.6
    /// "Expiry").
    pub async fn expire_challenges(&self) -> Vec<Challenge> {
        let now = Utc::now();
        let mut challenges = self.challenges.write().await;
        let expired_keys: Vec<(SessionId, SessionId)> = challenges
            .iter()
            .filter(|(_, c)| c.expires_at <= now)
            .map(|(k, _)| *k)
            .collect();
        expired_keys
            .into_iter()
            .filter_map(|k| challenges.remove(&k))
            .collect()
    }

    /// Remove every trace of `session_id` from both the queue and any
    /// challenge naming it, on either side (spec.md §4.2 disconnect
    /// cleanup).
    pub async fn remove_session(&self, session_id: SessionId) {
        self.queue.write().await.retain(|e| e.session_id != session_id);
        self.challenges
            .write()
            .await
            .retain(|(from, to), _| *from != session_id && *to != session_id);
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.read().await.len()
    }
}
