//! Dispatcher (spec.md §4.3).
//!
//! The sole entry point from the frame codec into business logic. Each
//! client message declares its required session state as a precondition;
//! on mismatch the dispatcher answers with a typed error and never invokes
//! the handler. Message ids unknown to [`ClientMessage::decode`] are logged
//! and ignored rather than answered (spec.md §4.1/§7); a known id with a
//! malformed payload gets a typed error reply while the session stays open.
//!
//! The "static table keyed by message id" of spec.md §9 is this module's
//! `route` match: each arm is one table entry, pairing a required state
//! with the handler call, the same shape as the teacher's
//! `handle_client_message` match but keyed by state preconditions instead
//! of a flat message-type switch.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::error::{DecodeError, DomainError, MatchmakerError, StateError};
use crate::game::controller::GameController;
use crate::network::auth::AuthService;
use crate::network::matchmaker::{Matchmaker, Pairing};
use crate::network::presence::PresenceService;
use crate::network::protocol::{
    ChallengeReceived, ClientMessage, ErrorReply, MatchFound, ServerMessage, UserSummary,
};
use crate::network::session::{SessionId, SessionRegistry, SessionState};

pub struct Dispatcher {
    sessions: Arc<SessionRegistry>,
    auth: Arc<AuthService>,
    presence: Arc<PresenceService>,
    matchmaker: Arc<Matchmaker>,
    games: Arc<GameController>,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        auth: Arc<AuthService>,
        presence: Arc<PresenceService>,
        matchmaker: Arc<Matchmaker>,
        games: Arc<GameController>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            auth,
            presence,
            matchmaker,
            games,
        })
    }

    /// Decode and route one frame's payload for `session_id`.
    pub async fn dispatch(&self, session_id: SessionId, message_id: u16, payload: &[u8]) {
        self.sessions.touch(session_id).await;

        match ClientMessage::decode(message_id, payload) {
            Ok(msg) => self.route(session_id, msg).await,
            Err(DecodeError::UnknownMessageId(id)) => {
                warn!(%session_id, message_id = id, "unknown message id; ignoring");
            }
            Err(e) => {
                self.reply_error(session_id, "decode", &e.to_string()).await;
            }
        }
    }

    async fn route(&self, session_id: SessionId, msg: ClientMessage) {
        let Some(session) = self.sessions.lookup_by_session(session_id).await else {
            return;
        };

        match msg {
            ClientMessage::Register(p) => {
                if session.state != SessionState::Connected {
                    self.reply_error(session_id, "register", &StateError::AlreadyAuthenticated.to_string())
                        .await;
                    return;
                }
                self.auth.register(session_id, p.username, p.password).await;
            }

            ClientMessage::Login(p) => {
                if session.state != SessionState::Connected {
                    self.reply_error(session_id, "login", &StateError::AlreadyAuthenticated.to_string())
                        .await;
                    return;
                }
                self.auth.login(session_id, p.username, p.password).await;
                self.presence.notify_changed();
            }

            ClientMessage::FindMatch => {
                let Some(user) = self.require_authenticated(session_id, &session, "find_match").await else {
                    return;
                };
                match self
                    .matchmaker
                    .find_match(session_id, user.user_id, user.username.clone(), user.rating)
                    .await
                {
                    Ok(Some(pairing)) => self.start_pairing(pairing).await,
                    Ok(None) => {}
                    Err(e) => self.reply_error(session_id, "find_match", &domain_reason(e)).await,
                }
            }

            ClientMessage::CancelFindMatch => {
                if self.require_authenticated(session_id, &session, "cancel_find_match").await.is_none() {
                    return;
                }
                if let Err(e) = self.matchmaker.cancel_find_match(session_id).await {
                    self.reply_error(session_id, "cancel_find_match", &domain_reason(e)).await;
                }
            }

            ClientMessage::FindAiMatch(p) => {
                let Some(user) = self.require_authenticated(session_id, &session, "find_ai_match").await else {
                    return;
                };
                self.games
                    .start_ai_game(session_id, user.user_id, user.username.clone(), user.rating, p.difficulty)
                    .await;
            }

            ClientMessage::Challenge(p) => {
                let Some(user) = self.require_authenticated(session_id, &session, "challenge").await else {
                    return;
                };
                let Ok(target_user_id) = Uuid::parse_str(&p.target_user_id) else {
                    self.reply_error(session_id, "challenge", "invalid target_user_id").await;
                    return;
                };
                let Some(target) = self.sessions.lookup_by_user(target_user_id).await else {
                    self.reply_error(session_id, "challenge", &DomainError::TargetUnavailable.to_string())
                        .await;
                    return;
                };
                if target.state != SessionState::Authenticated {
                    self.reply_error(session_id, "challenge", &DomainError::TargetUnavailable.to_string())
                        .await;
                    return;
                }
                match self
                    .matchmaker
                    .challenge(session_id, user.user_id, user.username.clone(), user.rating, target.id)
                    .await
                {
                    Ok(()) => {
                        self.sessions
                            .send_to(
                                target.id,
                                ServerMessage::ChallengeReceived(ChallengeReceived {
                                    sender: UserSummary {
                                        user_id: user.user_id.to_string(),
                                        username: user.username.clone(),
                                        rating: user.rating,
                                    },
                                }),
                            )
                            .await;
                    }
                    Err(e) => self.reply_error(session_id, "challenge", &domain_reason(e)).await,
                }
            }

            ClientMessage::AcceptChallenge(p) => {
                let Some(user) = self.require_authenticated(session_id, &session, "accept_challenge").await else {
                    return;
                };
                let Ok(challenger_user) = Uuid::parse_str(&p.challenger_user_id) else {
                    self.reply_error(session_id, "accept_challenge", "invalid challenger_user_id").await;
                    return;
                };
                let Some((challenger_session, target_session)) = self
                    .matchmaker
                    .find_by_challenger_user(challenger_user, session_id)
                    .await
                else {
                    self.reply_error(session_id, "accept_challenge", &DomainError::NoSuchChallenge.to_string())
                        .await;
                    return;
                };
                match self
                    .matchmaker
                    .accept_challenge(challenger_session, target_session, user.user_id, user.username.clone(), user.rating)
                    .await
                {
                    Ok(pairing) => {
                        self.sessions
                            .send_to(pairing.a_session, ServerMessage::ChallengeAccepted)
                            .await;
                        self.start_pairing(pairing).await;
                    }
                    Err(e) => self.reply_error(session_id, "accept_challenge", &domain_reason(e)).await,
                }
            }

            ClientMessage::DeclineChallenge(p) => {
                if self.require_authenticated(session_id, &session, "decline_challenge").await.is_none() {
                    return;
                }
                let Ok(challenger_user) = Uuid::parse_str(&p.challenger_user_id) else {
                    return;
                };
                let Some((challenger_session, target_session)) = self
                    .matchmaker
                    .find_by_challenger_user(challenger_user, session_id)
                    .await
                else {
                    // Already consumed or never existed: no-op (spec.md §8).
                    return;
                };
                if self
                    .matchmaker
                    .decline_challenge(challenger_session, target_session)
                    .await
                    .is_some()
                {
                    self.sessions
                        .send_to(challenger_session, ServerMessage::ChallengeDeclined)
                        .await;
                }
            }

            ClientMessage::MakeMove(p) => {
                let Some(game_id) = self.require_in_game(session_id, &session, "make_move", &p.game_id).await else {
                    return;
                };
                self.games.make_move(session_id, game_id, p.mv).await;
            }

            ClientMessage::Resign(p) => {
                let Some(game_id) = self.require_in_game(session_id, &session, "resign", &p.game_id).await else {
                    return;
                };
                self.games.resign(session_id, game_id).await;
            }

            ClientMessage::OfferDraw(p) => {
                let Some(game_id) = self.require_in_game(session_id, &session, "offer_draw", &p.game_id).await else {
                    return;
                };
                self.games.offer_draw(session_id, game_id).await;
            }

            ClientMessage::AcceptDraw(p) => {
                let Some(game_id) = self.require_in_game(session_id, &session, "accept_draw", &p.game_id).await else {
                    return;
                };
                self.games.accept_draw(session_id, game_id).await;
            }

            ClientMessage::DeclineDraw(p) => {
                let Some(game_id) = self.require_in_game(session_id, &session, "decline_draw", &p.game_id).await else {
                    return;
                };
                self.games.decline_draw(session_id, game_id).await;
            }
        }
    }

    /// Emits `MATCH_FOUND` to both paired sessions, then starts the game
    /// (which itself emits `GAME_START`) — ordering both messages per
    /// session (spec.md §5 "`MATCH_FOUND` precedes `GAME_START`").
    async fn start_pairing(&self, pairing: Pairing) {
        self.sessions
            .send_to(
                pairing.a_session,
                ServerMessage::MatchFound(MatchFound {
                    opponent: UserSummary {
                        user_id: pairing.b_user.to_string(),
                        username: pairing.b_username.clone(),
                        rating: pairing.b_rating,
                    },
                }),
            )
            .await;
        self.sessions
            .send_to(
                pairing.b_session,
                ServerMessage::MatchFound(MatchFound {
                    opponent: UserSummary {
                        user_id: pairing.a_user.to_string(),
                        username: pairing.a_username.clone(),
                        rating: pairing.a_rating,
                    },
                }),
            )
            .await;

        self.games
            .start_pvp_game(
                pairing.a_session,
                pairing.a_user,
                pairing.a_username,
                pairing.a_rating,
                pairing.b_session,
                pairing.b_user,
                pairing.b_username,
                pairing.b_rating,
            )
            .await;
    }

    async fn require_authenticated(
        &self,
        session_id: SessionId,
        session: &crate::network::session::SessionSnapshot,
        context: &str,
    ) -> Option<crate::network::session::SessionUser> {
        match session.state {
            SessionState::Authenticated => session.user.clone(),
            SessionState::InGame => {
                self.reply_error(session_id, context, &StateError::AlreadyInGame.to_string()).await;
                None
            }
            SessionState::Connected => {
                self.reply_error(session_id, context, &StateError::NotAuthenticated.to_string()).await;
                None
            }
        }
    }

    async fn require_in_game(
        &self,
        session_id: SessionId,
        session: &crate::network::session::SessionSnapshot,
        context: &str,
        game_id: &str,
    ) -> Option<Uuid> {
        if session.state != SessionState::InGame {
            self.reply_error(session_id, context, &StateError::NotInGame.to_string()).await;
            return None;
        }
        let Ok(game_id) = Uuid::parse_str(game_id) else {
            self.reply_error(session_id, context, &DomainError::GameNotFound.to_string()).await;
            return None;
        };
        if session.current_game_id != Some(game_id) {
            self.reply_error(session_id, context, "not your game").await;
            return None;
        }
        Some(game_id)
    }

    async fn reply_error(&self, session_id: SessionId, context: &str, reason: &str) {
        self.sessions
            .send_to(
                session_id,
                ServerMessage::Error(ErrorReply {
                    context: context.to_string(),
                    reason: reason.to_string(),
                }),
            )
            .await;
    }
}

/// Maps a `Matchmaker` failure onto the wire-facing `DomainError` vocabulary
/// (spec.md §7) wherever one applies; `NotQueued` has no domain counterpart
/// so it keeps its own message.
fn domain_reason(error: MatchmakerError) -> String {
    match error {
        MatchmakerError::AlreadyQueued => DomainError::AlreadyQueued.to_string(),
        MatchmakerError::SelfChallenge => DomainError::SelfChallenge.to_string(),
        MatchmakerError::DuplicateChallenge => DomainError::DuplicateChallenge.to_string(),
        MatchmakerError::TargetUnavailable => DomainError::TargetUnavailable.to_string(),
        MatchmakerError::NoSuchChallenge => DomainError::NoSuchChallenge.to_string(),
        MatchmakerError::NotQueued => error.to_string(),
    }
}
