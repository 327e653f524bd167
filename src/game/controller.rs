//! Game Controller (spec.md §4.8, §4.9, §4.10).
//!
//! Owns the map of active games. Every handler here stages its engine call,
//! releases the map lock, makes the one blocking call it needs (persistence
//! or an AI request per spec.md §5), then re-enters to commit the in-memory
//! mutation and broadcast — handlers never hold the map lock across an
//! `.await` that leaves this module.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::ai::AiProvider;
use super::engine::{self, Position, Status as EngineStatus};
use super::rating::{self, Outcome as RatingOutcome};
use crate::error::{DomainError, StateError};
use crate::network::protocol::{
    Color, Difficulty, ErrorReply, GameOver, GameResult, GameStart, GameStateUpdate, InvalidMove,
    ServerMessage, UserSummary,
};
use crate::network::session::{GameId, SessionId, SessionRegistry, UserId};
use crate::repository::models::GameOutcome;
use crate::repository::{models::Game as PersistedGame, PlayerOutcome, Repository};

struct PlayerInfo {
    user_id: UserId,
    username: String,
    rating: i32,
    session_id: Option<SessionId>,
}

struct ActiveGame {
    game_id: GameId,
    white: PlayerInfo,
    black: Option<PlayerInfo>,
    position: Position,
    moves: Vec<String>,
    /// Color with an outstanding draw offer, if any (spec.md §3 "Game"
    /// draw-offer state). Cleared by any accepted move.
    draw_offer: Option<Color>,
    is_ai_game: bool,
    ai_difficulty: Option<Difficulty>,
}

impl ActiveGame {
    fn color_of(&self, session_id: SessionId) -> Option<Color> {
        if self.white.session_id == Some(session_id) {
            Some(Color::White)
        } else if self.black.as_ref().and_then(|b| b.session_id) == Some(session_id) {
            Some(Color::Black)
        } else {
            None
        }
    }

    fn session_for(&self, color: Color) -> Option<SessionId> {
        match color {
            Color::White => self.white.session_id,
            Color::Black => self.black.as_ref().and_then(|b| b.session_id),
        }
    }
}

pub struct GameController {
    games: RwLock<HashMap<GameId, ActiveGame>>,
    repo: Arc<dyn Repository>,
    sessions: Arc<SessionRegistry>,
    ai: Arc<dyn AiProvider>,
}

impl GameController {
    pub fn new(repo: Arc<dyn Repository>, sessions: Arc<SessionRegistry>, ai: Arc<dyn AiProvider>) -> Arc<Self> {
        Arc::new(Self {
            games: RwLock::new(HashMap::new()),
            repo,
            sessions,
            ai,
        })
    }

    pub async fn active_game_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Start a PvP game for a pairing the Matchmaker just committed.
    #[instrument(skip(self))]
    pub async fn start_pvp_game(
        &self,
        white_session: SessionId,
        white_user: UserId,
        white_username: String,
        white_rating: i32,
        black_session: SessionId,
        black_user: UserId,
        black_username: String,
        black_rating: i32,
    ) -> GameId {
        let persisted = PersistedGame::new_pvp(
            white_user,
            white_username.clone(),
            black_user,
            black_username.clone(),
        );
        let game_id = persisted.id;

        if let Err(e) = self.repo.create_game(persisted).await {
            error!(error = %e, "failed to persist new pvp game");
        }

        let active = ActiveGame {
            game_id,
            white: PlayerInfo {
                user_id: white_user,
                username: white_username.clone(),
                rating: white_rating,
                session_id: Some(white_session),
            },
            black: Some(PlayerInfo {
                user_id: black_user,
                username: black_username.clone(),
                rating: black_rating,
                session_id: Some(black_session),
            }),
            position: engine::new_initial_position(),
            moves: Vec::new(),
            draw_offer: None,
            is_ai_game: false,
            ai_difficulty: None,
        };
        self.games.write().await.insert(game_id, active);

        let _ = self.sessions.enter_game(white_session, game_id).await;
        let _ = self.sessions.enter_game(black_session, game_id).await;

        let fen = engine::fen(&engine::new_initial_position());
        self.sessions
            .send_to(
                white_session,
                ServerMessage::GameStart(GameStart {
                    game_id: game_id.to_string(),
                    color: Color::White,
                    fen: fen.clone(),
                    opponent: UserSummary {
                        user_id: black_user.to_string(),
                        username: black_username,
                        rating: black_rating,
                    },
                }),
            )
            .await;
        self.sessions
            .send_to(
                black_session,
                ServerMessage::GameStart(GameStart {
                    game_id: game_id.to_string(),
                    color: Color::Black,
                    fen,
                    opponent: UserSummary {
                        user_id: white_user.to_string(),
                        username: white_username,
                        rating: white_rating,
                    },
                }),
            )
            .await;

        info!(%game_id, "pvp game started");
        game_id
    }

    /// Start a game against the synthetic AI opponent (spec.md §4.10).
    #[instrument(skip(self))]
    pub async fn start_ai_game(
        &self,
        white_session: SessionId,
        white_user: UserId,
        white_username: String,
        white_rating: i32,
        difficulty: Difficulty,
    ) -> GameId {
        let persisted = PersistedGame::new_vs_ai(white_user, white_username.clone());
        let game_id = persisted.id;

        if let Err(e) = self.repo.create_game(persisted).await {
            error!(error = %e, "failed to persist new ai game");
        }

        let active = ActiveGame {
            game_id,
            white: PlayerInfo {
                user_id: white_user,
                username: white_username,
                rating: white_rating,
                session_id: Some(white_session),
            },
            black: None,
            position: engine::new_initial_position(),
            moves: Vec::new(),
            draw_offer: None,
            is_ai_game: true,
            ai_difficulty: Some(difficulty),
        };
        self.games.write().await.insert(game_id, active);
        let _ = self.sessions.enter_game(white_session, game_id).await;

        let fen = engine::fen(&engine::new_initial_position());
        self.sessions
            .send_to(
                white_session,
                ServerMessage::GameStart(GameStart {
                    game_id: game_id.to_string(),
                    color: Color::White,
                    fen,
                    opponent: UserSummary {
                        user_id: Uuid::nil().to_string(),
                        username: "AI".to_string(),
                        rating: 0,
                    },
                }),
            )
            .await;

        info!(%game_id, "ai game started");
        game_id
    }

    #[instrument(skip(self, mv))]
    pub async fn make_move(&self, mover_session: SessionId, game_id: GameId, mv: String) {
        let staged = {
            let games = self.games.read().await;
            let game = match games.get(&game_id) {
                Some(g) => g,
                None => {
                    self.reply_invalid(mover_session, &DomainError::GameNotFound.to_string()).await;
                    return;
                }
            };
            let mover_color = match game.color_of(mover_session) {
                Some(c) => c,
                None => {
                    self.reply_invalid(mover_session, &StateError::NotYourTurn.to_string()).await;
                    return;
                }
            };
            if engine::turn(&game.position) != mover_color {
                self.reply_invalid(mover_session, &StateError::NotYourTurn.to_string()).await;
                return;
            }
            match engine::apply_uci(&game.position, &mv) {
                Ok(new_position) => new_position,
                Err(_) => {
                    self.reply_invalid(mover_session, &DomainError::IllegalMove.to_string()).await;
                    return;
                }
            }
        };

        let fen = engine::fen(&staged);
        if let Err(e) = self.repo.append_move(game_id, &mv, &fen).await {
            error!(error = %e, %game_id, "failed to persist move");
            self.reply_invalid(mover_session, "internal error").await;
            return;
        }

        let (white_session, black_session, status, is_ai_game, ai_difficulty, turn) = {
            let mut games = self.games.write().await;
            let game = match games.get_mut(&game_id) {
                Some(g) => g,
                None => return,
            };
            game.position = staged;
            game.moves.push(mv.clone());
            game.draw_offer = None;
            let status = engine::status(&game.position);
            let turn = engine::turn(&game.position);
            (
                game.white.session_id,
                game.black.as_ref().and_then(|b| b.session_id),
                status,
                game.is_ai_game,
                game.ai_difficulty,
                turn,
            )
        };

        let update = ServerMessage::GameStateUpdate(GameStateUpdate {
            game_id: game_id.to_string(),
            fen: fen.clone(),
            last_move: mv,
            turn,
        });
        if let Some(s) = white_session {
            self.sessions.send_to(s, update.clone()).await;
        }
        if let Some(s) = black_session {
            self.sessions.send_to(s, update).await;
        }

        if status != EngineStatus::Ongoing {
            self.terminate(game_id, status, TerminationCause::Natural).await;
            return;
        }

        if is_ai_game {
            self.request_ai_move(game_id, ai_difficulty.unwrap_or(Difficulty::Medium), fen)
                .await;
        }
    }

    async fn request_ai_move(&self, game_id: GameId, difficulty: Difficulty, fen: String) {
        let ai = self.ai.clone();
        let white_session = {
            let games = self.games.read().await;
            games.get(&game_id).map(|g| g.white.session_id)
        };
        let Some(Some(white_session)) = white_session else {
            return;
        };

        match ai.request_move(&fen, difficulty).await {
            Ok(mv) => {
                // AI plays the side to move, which at this point is black.
                self.apply_ai_move(game_id, mv).await;
            }
            Err(e) => {
                warn!(error = ?e, %game_id, "AI provider could not produce a move");
                self.sessions
                    .send_to(
                        white_session,
                        ServerMessage::InvalidMove(InvalidMove {
                            reason: "AI opponent could not move".to_string(),
                        }),
                    )
                    .await;
            }
        }
    }

    async fn apply_ai_move(&self, game_id: GameId, mv: String) {
        let staged = {
            let games = self.games.read().await;
            let game = match games.get(&game_id) {
                Some(g) => g,
                None => return,
            };
            match engine::apply_uci(&game.position, &mv) {
                Ok(pos) => pos,
                Err(_) => return,
            }
        };

        let fen = engine::fen(&staged);
        if let Err(e) = self.repo.append_move(game_id, &mv, &fen).await {
            error!(error = %e, %game_id, "failed to persist AI move");
            return;
        }

        let (white_session, status) = {
            let mut games = self.games.write().await;
            let game = match games.get_mut(&game_id) {
                Some(g) => g,
                None => return,
            };
            game.position = staged;
            game.moves.push(mv.clone());
            game.draw_offer = None;
            (game.white.session_id, engine::status(&game.position))
        };

        if let Some(s) = white_session {
            self.sessions
                .send_to(
                    s,
                    ServerMessage::GameStateUpdate(GameStateUpdate {
                        game_id: game_id.to_string(),
                        fen: fen.clone(),
                        last_move: mv,
                        turn: Color::White,
                    }),
                )
                .await;
        }

        if status != EngineStatus::Ongoing {
            self.terminate(game_id, status, TerminationCause::Natural).await;
        }
    }

    pub async fn resign(&self, session_id: SessionId, game_id: GameId) {
        let color = {
            let games = self.games.read().await;
            games.get(&game_id).and_then(|g| g.color_of(session_id))
        };
        let Some(color) = color else { return };
        self.terminate(
            game_id,
            EngineStatus::Checkmate(color),
            TerminationCause::Resignation,
        )
        .await;
    }

    /// A disconnect while InGame is treated as resignation by that side
    /// (spec.md §5).
    pub async fn handle_disconnect(&self, session_id: SessionId) {
        let game_id = {
            let games = self.games.read().await;
            games
                .values()
                .find(|g| g.color_of(session_id).is_some())
                .map(|g| g.game_id)
        };
        if let Some(game_id) = game_id {
            self.resign(session_id, game_id).await;
        }
    }

    /// Records `OfferedBy(color)` unless the other color has already
    /// offered, in which case this is an implicit accept; re-offering from
    /// the same color with nothing outstanding from the other side is a
    /// no-op (spec.md §4.8, §8).
    pub async fn offer_draw(&self, session_id: SessionId, game_id: GameId) {
        enum Outcome {
            ImplicitAccept,
            Offered(SessionId),
            NoOp,
        }

        let outcome = {
            let mut games = self.games.write().await;
            let Some(game) = games.get_mut(&game_id) else {
                return;
            };
            let Some(color) = game.color_of(session_id) else {
                return;
            };
            match game.draw_offer {
                Some(existing) if existing == color => Outcome::NoOp,
                Some(_) => Outcome::ImplicitAccept,
                None => {
                    game.draw_offer = Some(color);
                    match game.session_for(color.opposite()) {
                        Some(other) => Outcome::Offered(other),
                        None => Outcome::NoOp,
                    }
                }
            }
        };

        match outcome {
            Outcome::NoOp => {}
            Outcome::Offered(other_session) => {
                self.sessions
                    .send_to(other_session, ServerMessage::DrawOfferReceived)
                    .await;
            }
            Outcome::ImplicitAccept => {
                self.terminate(game_id, EngineStatus::Stalemate, TerminationCause::Agreement)
                    .await;
            }
        }
    }

    /// Only valid when an offer from the other color is outstanding
    /// (spec.md §4.8); otherwise a typed error reply (spec.md §7
    /// DomainError::NoDrawOffer) and the game is left untouched.
    pub async fn accept_draw(&self, session_id: SessionId, game_id: GameId) {
        let valid = {
            let games = self.games.read().await;
            games.get(&game_id).is_some_and(|g| {
                g.color_of(session_id)
                    .is_some_and(|color| g.draw_offer == Some(color.opposite()))
            })
        };
        if !valid {
            self.sessions
                .send_to(
                    session_id,
                    ServerMessage::Error(ErrorReply {
                        context: "accept_draw".to_string(),
                        reason: DomainError::NoDrawOffer.to_string(),
                    }),
                )
                .await;
            return;
        }
        self.terminate(game_id, EngineStatus::Stalemate, TerminationCause::Agreement)
            .await;
    }

    /// Clears any outstanding offer and notifies both sides. A second
    /// decline with nothing outstanding is a no-op (spec.md §8).
    pub async fn decline_draw(&self, session_id: SessionId, game_id: GameId) {
        let sessions = {
            let mut games = self.games.write().await;
            let Some(game) = games.get_mut(&game_id) else {
                return;
            };
            if game.color_of(session_id).is_none() || game.draw_offer.is_none() {
                return;
            }
            game.draw_offer = None;
            (game.white.session_id, game.black.as_ref().and_then(|b| b.session_id))
        };
        if let Some(s) = sessions.0 {
            self.sessions.send_to(s, ServerMessage::DrawOfferDeclined).await;
        }
        if let Some(s) = sessions.1 {
            self.sessions.send_to(s, ServerMessage::DrawOfferDeclined).await;
        }
    }

    async fn reply_invalid(&self, session_id: SessionId, reason: &str) {
        self.sessions
            .send_to(
                session_id,
                ServerMessage::InvalidMove(InvalidMove {
                    reason: reason.to_string(),
                }),
            )
            .await;
    }

    /// Termination sequence (spec.md §4.8), executed exactly once per game.
    #[instrument(skip(self))]
    async fn terminate(&self, game_id: GameId, status: EngineStatus, cause: TerminationCause) {
        let removed = self.games.write().await.remove(&game_id);
        let Some(game) = removed else { return };

        let (result, cause_str) = resolve_result(status, cause);

        if !game.is_ai_game {
            if let Some(black) = &game.black {
                let (white_outcome, black_outcome) = match result {
                    GameResult::WhiteWin => (RatingOutcome::Win, RatingOutcome::Loss),
                    GameResult::BlackWin => (RatingOutcome::Loss, RatingOutcome::Win),
                    GameResult::Draw => (RatingOutcome::Draw, RatingOutcome::Draw),
                };
                let white_new = rating::update_rating(game.white.rating, black.rating, white_outcome);
                let black_new = rating::update_rating(black.rating, game.white.rating, black_outcome);

                if let Err(e) = self
                    .repo
                    .update_user_after_game(game.white.user_id, white_new, to_player_outcome(white_outcome))
                    .await
                {
                    error!(error = %e, %game_id, "failed to persist white rating update");
                }
                if let Err(e) = self
                    .repo
                    .update_user_after_game(black.user_id, black_new, to_player_outcome(black_outcome))
                    .await
                {
                    error!(error = %e, %game_id, "failed to persist black rating update");
                }
            }
        }

        let persisted_outcome = match result {
            GameResult::WhiteWin => GameOutcome::WhiteWin,
            GameResult::BlackWin => GameOutcome::BlackWin,
            GameResult::Draw => GameOutcome::Draw,
        };
        let pgn = render_pgn(&game.moves);
        if let Err(e) = self
            .repo
            .complete_game(game_id, pgn, persisted_outcome, cause_str.clone())
            .await
        {
            error!(error = %e, %game_id, "failed to persist game completion; marking aborted");
            let _ = self.repo.abort_game(game_id).await;
        }

        let game_over = ServerMessage::GameOver(GameOver {
            game_id: game_id.to_string(),
            result,
            cause: cause_str,
        });
        if let Some(s) = game.white.session_id {
            self.sessions.send_to(s, game_over.clone()).await;
            let _ = self.sessions.leave_game(s).await;
        }
        if let Some(black) = &game.black {
            if let Some(s) = black.session_id {
                self.sessions.send_to(s, game_over).await;
                let _ = self.sessions.leave_game(s).await;
            }
        }

        info!(%game_id, ?result, "game terminated");
    }
}

#[derive(Debug, Clone, Copy)]
enum TerminationCause {
    Natural,
    Resignation,
    Agreement,
}

fn resolve_result(status: EngineStatus, cause: TerminationCause) -> (GameResult, String) {
    match cause {
        TerminationCause::Resignation => {
            // `status` carries the resigning color packed as Checkmate(color).
            let resigning = match status {
                EngineStatus::Checkmate(c) => c,
                _ => Color::White,
            };
            let result = match resigning {
                Color::White => GameResult::BlackWin,
                Color::Black => GameResult::WhiteWin,
            };
            (result, "resignation".to_string())
        }
        TerminationCause::Agreement => (GameResult::Draw, "agreement".to_string()),
        TerminationCause::Natural => match status {
            EngineStatus::Checkmate(loser) => {
                let result = match loser {
                    Color::White => GameResult::BlackWin,
                    Color::Black => GameResult::WhiteWin,
                };
                (result, "checkmate".to_string())
            }
            EngineStatus::Stalemate => (GameResult::Draw, "stalemate".to_string()),
            EngineStatus::InsufficientMaterial => {
                (GameResult::Draw, "insufficient_material".to_string())
            }
            EngineStatus::FiftyMove => (GameResult::Draw, "fifty_move_rule".to_string()),
            EngineStatus::ThreefoldRepetition => {
                (GameResult::Draw, "threefold_repetition".to_string())
            }
            EngineStatus::Ongoing => (GameResult::Draw, "aborted".to_string()),
        },
    }
}

/// Movetext in numbered pairs from the UCI move list (spec.md §4.8
/// "persists Game as Completed with ... move list (as PGN)"). `chess`
/// exposes legality and status, not SAN rendering, so this is plain UCI
/// movetext rather than full algebraic PGN — sufficient to replay the game
/// and satisfies spec.md §8 invariant 4 without pulling in a second chess
/// library just for notation.
fn render_pgn(moves: &[String]) -> String {
    moves
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| match pair {
            [white, black] => format!("{}. {} {}", i + 1, white, black),
            [white] => format!("{}. {}", i + 1, white),
            _ => unreachable!("chunks(2) never yields more than two items"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn to_player_outcome(outcome: RatingOutcome) -> PlayerOutcome {
    match outcome {
        RatingOutcome::Win => PlayerOutcome::Win,
        RatingOutcome::Loss => PlayerOutcome::Loss,
        RatingOutcome::Draw => PlayerOutcome::Draw,
    }
}
