//! Persisted document shapes (spec.md §6 "Persistent state layout").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `users` collection document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub rating: i32,
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            rating: 1200,
            games: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Active,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    WhiteWin,
    BlackWin,
    Draw,
}

/// `games` collection document. Also the live, in-memory representation of
/// an active game held by the Game Controller (spec.md §3 "Game").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub white_player_id: Uuid,
    /// Absent for games against the synthetic AI opponent (spec.md §4.10).
    pub black_player_id: Option<Uuid>,
    pub white_username: String,
    pub black_username: String,
    pub moves: Vec<String>,
    pub pgn: String,
    pub fen: String,
    pub status: GameStatus,
    pub result: Option<GameOutcome>,
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_offer: Option<DrawOfferState>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Which color currently has an outstanding draw offer, if any. Not part of
/// the persisted `games` document shape but tracked alongside the live
/// `Game` in memory; harmless to carry through on full-document writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawOfferState {
    White,
    Black,
}

impl Game {
    pub const INITIAL_FEN: &'static str =
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    pub fn new_pvp(
        white_player_id: Uuid,
        white_username: String,
        black_player_id: Uuid,
        black_username: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            white_player_id,
            black_player_id: Some(black_player_id),
            white_username,
            black_username,
            moves: Vec::new(),
            pgn: String::new(),
            fen: Self::INITIAL_FEN.to_string(),
            status: GameStatus::Active,
            result: None,
            cause: None,
            draw_offer: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn new_vs_ai(white_player_id: Uuid, white_username: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            white_player_id,
            black_player_id: None,
            white_username,
            black_username: "AI".to_string(),
            moves: Vec::new(),
            pgn: String::new(),
            fen: Self::INITIAL_FEN.to_string(),
            status: GameStatus::Active,
            result: None,
            cause: None,
            draw_offer: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}
