//! Repository (spec.md §3, §6): persistence for `User` and `Game`.
//!
//! A narrow trait keeps the Game Controller and Auth Service from depending
//! on a concrete store, the same boundary spec.md §1 draws around the
//! persistent store as an external collaborator. `mongo` is the production
//! implementation; `memory` backs unit and scenario tests.

pub mod memory;
pub mod models;
pub mod mongo;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PersistenceError;
use models::{Game, GameOutcome, User};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_user(&self, user: User) -> Result<(), PersistenceError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, PersistenceError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, PersistenceError>;

    /// Applied atomically with game finalization (spec.md §3 "User").
    async fn update_user_after_game(
        &self,
        id: Uuid,
        new_rating: i32,
        outcome: PlayerOutcome,
    ) -> Result<(), PersistenceError>;

    async fn create_game(&self, game: Game) -> Result<(), PersistenceError>;

    /// Append-only move write, durable before the controller broadcasts
    /// (spec.md §4.8).
    async fn append_move(&self, game_id: Uuid, mv: &str, fen: &str) -> Result<(), PersistenceError>;

    async fn complete_game(
        &self,
        game_id: Uuid,
        pgn: String,
        result: GameOutcome,
        cause: String,
    ) -> Result<(), PersistenceError>;

    /// Marks a game `Aborted` (spec.md §7: termination-commit failure after
    /// the in-memory transition already happened).
    async fn abort_game(&self, game_id: Uuid) -> Result<(), PersistenceError>;

    async fn find_game(&self, game_id: Uuid) -> Result<Option<Game>, PersistenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerOutcome {
    Win,
    Loss,
    Draw,
}
