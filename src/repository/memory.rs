//! In-memory `Repository`, used by unit tests and `tests/scenarios.rs`, in
//! the same spirit as the teacher's in-process `SessionManager` test
//! fixtures rather than a mocking library.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::models::{Game, GameOutcome, GameStatus, User};
use super::{PlayerOutcome, Repository};
use crate::error::PersistenceError;

#[derive(Default)]
pub struct MemoryRepository {
    users: Mutex<HashMap<Uuid, User>>,
    games: Mutex<HashMap<Uuid, Game>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: User) -> Result<(), PersistenceError> {
        self.users.lock().unwrap().insert(user.id, user);
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, PersistenceError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, PersistenceError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn update_user_after_game(
        &self,
        id: Uuid,
        new_rating: i32,
        outcome: PlayerOutcome,
    ) -> Result<(), PersistenceError> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(PersistenceError::NotFound)?;
        user.rating = new_rating;
        user.games += 1;
        match outcome {
            PlayerOutcome::Win => user.wins += 1,
            PlayerOutcome::Loss => user.losses += 1,
            PlayerOutcome::Draw => user.draws += 1,
        }
        Ok(())
    }

    async fn create_game(&self, game: Game) -> Result<(), PersistenceError> {
        self.games.lock().unwrap().insert(game.id, game);
        Ok(())
    }

    async fn append_move(&self, game_id: Uuid, mv: &str, fen: &str) -> Result<(), PersistenceError> {
        let mut games = self.games.lock().unwrap();
        let game = games.get_mut(&game_id).ok_or(PersistenceError::NotFound)?;
        game.moves.push(mv.to_string());
        game.fen = fen.to_string();
        game.draw_offer = None;
        Ok(())
    }

    async fn complete_game(
        &self,
        game_id: Uuid,
        pgn: String,
        result: GameOutcome,
        cause: String,
    ) -> Result<(), PersistenceError> {
        let mut games = self.games.lock().unwrap();
        let game = games.get_mut(&game_id).ok_or(PersistenceError::NotFound)?;
        game.status = GameStatus::Completed;
        game.result = Some(result);
        game.cause = Some(cause);
        game.pgn = pgn;
        game.end_time = Some(chrono::Utc::now());
        Ok(())
    }

    async fn abort_game(&self, game_id: Uuid) -> Result<(), PersistenceError> {
        let mut games = self.games.lock().unwrap();
        let game = games.get_mut(&game_id).ok_or(PersistenceError::NotFound)?;
        game.status = GameStatus::Aborted;
        game.end_time = Some(chrono::Utc::now());
        Ok(())
    }

    async fn find_game(&self, game_id: Uuid) -> Result<Option<Game>, PersistenceError> {
        Ok(self.games.lock().unwrap().get(&game_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_find_user_round_trips() {
        let repo = MemoryRepository::new();
        let user = User::new("alice".into(), "hash".into());
        let id = user.id;
        repo.create_user(user).await.unwrap();

        let found = repo.find_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.rating, 1200);
    }

    #[tokio::test]
    async fn update_after_game_increments_counters() {
        let repo = MemoryRepository::new();
        let user = User::new("alice".into(), "hash".into());
        let id = user.id;
        repo.create_user(user).await.unwrap();

        repo.update_user_after_game(id, 1216, PlayerOutcome::Win)
            .await
            .unwrap();

        let found = repo.find_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.rating, 1216);
        assert_eq!(found.wins, 1);
        assert_eq!(found.games, 1);
    }
}
