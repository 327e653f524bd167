//! `mongodb`-backed `Repository`, the production implementation of the
//! `users`/`games` collections described in spec.md §6.

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::{Client, Collection, Database};
use uuid::Uuid;

use super::models::{Game, GameOutcome, GameStatus, User};
use super::{PlayerOutcome, Repository};
use crate::error::PersistenceError;

pub struct MongoRepository {
    db: Database,
}

impl MongoRepository {
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, PersistenceError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(db_name),
        })
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    fn games(&self) -> Collection<Game> {
        self.db.collection("games")
    }
}

#[async_trait]
impl Repository for MongoRepository {
    async fn create_user(&self, user: User) -> Result<(), PersistenceError> {
        self.users().insert_one(user, None).await?;
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, PersistenceError> {
        Ok(self
            .users()
            .find_one(doc! { "username": username }, None)
            .await?)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, PersistenceError> {
        Ok(self.users().find_one(doc! { "_id": id }, None).await?)
    }

    async fn update_user_after_game(
        &self,
        id: Uuid,
        new_rating: i32,
        outcome: PlayerOutcome,
    ) -> Result<(), PersistenceError> {
        let counter_field = match outcome {
            PlayerOutcome::Win => "wins",
            PlayerOutcome::Loss => "losses",
            PlayerOutcome::Draw => "draws",
        };
        let result = self
            .users()
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": { "rating": new_rating },
                    "$inc": { "games": 1, counter_field: 1 },
                },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistenceError::NotFound);
        }
        Ok(())
    }

    async fn create_game(&self, game: Game) -> Result<(), PersistenceError> {
        self.games().insert_one(game, None).await?;
        Ok(())
    }

    async fn append_move(&self, game_id: Uuid, mv: &str, fen: &str) -> Result<(), PersistenceError> {
        let result = self
            .games()
            .update_one(
                doc! { "_id": game_id },
                doc! {
                    "$push": { "moves": mv },
                    "$set": { "fen": fen, "draw_offer": mongodb::bson::Bson::Null },
                },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistenceError::NotFound);
        }
        Ok(())
    }

    async fn complete_game(
        &self,
        game_id: Uuid,
        pgn: String,
        result: GameOutcome,
        cause: String,
    ) -> Result<(), PersistenceError> {
        let update = self
            .games()
            .update_one(
                doc! { "_id": game_id },
                doc! {
                    "$set": {
                        "status": mongodb::bson::to_bson(&GameStatus::Completed).unwrap(),
                        "result": mongodb::bson::to_bson(&result).unwrap(),
                        "cause": cause,
                        "pgn": pgn,
                        "end_time": Utc::now(),
                    }
                },
                None,
            )
            .await?;
        if update.matched_count == 0 {
            return Err(PersistenceError::NotFound);
        }
        Ok(())
    }

    async fn abort_game(&self, game_id: Uuid) -> Result<(), PersistenceError> {
        let update = self
            .games()
            .update_one(
                doc! { "_id": game_id },
                doc! {
                    "$set": {
                        "status": mongodb::bson::to_bson(&GameStatus::Aborted).unwrap(),
                        "end_time": Utc::now(),
                    }
                },
                None,
            )
            .await?;
        if update.matched_count == 0 {
            return Err(PersistenceError::NotFound);
        }
        Ok(())
    }

    async fn find_game(&self, game_id: Uuid) -> Result<Option<Game>, PersistenceError> {
        Ok(self.games().find_one(doc! { "_id": game_id }, None).await?)
    }
}
