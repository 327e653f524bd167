//! AI Opponent delegation (spec.md §4.10).
//!
//! The AI move generator is an external collaborator per spec.md §1; this
//! module only defines the narrow async boundary the controller calls
//! through, plus a default provider so the server runs standalone. Requests
//! are off-loaded from the coordinator the same way spec.md §5 requires for
//! any blocking call: staged, awaited outside the lock, then re-entered to
//! apply the result.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use super::engine;
use crate::network::protocol::Difficulty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    #[error("the AI provider produced no legal move")]
    NoLegalMove,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Request the next move as a UCI string, given the current FEN.
    async fn request_move(&self, fen: &str, difficulty: Difficulty) -> Result<String, AiError>;
}

/// Picks a uniformly random legal move. A stand-in for a real engine
/// (stockfish-over-UCI, a model endpoint, etc.) behind the same trait;
/// difficulty is accepted but does not yet change behavior since there is
/// no search depth to tune without a real engine backing it.
pub struct RandomMoveAi;

#[async_trait]
impl AiProvider for RandomMoveAi {
    async fn request_move(&self, fen: &str, _difficulty: Difficulty) -> Result<String, AiError> {
        let pos = engine::position_from_fen(fen).map_err(|_| AiError::NoLegalMove)?;
        let moves = engine::legal_moves_uci(&pos);
        let mut rng = rand::thread_rng();
        moves.choose(&mut rng).cloned().ok_or(AiError::NoLegalMove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn random_ai_returns_a_legal_move_from_initial_position() {
        let ai = RandomMoveAi;
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let mv = ai.request_move(fen, Difficulty::Easy).await.unwrap();
        assert_eq!(mv.len(), 4);
    }
}
