//! Game logic: the external chess rule engine facade, the controller that
//! owns active games, rating updates, and AI-opponent delegation.
//!
//! - `engine`: Game Engine Facade (spec.md §4.7) — the sole caller into the
//!   `chess` crate.
//! - `controller`: Game Controller (spec.md §4.8) — move/resign/draw
//!   handlers, termination sequence, broadcast.
//! - `rating`: Elo rating update (spec.md §4.9).
//! - `ai`: AI Opponent delegation (spec.md §4.10).

pub mod ai;
pub mod controller;
pub mod engine;
pub mod rating;

pub use controller::GameController;
