//! # Chess Arbiter Server
//!
//! Authoritative network core for an online chess service: clients connect
//! over a custom framed TCP protocol, authenticate, enter a game through
//! random matchmaking or a direct challenge, and play it out through a
//! server-validated rules engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CHESS ARBITER SERVER                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  network/        - Transport, sessions, routing              │
//! │  ├── codec.rs     - Framed wire protocol                     │
//! │  ├── protocol.rs  - Client/server message types               │
//! │  ├── session.rs   - Session registry and state machine        │
//! │  ├── auth.rs      - Registration and login                    │
//! │  ├── matchmaker.rs- Random-pairing queue and challenges        │
//! │  ├── presence.rs  - Debounced online-users broadcast           │
//! │  ├── dispatcher.rs- Routes decoded messages to handlers        │
//! │  └── server.rs    - TCP accept loop and coordinator            │
//! │                                                              │
//! │  game/           - Chess rules and persistence glue           │
//! │  ├── engine.rs    - Facade over the `chess` crate              │
//! │  ├── controller.rs- Active-game map, move/draw/resign logic   │
//! │  ├── rating.rs    - Elo update                                │
//! │  └── ai.rs        - Synthetic opponent                        │
//! │                                                              │
//! │  repository/     - Persistent store                          │
//! │  config.rs       - Environment-driven configuration            │
//! │  error.rs        - Error taxonomy                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency model
//!
//! Session, matchmaker, and game state are each owned by a single
//! component behind an `RwLock`. Handlers never hold one of those locks
//! across a persistence call or an AI-move request: they stage the
//! mutation, release the lock, await the external call, then re-acquire
//! to commit. This keeps the server responsive under concurrent
//! connections without a single giant lock serializing unrelated games.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod repository;

pub use config::Config;
pub use network::server::{GameServer, GameServerError, ServerHandle};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
