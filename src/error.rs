//! Top-level error taxonomy.
//!
//! Each variant corresponds to one of the error kinds in the design: framing
//! and payload errors are fatal to the connection, everything else is
//! answered with a typed reply while the session stays open.

use thiserror::Error;

/// Errors surfaced by the frame codec.
///
/// Always fatal: the connection task tears the session down after logging
/// the cause.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload of {0} bytes exceeds the maximum frame size")]
    PayloadTooLarge(usize),

    #[error("receive buffer exceeded the maximum backlog")]
    BufferOverflow,

    #[error("connection closed with a truncated frame in flight")]
    TruncatedFrame,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A frame decoded fine but its payload didn't match the shape the message
/// id expects. The session survives; the caller gets a typed error reply.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid JSON for message {message_id:#06x}: {source}")]
    InvalidJson {
        message_id: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown message id {0:#06x}")]
    UnknownMessageId(u16),
}

/// The operation is forbidden given the session's or game's current state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("must authenticate first")]
    NotAuthenticated,

    #[error("already authenticated")]
    AlreadyAuthenticated,

    #[error("not in a game")]
    NotInGame,

    #[error("already in a game")]
    AlreadyInGame,

    #[error("not your turn")]
    NotYourTurn,
}

/// Game/matchmaking business-rule violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("illegal move")]
    IllegalMove,

    #[error("cannot challenge yourself")]
    SelfChallenge,

    #[error("already queued or in a game")]
    AlreadyQueued,

    #[error("a challenge is already outstanding")]
    DuplicateChallenge,

    #[error("target is not available")]
    TargetUnavailable,

    #[error("no challenge found for that sender")]
    NoSuchChallenge,

    #[error("no draw offer is outstanding")]
    NoDrawOffer,

    #[error("game not found")]
    GameNotFound,
}

/// Authentication failures. Per spec.md §4.4/§7, unknown-user and
/// bad-credentials collapse to the same wire-level result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("unknown user")]
    UnknownUser,

    #[error("bad credentials")]
    BadCredentials,

    #[error("username already taken")]
    UsernameTaken,

    #[error("already authenticated")]
    AlreadyAuthenticated,

    #[error("password hashing failed: {0}")]
    HashingFailed(String),
}

/// A write to the repository failed at a point where correctness depends on
/// it landing (game termination, rating update).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("repository error: {0}")]
    Backend(#[from] mongodb::error::Error),

    #[error("record not found")]
    NotFound,
}

/// Session Registry failures (spec.md §4.2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("user not online")]
    UserNotOnline,
}

/// Matchmaker failures (spec.md §4.6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchmakerError {
    #[error("already queued or in a game")]
    AlreadyQueued,

    #[error("not currently queued")]
    NotQueued,

    #[error("cannot challenge yourself")]
    SelfChallenge,

    #[error("target is not available")]
    TargetUnavailable,

    #[error("a challenge is already outstanding")]
    DuplicateChallenge,

    #[error("no matching challenge")]
    NoSuchChallenge,
}
