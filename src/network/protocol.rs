//! Wire protocol messages.
//!
//! Wire format for client-server communication over the raw framed TCP
//! transport (`codec.rs`). All payloads are JSON objects; the message id
//! lives in the frame header, not in the JSON body, so payload structs carry
//! no internal tag.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Numeric message ids, normative per spec.md §6.
pub mod message_id {
    pub const REGISTER: u16 = 0x0001;
    pub const LOGIN: u16 = 0x0002;

    pub const FIND_MATCH: u16 = 0x0010;
    pub const CANCEL_FIND_MATCH: u16 = 0x0011;
    pub const FIND_AI_MATCH: u16 = 0x0012;

    pub const MAKE_MOVE: u16 = 0x0020;
    pub const RESIGN: u16 = 0x0021;
    pub const OFFER_DRAW: u16 = 0x0022;
    pub const ACCEPT_DRAW: u16 = 0x0023;
    pub const DECLINE_DRAW: u16 = 0x0024;

    pub const CHALLENGE: u16 = 0x0025;
    pub const ACCEPT_CHALLENGE: u16 = 0x0026;
    pub const DECLINE_CHALLENGE: u16 = 0x0027;

    pub const REGISTER_RESULT: u16 = 0x1001;
    pub const LOGIN_RESULT: u16 = 0x1002;
    /// Generic typed-error reply (spec.md §7 StateError/DomainError), used
    /// for handler preconditions and business-rule violations that don't
    /// have a message-specific reply shape of their own.
    pub const ERROR: u16 = 0x1003;
    pub const ONLINE_USERS_LIST: u16 = 0x1004;

    pub const MATCH_FOUND: u16 = 0x1100;
    pub const GAME_START: u16 = 0x1101;

    pub const GAME_STATE_UPDATE: u16 = 0x1200;
    pub const INVALID_MOVE: u16 = 0x1201;
    pub const GAME_OVER: u16 = 0x1202;
    pub const DRAW_OFFER_RECEIVED: u16 = 0x1203;
    pub const DRAW_OFFER_DECLINED: u16 = 0x1204;
    pub const CHALLENGE_RECEIVED: u16 = 0x1205;
    pub const CHALLENGE_ACCEPTED: u16 = 0x1206;
    pub const CHALLENGE_DECLINED: u16 = 0x1207;
}

/// A user summary embedded in several server push messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub rating: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

// ---------------------------------------------------------------------
// Client -> server payloads
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FindAiMatchPayload {
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengePayload {
    pub target_user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeResponsePayload {
    pub challenger_user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MakeMovePayload {
    pub game_id: String,
    #[serde(rename = "move")]
    pub mv: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameIdPayload {
    pub game_id: String,
}

/// A decoded, typed client message together with its opaque session-facing
/// payload. Built by [`ClientMessage::decode`] from a `(message_id, bytes)`
/// pair handed up by the frame codec.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Register(RegisterPayload),
    Login(LoginPayload),
    FindMatch,
    CancelFindMatch,
    FindAiMatch(FindAiMatchPayload),
    Challenge(ChallengePayload),
    AcceptChallenge(ChallengeResponsePayload),
    DeclineChallenge(ChallengeResponsePayload),
    MakeMove(MakeMovePayload),
    Resign(GameIdPayload),
    OfferDraw(GameIdPayload),
    AcceptDraw(GameIdPayload),
    DeclineDraw(GameIdPayload),
}

impl ClientMessage {
    /// Decode a payload given the message id from the frame header.
    ///
    /// Per spec.md §4.1/§7: non-UTF-8 or malformed JSON for a *known*
    /// message id is a [`DecodeError`], answered with a typed reply while
    /// the session stays open. An unknown message id is also a
    /// `DecodeError`, but the dispatcher's contract is to log and ignore it
    /// rather than reply.
    pub fn decode(message_id: u16, bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;

        fn parse<T: for<'de> Deserialize<'de>>(
            message_id: u16,
            text: &str,
        ) -> Result<T, DecodeError> {
            serde_json::from_str(text).map_err(|source| DecodeError::InvalidJson {
                message_id,
                source,
            })
        }

        use message_id as id;
        Ok(match message_id {
            id::REGISTER => ClientMessage::Register(parse(message_id, text)?),
            id::LOGIN => ClientMessage::Login(parse(message_id, text)?),
            id::FIND_MATCH => ClientMessage::FindMatch,
            id::CANCEL_FIND_MATCH => ClientMessage::CancelFindMatch,
            id::FIND_AI_MATCH => ClientMessage::FindAiMatch(parse(message_id, text)?),
            id::CHALLENGE => ClientMessage::Challenge(parse(message_id, text)?),
            id::ACCEPT_CHALLENGE => ClientMessage::AcceptChallenge(parse(message_id, text)?),
            id::DECLINE_CHALLENGE => ClientMessage::DeclineChallenge(parse(message_id, text)?),
            id::MAKE_MOVE => ClientMessage::MakeMove(parse(message_id, text)?),
            id::RESIGN => ClientMessage::Resign(parse(message_id, text)?),
            id::OFFER_DRAW => ClientMessage::OfferDraw(parse(message_id, text)?),
            id::ACCEPT_DRAW => ClientMessage::AcceptDraw(parse(message_id, text)?),
            id::DECLINE_DRAW => ClientMessage::DeclineDraw(parse(message_id, text)?),
            other => return Err(DecodeError::UnknownMessageId(other)),
        })
    }
}

// ---------------------------------------------------------------------
// Server -> client payloads
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
    /// Opaque session token (spec.md §4.4), a convenience for clients that
    /// want to persist a session across reconnects; the server itself never
    /// reads this back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnlineUsersList {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchFound {
    pub opponent: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStart {
    pub game_id: String,
    pub color: Color,
    pub fen: String,
    pub opponent: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStateUpdate {
    pub game_id: String,
    pub fen: String,
    pub last_move: String,
    pub turn: Color,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidMove {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameOver {
    pub game_id: String,
    pub result: GameResult,
    pub cause: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeReceived {
    pub sender: UserSummary,
}

/// A typed error reply for a StateError or DomainError (spec.md §7).
/// `context` names the request that failed (e.g. `"find_match"`,
/// `"challenge"`) so a single client-side handler can route the reason to
/// the right UI surface.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    pub context: String,
    pub reason: String,
}

/// A fully encoded server->client push, paired with its message id.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    RegisterResult(RegisterResult),
    LoginResult(LoginResult),
    OnlineUsersList(OnlineUsersList),
    MatchFound(MatchFound),
    GameStart(GameStart),
    GameStateUpdate(GameStateUpdate),
    InvalidMove(InvalidMove),
    GameOver(GameOver),
    DrawOfferReceived,
    DrawOfferDeclined,
    ChallengeReceived(ChallengeReceived),
    ChallengeAccepted,
    ChallengeDeclined,
    Error(ErrorReply),
}

impl ServerMessage {
    /// Encode to `(message_id, json_bytes)` ready for the frame codec.
    pub fn encode(&self) -> (u16, Vec<u8>) {
        use message_id as id;
        macro_rules! json {
            ($payload:expr) => {
                serde_json::to_vec($payload).expect("server payloads are always serializable")
            };
        }
        match self {
            ServerMessage::RegisterResult(p) => (id::REGISTER_RESULT, json!(p)),
            ServerMessage::LoginResult(p) => (id::LOGIN_RESULT, json!(p)),
            ServerMessage::OnlineUsersList(p) => (id::ONLINE_USERS_LIST, json!(p)),
            ServerMessage::MatchFound(p) => (id::MATCH_FOUND, json!(p)),
            ServerMessage::GameStart(p) => (id::GAME_START, json!(p)),
            ServerMessage::GameStateUpdate(p) => (id::GAME_STATE_UPDATE, json!(p)),
            ServerMessage::InvalidMove(p) => (id::INVALID_MOVE, json!(p)),
            ServerMessage::GameOver(p) => (id::GAME_OVER, json!(p)),
            ServerMessage::DrawOfferReceived => (id::DRAW_OFFER_RECEIVED, b"{}".to_vec()),
            ServerMessage::DrawOfferDeclined => (id::DRAW_OFFER_DECLINED, b"{}".to_vec()),
            ServerMessage::ChallengeReceived(p) => (id::CHALLENGE_RECEIVED, json!(p)),
            ServerMessage::ChallengeAccepted => (id::CHALLENGE_ACCEPTED, b"{}".to_vec()),
            ServerMessage::ChallengeDeclined => (id::CHALLENGE_DECLINED, b"{}".to_vec()),
            ServerMessage::Error(p) => (id::ERROR, json!(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_register_payload() {
        let bytes = br#"{"username":"alice","password":"hunter2"}"#;
        match ClientMessage::decode(message_id::REGISTER, bytes).unwrap() {
            ClientMessage::Register(p) => {
                assert_eq!(p.username, "alice");
                assert_eq!(p.password, "hunter2");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_message_id_is_decode_error() {
        let err = ClientMessage::decode(0xffee, b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownMessageId(0xffee)));
    }

    #[test]
    fn malformed_json_for_known_id_is_decode_error() {
        let err = ClientMessage::decode(message_id::LOGIN, b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson { message_id, .. } if message_id == message_id::LOGIN));
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        let err = ClientMessage::decode(message_id::LOGIN, &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidUtf8));
    }

    #[test]
    fn encode_make_move_round_trips_fields() {
        let mv = MakeMovePayload {
            game_id: "g1".into(),
            mv: "e2e4".into(),
        };
        let json = serde_json::to_string(&serde_json::json!({
            "game_id": mv.game_id,
            "move": mv.mv,
        }))
        .unwrap();
        match ClientMessage::decode(message_id::MAKE_MOVE, json.as_bytes()).unwrap() {
            ClientMessage::MakeMove(p) => {
                assert_eq!(p.game_id, "g1");
                assert_eq!(p.mv, "e2e4");
            }
            _ => panic!("wrong variant"),
        }
    }
}
