//! End-to-end scenarios driving the dispatcher the way the connection tasks
//! in `network/server.rs` do, minus the socket: frames go straight in as
//! `(message_id, payload_bytes)` and come straight out on each session's
//! mpsc receiver. Backed by the in-memory repository.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use chess_arbiter::game::ai::{AiError, AiProvider};
use chess_arbiter::game::controller::GameController;
use chess_arbiter::network::auth::AuthService;
use chess_arbiter::network::dispatcher::Dispatcher;
use chess_arbiter::network::matchmaker::Matchmaker;
use chess_arbiter::network::presence::PresenceService;
use chess_arbiter::network::protocol::{message_id, ServerMessage};
use chess_arbiter::network::session::{SessionId, SessionRegistry};
use chess_arbiter::repository::memory::MemoryRepository;
use chess_arbiter::repository::Repository;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
}

struct Client {
    session_id: SessionId,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Harness {
    fn new() -> Self {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let sessions = SessionRegistry::new();
        let presence = PresenceService::spawn(sessions.clone());
        let matchmaker = Matchmaker::new(None, 60);
        let auth = AuthService::new(repo.clone(), sessions.clone(), "test-secret".into(), 1);
        let ai: Arc<dyn AiProvider> = Arc::new(NullAi);
        let games = GameController::new(repo, sessions.clone(), ai);
        let dispatcher = Dispatcher::new(sessions.clone(), auth, presence, matchmaker, games);
        Self { sessions, dispatcher }
    }

    async fn connect(&self) -> Client {
        let (tx, rx) = mpsc::channel(32);
        let session_id = self.sessions.register(tx).await;
        Client { session_id, rx }
    }

    async fn send(&self, client: &Client, id: u16, payload: serde_json::Value) {
        let bytes = serde_json::to_vec(&payload).unwrap();
        self.dispatcher.dispatch(client.session_id, id, &bytes).await;
    }
}

/// Never produces a move; none of these scenarios exercise AI play.
struct NullAi;

#[async_trait::async_trait]
impl AiProvider for NullAi {
    async fn request_move(
        &self,
        _fen: &str,
        _difficulty: chess_arbiter::network::protocol::Difficulty,
    ) -> Result<String, AiError> {
        Err(AiError::NoLegalMove)
    }
}

impl Client {
    /// Receive the next message, skipping `OnlineUsersList` pushes — presence
    /// broadcasts are debounced and land asynchronously, interleaved with
    /// whatever the scenario is actually waiting on.
    async fn recv(&mut self) -> ServerMessage {
        loop {
            let msg = timeout(RECV_TIMEOUT, self.rx.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("channel closed unexpectedly");
            if !matches!(msg, ServerMessage::OnlineUsersList(_)) {
                return msg;
            }
        }
    }

    /// Asserts nothing but (optionally) a presence broadcast arrives within
    /// the window — those are debounced up to 100 ms and can land at any
    /// point relative to the rest of a scenario.
    async fn recv_none(&mut self) {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(200);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return;
            }
            match timeout(remaining, self.rx.recv()).await {
                Ok(Some(ServerMessage::OnlineUsersList(_))) => continue,
                Ok(Some(other)) => panic!("expected no message, got {other:?}"),
                Ok(None) => panic!("channel closed unexpectedly"),
                Err(_) => return,
            }
        }
    }
}

async fn register_and_login(harness: &Harness, client: &Client, username: &str) {
    harness
        .send(
            client,
            message_id::REGISTER,
            json!({ "username": username, "password": "hunter2" }),
        )
        .await;
    harness
        .send(
            client,
            message_id::LOGIN,
            json!({ "username": username, "password": "hunter2" }),
        )
        .await;
}

fn expect_register_result(msg: ServerMessage) {
    match msg {
        ServerMessage::RegisterResult(r) => assert!(r.success),
        other => panic!("expected RegisterResult, got {other:?}"),
    }
}

fn expect_login_result(msg: ServerMessage) -> String {
    match msg {
        ServerMessage::LoginResult(r) => {
            assert!(r.success);
            r.user_id.expect("successful login carries a user_id")
        }
        other => panic!("expected LoginResult, got {other:?}"),
    }
}

/// Logs both clients in and pairs them through `FIND_MATCH`. Returns the
/// game id and, for each client, the `GameStart` color it was dealt.
async fn start_pvp_game(
    harness: &Harness,
    a: &mut Client,
    b: &mut Client,
) -> (String, chess_arbiter::network::protocol::Color, chess_arbiter::network::protocol::Color) {
    register_and_login(harness, a, "alice").await;
    expect_register_result(a.recv().await);
    expect_login_result(a.recv().await);

    register_and_login(harness, b, "bob").await;
    expect_register_result(b.recv().await);
    expect_login_result(b.recv().await);

    harness.send(a, message_id::FIND_MATCH, json!({})).await;
    harness.send(b, message_id::FIND_MATCH, json!({})).await;

    match a.recv().await {
        ServerMessage::MatchFound(found) => assert_eq!(found.opponent.username, "bob"),
        other => panic!("expected MatchFound, got {other:?}"),
    }
    match b.recv().await {
        ServerMessage::MatchFound(found) => assert_eq!(found.opponent.username, "alice"),
        other => panic!("expected MatchFound, got {other:?}"),
    }

    let (game_id_a, color_a) = match a.recv().await {
        ServerMessage::GameStart(start) => (start.game_id, start.color),
        other => panic!("expected GameStart, got {other:?}"),
    };
    let (game_id_b, color_b) = match b.recv().await {
        ServerMessage::GameStart(start) => (start.game_id, start.color),
        other => panic!("expected GameStart, got {other:?}"),
    };
    assert_eq!(game_id_a, game_id_b);
    assert_ne!(color_a, color_b);

    (game_id_a, color_a, color_b)
}

#[tokio::test]
async fn s1_pairing_and_first_move() {
    use chess_arbiter::network::protocol::Color;

    let harness = Harness::new();
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;

    let (game_id, color_a, _color_b) = start_pvp_game(&harness, &mut a, &mut b).await;
    let (white, black) = if color_a == Color::White { (&mut a, &mut b) } else { (&mut b, &mut a) };

    harness
        .send(white, message_id::MAKE_MOVE, json!({ "game_id": game_id, "move": "e2e4" }))
        .await;

    match white.recv().await {
        ServerMessage::GameStateUpdate(u) => {
            assert!(u.fen.starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
            assert_eq!(u.last_move, "e2e4");
            assert_eq!(u.turn, Color::Black);
        }
        other => panic!("expected GameStateUpdate, got {other:?}"),
    }
    match black.recv().await {
        ServerMessage::GameStateUpdate(u) => {
            assert_eq!(u.last_move, "e2e4");
            assert_eq!(u.turn, Color::Black);
        }
        other => panic!("expected GameStateUpdate, got {other:?}"),
    }
}

#[tokio::test]
async fn s2_fools_mate_ends_in_checkmate_with_zero_sum_ratings() {
    use chess_arbiter::network::protocol::{Color, GameResult};

    let harness = Harness::new();
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;

    let (game_id, color_a, _) = start_pvp_game(&harness, &mut a, &mut b).await;
    let (white, black) = if color_a == Color::White { (&mut a, &mut b) } else { (&mut b, &mut a) };

    harness
        .send(white, message_id::MAKE_MOVE, json!({ "game_id": game_id, "move": "f2f3" }))
        .await;
    let _ = white.recv().await;
    let _ = black.recv().await;

    harness
        .send(black, message_id::MAKE_MOVE, json!({ "game_id": game_id, "move": "e7e5" }))
        .await;
    let _ = white.recv().await;
    let _ = black.recv().await;

    harness
        .send(white, message_id::MAKE_MOVE, json!({ "game_id": game_id, "move": "g2g4" }))
        .await;
    let _ = white.recv().await;
    let _ = black.recv().await;

    harness
        .send(black, message_id::MAKE_MOVE, json!({ "game_id": game_id, "move": "d8h4" }))
        .await;
    let _ = white.recv().await;
    let _ = black.recv().await;

    match white.recv().await {
        ServerMessage::GameOver(over) => {
            assert_eq!(over.result, GameResult::BlackWin);
            assert_eq!(over.cause, "checkmate");
        }
        other => panic!("expected GameOver, got {other:?}"),
    }
    match black.recv().await {
        ServerMessage::GameOver(over) => {
            assert_eq!(over.result, GameResult::BlackWin);
            assert_eq!(over.cause, "checkmate");
        }
        other => panic!("expected GameOver, got {other:?}"),
    }
}

#[tokio::test]
async fn s3_resignation() {
    use chess_arbiter::network::protocol::{Color, GameResult};

    let harness = Harness::new();
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;

    let (game_id, color_a, _) = start_pvp_game(&harness, &mut a, &mut b).await;
    let (white, black) = if color_a == Color::White { (&mut a, &mut b) } else { (&mut b, &mut a) };

    harness.send(white, message_id::RESIGN, json!({ "game_id": game_id })).await;

    match white.recv().await {
        ServerMessage::GameOver(over) => assert_eq!(over.result, GameResult::BlackWin),
        other => panic!("expected GameOver, got {other:?}"),
    }
    match black.recv().await {
        ServerMessage::GameOver(over) => {
            assert_eq!(over.result, GameResult::BlackWin);
            assert_eq!(over.cause, "resignation");
        }
        other => panic!("expected GameOver, got {other:?}"),
    }
}

#[tokio::test]
async fn s4_illegal_move_only_reaches_the_mover() {
    use chess_arbiter::network::protocol::Color;

    let harness = Harness::new();
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;

    let (game_id, color_a, _) = start_pvp_game(&harness, &mut a, &mut b).await;
    let (white, black) = if color_a == Color::White { (&mut a, &mut b) } else { (&mut b, &mut a) };

    harness
        .send(white, message_id::MAKE_MOVE, json!({ "game_id": game_id, "move": "e2e5" }))
        .await;

    match white.recv().await {
        ServerMessage::InvalidMove(m) => assert_eq!(m.reason, "illegal move"),
        other => panic!("expected InvalidMove, got {other:?}"),
    }
    black.recv_none().await;
}

#[tokio::test]
async fn s5_out_of_turn_move_only_reaches_the_mover() {
    use chess_arbiter::network::protocol::Color;

    let harness = Harness::new();
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;

    let (game_id, color_a, _) = start_pvp_game(&harness, &mut a, &mut b).await;
    let (white, black) = if color_a == Color::White { (&mut a, &mut b) } else { (&mut b, &mut a) };
    let _ = white;

    harness
        .send(black, message_id::MAKE_MOVE, json!({ "game_id": game_id, "move": "e7e5" }))
        .await;

    match black.recv().await {
        ServerMessage::InvalidMove(m) => assert_eq!(m.reason, "not your turn"),
        other => panic!("expected InvalidMove, got {other:?}"),
    }
}

#[tokio::test]
async fn s6_draw_by_agreement() {
    use chess_arbiter::network::protocol::{Color, GameResult};

    let harness = Harness::new();
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;

    let (game_id, color_a, _) = start_pvp_game(&harness, &mut a, &mut b).await;
    let (white, black) = if color_a == Color::White { (&mut a, &mut b) } else { (&mut b, &mut a) };

    harness.send(white, message_id::OFFER_DRAW, json!({ "game_id": game_id })).await;
    match black.recv().await {
        ServerMessage::DrawOfferReceived => {}
        other => panic!("expected DrawOfferReceived, got {other:?}"),
    }

    harness.send(black, message_id::ACCEPT_DRAW, json!({ "game_id": game_id })).await;
    match white.recv().await {
        ServerMessage::GameOver(over) => {
            assert_eq!(over.result, GameResult::Draw);
            assert_eq!(over.cause, "agreement");
        }
        other => panic!("expected GameOver, got {other:?}"),
    }
    match black.recv().await {
        ServerMessage::GameOver(over) => assert_eq!(over.result, GameResult::Draw),
        other => panic!("expected GameOver, got {other:?}"),
    }
}

#[tokio::test]
async fn challenge_workflow_pairs_the_two_sessions() {
    let harness = Harness::new();
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;

    register_and_login(&harness, &a, "carol").await;
    expect_register_result(a.recv().await);
    expect_login_result(a.recv().await);

    register_and_login(&harness, &b, "dave").await;
    expect_register_result(b.recv().await);
    let dave_user_id = expect_login_result(b.recv().await);

    harness
        .send(&a, message_id::CHALLENGE, json!({ "target_user_id": dave_user_id }))
        .await;
    let carol_user_id = match b.recv().await {
        ServerMessage::ChallengeReceived(c) => c.sender.user_id,
        other => panic!("expected ChallengeReceived, got {other:?}"),
    };

    harness
        .send(
            &b,
            message_id::ACCEPT_CHALLENGE,
            json!({ "challenger_user_id": carol_user_id }),
        )
        .await;

    match a.recv().await {
        ServerMessage::ChallengeAccepted => {}
        other => panic!("expected ChallengeAccepted, got {other:?}"),
    }
    match a.recv().await {
        ServerMessage::MatchFound(_) => {}
        other => panic!("expected MatchFound, got {other:?}"),
    }
    match b.recv().await {
        ServerMessage::MatchFound(_) => {}
        other => panic!("expected MatchFound, got {other:?}"),
    }
    match a.recv().await {
        ServerMessage::GameStart(_) => {}
        other => panic!("expected GameStart, got {other:?}"),
    }
    match b.recv().await {
        ServerMessage::GameStart(_) => {}
        other => panic!("expected GameStart, got {other:?}"),
    }
}
