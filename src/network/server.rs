//! Coordinator / accept loop (spec.md §5).
//!
//! One lightweight tokio task per live connection, each driving a
//! `Framed<TcpStream, FrameCodec>`. Every task hands decoded frames to the
//! shared [`Dispatcher`], which serializes mutation of session, matchmaker,
//! and game state the way the teacher's `GameServer` serializes mutation of
//! its `clients`/`matchmaking_queue`/`SessionManager` maps under their own
//! locks — the concrete state containers differ, but the single-writer
//! discipline per spec.md §5 is the same pattern, just over a raw TCP
//! `Framed` stream instead of a WebSocket one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::PersistenceError;
use crate::game::ai::{AiProvider, RandomMoveAi};
use crate::game::controller::GameController;
use crate::network::auth::AuthService;
use crate::network::codec::{Frame, FrameCodec};
use crate::network::dispatcher::Dispatcher;
use crate::network::matchmaker::Matchmaker;
use crate::network::presence::PresenceService;
use crate::network::protocol::ServerMessage;
use crate::network::session::{SessionId, SessionRegistry};
use crate::repository::Repository;

/// Errors that can prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, #[source] std::io::Error),

    #[error("failed to connect to the repository: {0}")]
    Repository(#[from] PersistenceError),
}

/// Every component the dispatcher routes into, plus the listener. Built
/// once at startup and shared (via `Arc`) across every connection task.
pub struct GameServer {
    config: Config,
    sessions: Arc<SessionRegistry>,
    presence: Arc<PresenceService>,
    matchmaker: Arc<Matchmaker>,
    games: Arc<GameController>,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: broadcast::Sender<()>,
}

/// A handle a caller can use to shut the server down from outside `run`.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown_tx: broadcast::Sender<()>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl GameServer {
    pub fn new(config: Config, repo: Arc<dyn Repository>) -> Self {
        Self::with_ai_provider(config, repo, Arc::new(RandomMoveAi))
    }

    pub fn with_ai_provider(
        config: Config,
        repo: Arc<dyn Repository>,
        ai: Arc<dyn AiProvider>,
    ) -> Self {
        let sessions = SessionRegistry::new();
        let presence = PresenceService::spawn(sessions.clone());
        let matchmaker = Matchmaker::new(config.match_rating_window, config.challenge_ttl_seconds);
        let auth = AuthService::new(
            repo.clone(),
            sessions.clone(),
            config.token_secret.clone(),
            config.password_hash_cost,
        );
        let games = GameController::new(repo, sessions.clone(), ai);
        let dispatcher = Dispatcher::new(
            sessions.clone(),
            auth,
            presence.clone(),
            matchmaker.clone(),
            games.clone(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            sessions,
            presence,
            matchmaker,
            games,
            dispatcher,
            shutdown_tx,
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.listen_host, self.config.listen_port)
            .parse()
            .unwrap_or_else(|_| ([0, 0, 0, 0], self.config.listen_port).into());
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GameServerError::BindFailed(addr, e))?;
        info!(%addr, "chess arbiter listening");

        let idle_handle = tokio::spawn(Self::run_idle_reaper(
            self.sessions.clone(),
            self.games.clone(),
            self.matchmaker.clone(),
            self.presence.clone(),
            self.config.idle_timeout_seconds,
        ));
        let challenge_handle = tokio::spawn(Self::run_challenge_reaper(
            self.sessions.clone(),
            self.matchmaker.clone(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!(%addr, "connection accepted");
                            self.spawn_connection(stream);
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        idle_handle.abort();
        challenge_handle.abort();
        Ok(())
    }

    /// Spawn the per-connection task: a send-side draining the session's
    /// bounded channel into the socket, and a receive-side handing decoded
    /// frames to the dispatcher (spec.md §4.1, §5).
    fn spawn_connection(&self, stream: TcpStream) {
        let sessions = self.sessions.clone();
        let presence = self.presence.clone();
        let matchmaker = self.matchmaker.clone();
        let games = self.games.clone();
        let dispatcher = self.dispatcher.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let framed = Framed::new(stream, FrameCodec);
            let (mut sink, mut stream) = framed.split();

            let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(
                crate::network::session::SEND_QUEUE_DEPTH,
            );
            let session_id = sessions.register(out_tx).await;
            debug!(%session_id, "session registered");

            let send_task = tokio::spawn(async move {
                while let Some(message) = out_rx.recv().await {
                    let (message_id, payload) = message.encode();
                    if sink.send(Frame::new(message_id, payload)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    frame = stream.next() => {
                        match frame {
                            Some(Ok(frame)) => {
                                dispatcher.dispatch(session_id, frame.message_id, &frame.payload).await;
                            }
                            Some(Err(e)) => {
                                warn!(%session_id, error = %e, "fatal protocol error; disconnecting");
                                break;
                            }
                            None => {
                                debug!(%session_id, "connection closed by peer");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            send_task.abort();
            Self::disconnect(session_id, &sessions, &games, &matchmaker, &presence).await;
        });
    }

    /// Session teardown, in the order spec.md §4.2/§5 requires: treat an
    /// in-game disconnect as resignation first (so the opponent's broadcast
    /// still finds a live session to remove from the game), then drop the
    /// matchmaking queue/challenge entries, then remove the session itself,
    /// then re-publish presence.
    async fn disconnect(
        session_id: SessionId,
        sessions: &Arc<SessionRegistry>,
        games: &Arc<GameController>,
        matchmaker: &Arc<Matchmaker>,
        presence: &Arc<PresenceService>,
    ) {
        games.handle_disconnect(session_id).await;
        matchmaker.remove_session(session_id).await;
        sessions.close(session_id).await;
        presence.notify_changed();
        debug!(%session_id, "session closed");
    }

    /// Disconnect sessions idle past `idle_timeout_seconds` (spec.md §5).
    /// Closing the registry entry is enough to unblock the connection
    /// task's `stream.next()`/send-queue loop; it observes the closed
    /// channel and exits on its own next I/O attempt.
    async fn run_idle_reaper(
        sessions: Arc<SessionRegistry>,
        games: Arc<GameController>,
        matchmaker: Arc<Matchmaker>,
        presence: Arc<PresenceService>,
        idle_timeout_seconds: u64,
    ) {
        let mut tick = interval(Duration::from_secs(30));
        loop {
            tick.tick().await;
            let idle = sessions.idle_sessions(idle_timeout_seconds as i64).await;
            for session_id in idle {
                info!(%session_id, "idle session reaped");
                Self::disconnect(session_id, &sessions, &games, &matchmaker, &presence).await;
            }
        }
    }

    /// Expire challenges past `challenge_ttl_seconds`, emitting the
    /// decline-equivalent notification (spec.md §4.6 "Expiry").
    async fn run_challenge_reaper(sessions: Arc<SessionRegistry>, matchmaker: Arc<Matchmaker>) {
        let mut tick = interval(Duration::from_secs(5));
        loop {
            tick.tick().await;
            for expired in matchmaker.expire_challenges().await {
                sessions
                    .send_to(expired.challenger_session, ServerMessage::ChallengeDeclined)
                    .await;
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }

    pub async fn active_game_count(&self) -> usize {
        self.games.active_game_count().await
    }

    pub async fn queue_size(&self) -> usize {
        self.matchmaker.queue_len().await
    }
}
