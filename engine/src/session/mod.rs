//! Per-engine protocol session.
//!
//! [`EngineSession::launch`] performs the `usi` handshake, registers the
//! session in a [`DispatchTable`] and spawns an actor that owns the channel.
//! The returned handle is cheap to clone; search results never come back
//! through it but through the event sink registered at launch.

mod actor;
mod commands;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::Instrument;

use crate::channel::{Connector, LineChannel};
use crate::usi::{parse_usi_message, EngineIdentity, UsiCommand, UsiMessage};
use crate::{
    DispatchTable, EngineConfig, EventSink, GameResult, GoMode, Position, SessionId, TimeStates,
};
use actor::SessionActor;
use commands::SessionCommand;
pub use commands::SessionError;
pub use state::{SearchRequest, SessionState};

/// Cheap, cloneable handle to a session actor.
#[derive(Clone)]
pub struct EngineSession {
    id: SessionId,
    name: String,
    identity: Arc<EngineIdentity>,
    timeout: Duration,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl EngineSession {
    /// Open the channel, run the `usi` handshake and send the configured
    /// options. `timeout` bounds the handshake and later `isready` waits.
    #[tracing::instrument(level = "info", skip_all, fields(engine = %config.name))]
    pub async fn launch(
        config: &EngineConfig,
        timeout: Duration,
        connector: &dyn Connector,
        table: &DispatchTable,
        sink: EventSink,
    ) -> Result<Self, SessionError> {
        tracing::info!("Launching engine at {}", config.target);
        let rejected = |reason: String| SessionError::LaunchRejected {
            name: config.name.clone(),
            reason,
        };

        let mut channel = connector.connect(config).await.map_err(|e| {
            tracing::error!("Failed to connect to engine: {}", e);
            rejected(e.to_string())
        })?;

        channel
            .send(UsiCommand::Usi.to_string())
            .await
            .map_err(|e| rejected(e.to_string()))?;

        let identity = match time::timeout(timeout, handshake(&mut channel)).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::error!("Engine closed before sending usiok");
                return Err(rejected("channel closed before usiok".to_string()));
            }
            Err(_) => {
                tracing::error!("Timeout waiting for usiok");
                let _ = channel.send(UsiCommand::Quit.to_string()).await;
                return Err(SessionError::LaunchTimeout {
                    name: config.name.clone(),
                    seconds: timeout.as_secs(),
                });
            }
        };
        tracing::debug!("Handshake done: {:?}", identity.name);

        for (name, option) in &config.options {
            let cmd = UsiCommand::SetOption {
                name: name.clone(),
                value: option.wire_value(),
            };
            channel
                .send(cmd.to_string())
                .await
                .map_err(|e| rejected(e.to_string()))?;
        }

        let id = table.register(sink);
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = SessionActor::new(id, channel, table.clone());
        tokio::spawn(
            actor
                .run(cmd_rx)
                .instrument(tracing::info_span!("session", id = %id, engine = %config.name)),
        );

        tracing::info!("Engine launched as session {}", id);
        Ok(Self {
            id,
            name: config.name.clone(),
            identity: Arc::new(identity),
            timeout,
            cmd_tx,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &EngineIdentity {
        &self.identity
    }

    /// `isready` → `readyok` → `usinewgame`. Must complete before searching.
    pub async fn ready_new_game(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::ReadyNewGame { reply: tx }).await?;
        match time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                tracing::error!("Timeout waiting for readyok");
                Err(SessionError::ProtocolTimeout { command: "isready" })
            }
        }
    }

    /// Fire-and-forget; deferred until idle when a search is running.
    pub async fn set_option(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::SetOption {
            name: name.into(),
            value: value.into(),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn go(
        &self,
        position: Position,
        times: TimeStates,
        generation: u64,
    ) -> Result<(), SessionError> {
        self.search(GoMode::Timed(times), position, generation).await
    }

    pub async fn go_ponder(
        &self,
        position: Position,
        times: TimeStates,
        generation: u64,
    ) -> Result<(), SessionError> {
        self.search(GoMode::Ponder(times), position, generation).await
    }

    pub async fn go_infinite(&self, position: Position, generation: u64) -> Result<(), SessionError> {
        self.search(GoMode::Infinite, position, generation).await
    }

    pub async fn go_mate(
        &self,
        position: Position,
        max_seconds: Option<u32>,
        generation: u64,
    ) -> Result<(), SessionError> {
        self.search(GoMode::Mate(max_seconds), position, generation)
            .await
    }

    /// Returns once the command is dispatched (or queued behind a running
    /// search); results arrive as events.
    pub async fn search(
        &self,
        mode: GoMode,
        position: Position,
        generation: u64,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        let request = SearchRequest {
            mode,
            position,
            generation,
        };
        self.send(SessionCommand::Go { request, reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn ponder_hit(&self, times: TimeStates, generation: u64) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::PonderHit {
            times,
            generation,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Advisory: the engine still reports a result afterwards.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Stop { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn game_over(&self, result: GameResult) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GameOver { result, reply: tx })
            .await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn state(&self) -> SessionState {
        let (tx, rx) = oneshot::channel();
        if self.send(SessionCommand::GetState { reply: tx }).await.is_err() {
            return SessionState::Closed;
        }
        rx.await.unwrap_or(SessionState::Closed)
    }

    /// Sends `quit` and tears the session down. Safe to call repeatedly.
    pub async fn quit(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        if self.send(SessionCommand::Quit { reply: tx }).await.is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        self.quit().await
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Reads until `usiok`, collecting `id` and `option` lines on the way.
/// `None` when the channel closes first.
async fn handshake(channel: &mut LineChannel) -> Option<EngineIdentity> {
    let mut identity = EngineIdentity::default();
    while let Some(line) = channel.recv().await {
        match parse_usi_message(&line) {
            Ok(UsiMessage::UsiOk) => return Some(identity),
            Ok(msg) => {
                if !identity.absorb(&msg) {
                    tracing::trace!("Ignoring message during handshake: {:?}", msg);
                }
            }
            Err(e) => tracing::trace!("Ignoring line during handshake: {}", e),
        }
    }
    None
}
