//! Engine player: turns one protocol session into searches with results.
//!
//! A [`Player`] wraps an [`EngineSession`] with the bookkeeping a game or an
//! analysis board needs: ponder bookkeeping and `ponderhit` conversion,
//! generation tagging so stale results are dropped, and a per-rank info
//! buffer that reaches consumers at most once per flush window.

mod actor;
mod commands;
mod info;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;
use usi_engine::{
    Connector, DispatchTable, EngineConfig, EngineSession, GameResult, MateSearchResult, Position,
    SessionId, TimeStates,
};

use actor::PlayerActor;
use commands::PlayerCommand;
pub use commands::PlayerError;
pub use info::{SearchInfo, INFO_FLUSH_WINDOW};

/// Result of a timed search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Move {
        mv: String,
        ponder: Option<String>,
        /// Best line at the time of the move, with the move itself removed
        info: Option<SearchInfo>,
    },
    Resign,
    Win,
}

/// A debounced snapshot of every known multi-PV line.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchInfoUpdate {
    pub session_id: SessionId,
    pub position: Position,
    pub lines: Vec<SearchInfo>,
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    SearchInfo(SearchInfoUpdate),
    Error {
        session_id: SessionId,
        error: PlayerError,
    },
}

pub type SearchReceiver = oneshot::Receiver<Result<SearchResult, PlayerError>>;
pub type MateReceiver = oneshot::Receiver<Result<MateSearchResult, PlayerError>>;

/// Cloneable handle to a player actor.
#[derive(Clone)]
pub struct Player {
    session_id: SessionId,
    name: String,
    cmd_tx: mpsc::Sender<PlayerCommand>,
}

impl Player {
    /// Launches the engine session and the actor that drives it. Info
    /// updates and errors are published on `events` when provided.
    pub async fn launch(
        config: EngineConfig,
        timeout: Duration,
        connector: &dyn Connector,
        table: &DispatchTable,
        events: Option<mpsc::UnboundedSender<PlayerEvent>>,
    ) -> Result<Self, PlayerError> {
        let (sink, session_events) = mpsc::unbounded_channel();
        let session = EngineSession::launch(&config, timeout, connector, table, sink).await?;
        let session_id = session.id();
        let name = config.name.clone();

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = PlayerActor::new(session, config, events);
        tokio::spawn(
            actor
                .run(cmd_rx, session_events)
                .instrument(tracing::info_span!("player", session = %session_id, engine = %name)),
        );

        Ok(Self {
            session_id,
            name,
            cmd_tx,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn ready_new_game(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::ReadyNewGame { reply })
            .await
    }

    /// Starts a timed search. If the player is pondering exactly this
    /// position the ponder search is converted with `ponderhit`.
    ///
    /// The returned receiver yields the result once; it is cancelled when a
    /// later request supersedes this one.
    pub async fn start_search(
        &self,
        position: Position,
        times: TimeStates,
    ) -> Result<SearchReceiver, PlayerError> {
        let (result, rx) = oneshot::channel();
        self.request(|reply| PlayerCommand::StartSearch {
            position,
            times,
            result,
            reply,
        })
        .await?;
        Ok(rx)
    }

    /// Ponders on the move the engine predicted after `position`. A no-op
    /// when pondering is disabled, no prediction exists or the player is
    /// already pondering.
    pub async fn start_ponder(
        &self,
        position: Position,
        times: TimeStates,
    ) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::StartPonder {
            position,
            times,
            reply,
        })
        .await
    }

    /// Unbounded analysis; progress arrives as [`PlayerEvent::SearchInfo`].
    pub async fn start_research(&self, position: Position) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::StartResearch { position, reply })
            .await
    }

    pub async fn start_mate_search(
        &self,
        position: Position,
        max_seconds: Option<u32>,
    ) -> Result<MateReceiver, PlayerError> {
        let (result, rx) = oneshot::channel();
        self.request(|reply| PlayerCommand::StartMateSearch {
            position,
            max_seconds,
            result,
            reply,
        })
        .await?;
        Ok(rx)
    }

    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::Stop { reply }).await
    }

    /// Current multi-PV setting, `None` if the engine has no such option.
    pub async fn multi_pv(&self) -> Option<u32> {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(PlayerCommand::GetMultiPv { reply })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn set_multi_pv(&self, lines: u32) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::SetMultiPv { lines, reply })
            .await
    }

    pub async fn game_over(&self, result: GameResult) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::GameOver { result, reply })
            .await
    }

    /// Quits the engine. Closing an already closed player succeeds.
    pub async fn close(&self) -> Result<(), PlayerError> {
        match self.request(|reply| PlayerCommand::Close { reply }).await {
            Err(PlayerError::Closed) => Ok(()),
            other => other,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, PlayerError>>) -> PlayerCommand,
    ) -> Result<T, PlayerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| PlayerError::Closed)?;
        rx.await.map_err(|_| PlayerError::Closed)?
    }
}
