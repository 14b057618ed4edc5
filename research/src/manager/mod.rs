//! Multi-engine analysis.
//!
//! [`ResearchManager`] launches a batch of players, fans every position out
//! to all unpaused engines after a short debounce, enforces the optional
//! per-position time limit and forwards search progress tagged with the
//! engine's index in the batch.

mod actor;
mod commands;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;
use usi_engine::{Connector, DispatchTable, Position, SessionId};

use crate::settings::ResearchSettings;
use actor::ResearchActor;
use commands::ResearchCommand;
pub use commands::{ResearchError, ResearchEvent};

/// Rapid position changes inside this window start only one search.
pub const POSITION_DEBOUNCE: Duration = Duration::from_millis(200);

/// Cloneable handle to the research actor. Dropping every handle closes
/// the engines.
#[derive(Clone)]
pub struct ResearchManager {
    table: DispatchTable,
    cmd_tx: mpsc::Sender<ResearchCommand>,
}

impl ResearchManager {
    pub fn new(connector: Arc<dyn Connector>) -> (Self, mpsc::UnboundedReceiver<ResearchEvent>) {
        Self::with_table(connector, DispatchTable::new())
    }

    /// Uses `table` to route engine output, so independent managers can
    /// share or isolate their sessions.
    pub fn with_table(
        connector: Arc<dyn Connector>,
        table: DispatchTable,
    ) -> (Self, mpsc::UnboundedReceiver<ResearchEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = ResearchActor::new(connector, table.clone(), events_tx);
        tokio::spawn(actor.run(cmd_rx).instrument(tracing::info_span!("research")));
        (Self { table, cmd_tx }, events_rx)
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Launches and readies every configured engine. Either all engines end
    /// up running or none do.
    pub async fn launch(&self, settings: ResearchSettings) -> Result<Vec<SessionId>, ResearchError> {
        self.request(|reply| ResearchCommand::Launch { settings, reply })
            .await
    }

    /// Schedules analysis of `position`. Progress from the previous position
    /// is suppressed from now on.
    pub async fn update_position(&self, position: Position) -> Result<(), ResearchError> {
        self.cmd_tx
            .send(ResearchCommand::UpdatePosition { position })
            .await
            .map_err(|_| ResearchError::Closed)
    }

    pub async fn pause(&self, session_id: SessionId) -> Result<(), ResearchError> {
        self.request(|reply| ResearchCommand::Pause { session_id, reply })
            .await
    }

    /// Resumes and restarts the engine on the last position, if any.
    pub async fn unpause(&self, session_id: SessionId) -> Result<(), ResearchError> {
        self.request(|reply| ResearchCommand::Unpause { session_id, reply })
            .await
    }

    pub async fn is_paused(&self, session_id: SessionId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ResearchCommand::IsPaused { session_id, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn multi_pv(&self, session_id: SessionId) -> Option<u32> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(ResearchCommand::GetMultiPv { session_id, reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Changes the line count, then stops and restarts the engine so the
    /// new setting applies to the current position.
    pub async fn set_multi_pv(&self, session_id: SessionId, lines: u32) -> Result<(), ResearchError> {
        self.request(|reply| ResearchCommand::SetMultiPv {
            session_id,
            lines,
            reply,
        })
        .await
    }

    /// Sessions of the running batch, primary first.
    pub async fn sessions(&self) -> Vec<SessionId> {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ResearchCommand::Sessions { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn session_exists(&self, session_id: SessionId) -> bool {
        self.sessions().await.contains(&session_id)
    }

    /// Closes every engine. Failures are published as events and never
    /// prevent the remaining engines from closing.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ResearchCommand::Close { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ResearchError>>) -> ResearchCommand,
    ) -> Result<T, ResearchError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| ResearchError::Closed)?;
        rx.await.map_err(|_| ResearchError::Closed)?
    }
}
