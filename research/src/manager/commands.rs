use tokio::sync::oneshot;
use usi_engine::{Position, SessionId};

use crate::player::{PlayerError, SearchInfoUpdate};
use crate::settings::ResearchSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResearchError {
    #[error("Invalid research settings: {0}")]
    Configuration(String),
    #[error("Previous engines are still running; close them first")]
    PreviousBatchRunning,
    #[error("No research engine with session {0}")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error("Research manager is closed")]
    Closed,
}

/// What the manager publishes to its consumer.
#[derive(Debug, Clone)]
pub enum ResearchEvent {
    /// Progress of the engine at `index` (0 is the primary)
    SearchInfo {
        index: usize,
        update: SearchInfoUpdate,
    },
    Error {
        session_id: SessionId,
        error: PlayerError,
    },
}

pub(crate) type Reply<T = ()> = oneshot::Sender<Result<T, ResearchError>>;

pub(crate) enum ResearchCommand {
    Launch {
        settings: ResearchSettings,
        reply: Reply<Vec<SessionId>>,
    },
    UpdatePosition {
        position: Position,
    },
    Pause {
        session_id: SessionId,
        reply: Reply,
    },
    Unpause {
        session_id: SessionId,
        reply: Reply,
    },
    IsPaused {
        session_id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    GetMultiPv {
        session_id: SessionId,
        reply: oneshot::Sender<Option<u32>>,
    },
    SetMultiPv {
        session_id: SessionId,
        lines: u32,
        reply: Reply,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}
