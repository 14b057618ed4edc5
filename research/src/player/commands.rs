use tokio::sync::oneshot;
use usi_engine::{GameResult, MateSearchResult, Position, SessionError, TimeStates};

use super::SearchResult;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Engine {0} has no multi-PV option")]
    MultiPvUnsupported(String),
    #[error("Player is closed")]
    Closed,
}

pub(crate) type Reply<T = ()> = oneshot::Sender<Result<T, PlayerError>>;
pub(crate) type SearchReply = Reply<SearchResult>;
pub(crate) type MateReply = Reply<MateSearchResult>;

/// Commands sent to the player actor.
pub(crate) enum PlayerCommand {
    ReadyNewGame {
        reply: Reply,
    },
    StartSearch {
        position: Position,
        times: TimeStates,
        result: SearchReply,
        reply: Reply,
    },
    StartPonder {
        position: Position,
        times: TimeStates,
        reply: Reply,
    },
    StartResearch {
        position: Position,
        reply: Reply,
    },
    StartMateSearch {
        position: Position,
        max_seconds: Option<u32>,
        result: MateReply,
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    SetMultiPv {
        lines: u32,
        reply: Reply,
    },
    GetMultiPv {
        reply: oneshot::Sender<Option<u32>>,
    },
    GameOver {
        result: GameResult,
        reply: Reply,
    },
    Close {
        reply: Reply,
    },
}
