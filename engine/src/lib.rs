pub mod channel;
pub mod config;
pub mod dispatch;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod position;
pub mod session;
pub mod usi;

pub use channel::{Connector, LineChannel};
pub use config::{EngineConfig, EngineOption};
pub use dispatch::{DispatchTable, EventSink};
pub use position::Position;
pub use session::{EngineSession, SessionError, SessionState};
pub use usi::{EngineIdentity, UsiCommand, UsiError, UsiMessage};

use serde::{Deserialize, Serialize};

/// Process-wide handle for one launched engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clock state of one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideTime {
    /// Remaining main time in milliseconds
    pub time_ms: u64,
    /// Byoyomi in seconds
    #[serde(default)]
    pub byoyomi_secs: u32,
    /// Fischer increment in seconds
    #[serde(default)]
    pub increment_secs: u32,
}

/// Clock state of both sides, formatted into the arguments of `go`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStates {
    pub black: SideTime,
    pub white: SideTime,
}

/// Which kind of search a `go` starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoMode {
    Timed(TimeStates),
    Ponder(TimeStates),
    Infinite,
    /// Mate search with an optional limit in seconds
    Mate(Option<u32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Lose,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Mate in N plies; negative when the engine is being mated
    Mate(i32),
    /// `mate +` or `mate -`: mate found, distance unknown
    MateUnknown { winning: bool },
}

/// One parsed `info` line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsiInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub time_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub score: Option<Score>,
    pub bound: Option<ScoreBound>,
    pub multipv: Option<u32>,
    pub currmove: Option<String>,
    pub hashfull: Option<u32>,
    pub pv: Vec<String>, // Principal variation
    pub string: Option<String>,
}

/// Payload of a `bestmove` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestMove {
    Move { mv: String, ponder: Option<String> },
    Resign,
    Win,
}

/// Outcome of a `go mate` search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MateSearchResult {
    Checkmate(Vec<String>),
    NotImplemented,
    Timeout,
    NoMate,
}

/// Events a session routes through the dispatch table.
///
/// Search events carry the generation and position of the request that
/// produced them so consumers can drop stale responses.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    BestMove {
        generation: u64,
        position: Position,
        best: BestMove,
    },
    Info {
        generation: u64,
        position: Position,
        info: UsiInfo,
    },
    Checkmate {
        generation: u64,
        position: Position,
        result: MateSearchResult,
    },
    Error(SessionError),
}
