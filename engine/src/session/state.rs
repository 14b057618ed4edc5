use std::fmt;

use crate::{GoMode, Position};

/// Protocol state of one engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in progress inside [`EngineSession::launch`]. The actor and
    /// its handle only exist once it succeeds, so no handle observes this.
    ///
    /// [`EngineSession::launch`]: super::EngineSession::launch
    Launching,
    /// Handshake done, waiting for `isready`/`usinewgame`
    Ready,
    Idle,
    Searching,
    Pondering,
    MateSearching,
    Closed,
}

impl SessionState {
    pub fn is_searching(self) -> bool {
        matches!(
            self,
            SessionState::Searching | SessionState::Pondering | SessionState::MateSearching
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Launching => "launching",
            SessionState::Ready => "ready",
            SessionState::Idle => "idle",
            SessionState::Searching => "searching",
            SessionState::Pondering => "pondering",
            SessionState::MateSearching => "mate searching",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A search to run: what, where, and the caller's generation tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub mode: GoMode,
    pub position: Position,
    pub generation: u64,
}

impl SearchRequest {
    pub(crate) fn target_state(&self) -> SessionState {
        match self.mode {
            GoMode::Timed(_) | GoMode::Infinite => SessionState::Searching,
            GoMode::Ponder(_) => SessionState::Pondering,
            GoMode::Mate(_) => SessionState::MateSearching,
        }
    }

    pub(crate) fn is_mate(&self) -> bool {
        matches!(self.mode, GoMode::Mate(_))
    }
}

/// The search the engine is currently running.
#[derive(Debug)]
pub(crate) struct ActiveSearch {
    pub request: SearchRequest,
    pub stop_sent: bool,
}
