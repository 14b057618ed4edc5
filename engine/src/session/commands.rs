use tokio::sync::oneshot;

use super::state::{SearchRequest, SessionState};
use crate::{GameResult, TimeStates};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Engine {name} did not finish the usi handshake within {seconds}s")]
    LaunchTimeout { name: String, seconds: u64 },
    #[error("Engine {name} failed to launch: {reason}")]
    LaunchRejected { name: String, reason: String },
    #[error("Engine did not acknowledge `{command}` in time")]
    ProtocolTimeout { command: &'static str },
    #[error("Engine channel closed unexpectedly")]
    ChannelClosed,
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("Session is closed")]
    Closed,
}

pub(crate) type Reply<T = ()> = oneshot::Sender<Result<T, SessionError>>;

/// Commands sent to the session actor. Each embeds a oneshot for the reply.
pub(crate) enum SessionCommand {
    ReadyNewGame {
        reply: Reply,
    },
    SetOption {
        name: String,
        value: String,
        reply: Reply,
    },
    Go {
        request: SearchRequest,
        reply: Reply,
    },
    PonderHit {
        times: TimeStates,
        generation: u64,
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    GameOver {
        result: GameResult,
        reply: Reply,
    },
    GetState {
        reply: oneshot::Sender<SessionState>,
    },
    Quit {
        reply: Reply,
    },
}
