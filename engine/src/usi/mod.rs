pub mod command;
pub mod parser;

pub use command::UsiCommand;
pub use parser::{parse_usi_message, DeclaredOption, EngineIdentity, UsiMessage};

#[derive(Debug, thiserror::Error)]
pub enum UsiError {
    #[error("Empty USI message")]
    Empty,
    #[error("Malformed USI message: {0}")]
    MalformedMessage(String),
    #[error("Unknown USI message: {0}")]
    UnknownMessage(String),
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}
