use std::fmt;

use crate::{GameResult, GoMode, Position, TimeStates};

/// Outgoing command to a USI engine. `Display` renders the wire line
/// without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsiCommand {
    Usi,
    SetOption { name: String, value: String },
    IsReady,
    UsiNewGame,
    Position(Position),
    Go(GoMode),
    PonderHit,
    Stop,
    GameOver(GameResult),
    Quit,
}

impl fmt::Display for UsiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsiCommand::Usi => f.write_str("usi"),
            UsiCommand::SetOption { name, value } => {
                write!(f, "setoption name {} value {}", name, value)
            }
            UsiCommand::IsReady => f.write_str("isready"),
            UsiCommand::UsiNewGame => f.write_str("usinewgame"),
            UsiCommand::Position(position) => write!(f, "{}", position),
            UsiCommand::Go(GoMode::Timed(times)) => write!(f, "go {}", format_times(times)),
            UsiCommand::Go(GoMode::Ponder(times)) => {
                write!(f, "go ponder {}", format_times(times))
            }
            UsiCommand::Go(GoMode::Infinite) => f.write_str("go infinite"),
            UsiCommand::Go(GoMode::Mate(Some(seconds))) => {
                write!(f, "go mate {}", u64::from(*seconds) * 1000)
            }
            UsiCommand::Go(GoMode::Mate(None)) => f.write_str("go mate infinite"),
            UsiCommand::PonderHit => f.write_str("ponderhit"),
            UsiCommand::Stop => f.write_str("stop"),
            UsiCommand::GameOver(result) => {
                let result = match result {
                    GameResult::Win => "win",
                    GameResult::Lose => "lose",
                    GameResult::Draw => "draw",
                };
                write!(f, "gameover {}", result)
            }
            UsiCommand::Quit => f.write_str("quit"),
        }
    }
}

/// `btime B wtime W` followed by either increments or byoyomi; the protocol
/// does not allow both. Increments win when either side has one.
fn format_times(times: &TimeStates) -> String {
    let mut s = format!(
        "btime {} wtime {}",
        times.black.time_ms, times.white.time_ms
    );
    let (black, white) = (&times.black, &times.white);
    if black.increment_secs > 0 || white.increment_secs > 0 {
        s.push_str(&format!(
            " binc {} winc {}",
            u64::from(black.increment_secs) * 1000,
            u64::from(white.increment_secs) * 1000
        ));
    } else {
        let byoyomi = black.byoyomi_secs.max(white.byoyomi_secs);
        s.push_str(&format!(" byoyomi {}", u64::from(byoyomi) * 1000));
    }
    s
}
