use serde::Serialize;

use crate::{BestMove, MateSearchResult, Score, ScoreBound, UsiError, UsiInfo};

/// Incoming message from a USI engine
#[derive(Debug, Clone, PartialEq)]
pub enum UsiMessage {
    Id { name: String, value: String },
    Option(DeclaredOption),
    UsiOk,
    ReadyOk,
    BestMove(BestMove),
    Info(UsiInfo),
    Checkmate(MateSearchResult),
}

/// An option the engine declares during the `usi` handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeclaredOption {
    pub name: String,
    pub kind: String,
    pub default: Option<String>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub vars: Vec<String>,
}

/// What the engine told us about itself before `usiok`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineIdentity {
    pub name: Option<String>,
    pub author: Option<String>,
    pub options: Vec<DeclaredOption>,
}

impl EngineIdentity {
    /// Folds one handshake message in; returns false for anything else.
    pub fn absorb(&mut self, msg: &UsiMessage) -> bool {
        match msg {
            UsiMessage::Id { name, value } if name == "name" => {
                self.name = Some(value.clone());
                true
            }
            UsiMessage::Id { name, value } if name == "author" => {
                self.author = Some(value.clone());
                true
            }
            UsiMessage::Option(opt) => {
                self.options.push(opt.clone());
                true
            }
            _ => false,
        }
    }

    pub fn option(&self, name: &str) -> Option<&DeclaredOption> {
        self.options.iter().find(|o| o.name == name)
    }
}

/// Parse a USI message line
pub fn parse_usi_message(line: &str) -> Result<UsiMessage, UsiError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        None => Err(UsiError::Empty),
        Some(&"usiok") => Ok(UsiMessage::UsiOk),
        Some(&"readyok") => Ok(UsiMessage::ReadyOk),

        Some(&"id") => {
            if tokens.len() < 3 {
                return Err(UsiError::MalformedMessage(line.to_string()));
            }
            let name = tokens[1].to_string();
            let value = tokens[2..].join(" ");
            Ok(UsiMessage::Id { name, value })
        }

        Some(&"option") => parse_option_line(&tokens[1..])
            .map(UsiMessage::Option)
            .ok_or_else(|| UsiError::MalformedMessage(line.to_string())),

        Some(&"bestmove") => {
            let best = match tokens.get(1) {
                None => return Err(UsiError::MalformedMessage(line.to_string())),
                Some(&"resign") => BestMove::Resign,
                Some(&"win") => BestMove::Win,
                Some(mv) => {
                    let ponder = if tokens.len() >= 4 && tokens[2] == "ponder" {
                        Some(tokens[3].to_string())
                    } else {
                        None
                    };
                    BestMove::Move {
                        mv: mv.to_string(),
                        ponder,
                    }
                }
            };
            Ok(UsiMessage::BestMove(best))
        }

        Some(&"checkmate") => {
            let result = match &tokens[1..] {
                [] => return Err(UsiError::MalformedMessage(line.to_string())),
                ["notimplemented"] => MateSearchResult::NotImplemented,
                ["timeout"] => MateSearchResult::Timeout,
                ["nomate"] => MateSearchResult::NoMate,
                moves => MateSearchResult::Checkmate(moves.iter().map(|m| m.to_string()).collect()),
            };
            Ok(UsiMessage::Checkmate(result))
        }

        Some(&"info") => Ok(UsiMessage::Info(parse_info_line(&tokens[1..]))),

        _ => Err(UsiError::UnknownMessage(line.to_string())),
    }
}

/// Parse an "info" line from the engine. Unknown keywords are skipped.
fn parse_info_line(tokens: &[&str]) -> UsiInfo {
    let mut info = UsiInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "seldepth" => {
                i += 1;
                info.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                info.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                info.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "hashfull" => {
                i += 1;
                info.hashfull = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "currmove" => {
                i += 1;
                info.currmove = tokens.get(i).map(|s| s.to_string());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        info.score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => parse_mate(value_str),
                            _ => None,
                        };
                    }
                }
                match tokens.get(i + 1) {
                    Some(&"lowerbound") => {
                        info.bound = Some(ScoreBound::Lower);
                        i += 1;
                    }
                    Some(&"upperbound") => {
                        info.bound = Some(ScoreBound::Upper);
                        i += 1;
                    }
                    _ => {}
                }
            }
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    info.pv.push(tokens[i].to_string());
                    i += 1;
                }
                continue;
            }
            "string" => {
                // Free text runs to the end of the line
                let text = tokens[i + 1..].join(" ");
                info.string = Some(text);
                break;
            }
            _ => {}
        }
        i += 1;
    }

    info
}

fn parse_mate(value: &str) -> Option<Score> {
    match value {
        "+" => Some(Score::MateUnknown { winning: true }),
        "-" => Some(Score::MateUnknown { winning: false }),
        v => v.trim_start_matches('+').parse().ok().map(Score::Mate),
    }
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "hashfull"
            | "nps"
            | "string"
    )
}

/// `option name <id> type <t> [default <x>] [min <m>] [max <n>] [var <v>]*`
fn parse_option_line(tokens: &[&str]) -> Option<DeclaredOption> {
    let mut opt = DeclaredOption::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "name" => {
                i += 1;
                opt.name = tokens.get(i)?.to_string();
            }
            "type" => {
                i += 1;
                opt.kind = tokens.get(i)?.to_string();
            }
            "default" => {
                i += 1;
                opt.default = tokens.get(i).map(|s| s.to_string());
            }
            "min" => {
                i += 1;
                opt.min = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "max" => {
                i += 1;
                opt.max = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "var" => {
                i += 1;
                if let Some(v) = tokens.get(i) {
                    opt.vars.push(v.to_string());
                }
            }
            _ => {}
        }
        i += 1;
    }

    if opt.name.is_empty() || opt.kind.is_empty() {
        return None;
    }
    Some(opt)
}
