use std::fmt;
use std::str::FromStr;

use crate::UsiError;

/// A position as the engine addresses it: a start position plus the moves
/// played from it. Board semantics are left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    base: String,
    moves: Vec<String>,
}

impl Position {
    pub fn startpos() -> Self {
        Self {
            base: "startpos".to_string(),
            moves: Vec::new(),
        }
    }

    pub fn sfen(sfen: impl Into<String>) -> Self {
        Self {
            base: format!("sfen {}", sfen.into().trim()),
            moves: Vec::new(),
        }
    }

    /// The same position with `mv` appended to the move list.
    pub fn with_move(&self, mv: &str) -> Self {
        let mut moves = self.moves.clone();
        moves.push(mv.to_string());
        Self {
            base: self.base.clone(),
            moves,
        }
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn last_move(&self) -> Option<&str> {
        self.moves.last().map(String::as_str)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position {}", self.base)?;
        if !self.moves.is_empty() {
            write!(f, " moves {}", self.moves.join(" "))?;
        }
        Ok(())
    }
}

/// Accepts `position startpos moves ...`, `sfen ... moves ...` or a bare
/// `startpos`.
impl FromStr for Position {
    type Err = UsiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        if tokens.first() == Some(&"position") {
            tokens.remove(0);
        }

        let split = tokens
            .iter()
            .position(|t| *t == "moves")
            .unwrap_or(tokens.len());
        let (base, rest) = tokens.split_at(split);
        let moves: Vec<String> = rest.iter().skip(1).map(|m| m.to_string()).collect();

        match base {
            ["startpos"] => Ok(Self {
                base: "startpos".to_string(),
                moves,
            }),
            ["sfen", sfen @ ..] if !sfen.is_empty() => Ok(Self {
                base: format!("sfen {}", sfen.join(" ")),
                moves,
            }),
            _ => Err(UsiError::InvalidPosition(s.to_string())),
        }
    }
}
