//! Per-rank buffer of search progress with a fixed flush window.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use usi_engine::{Score, UsiInfo};

/// Bursts of `info` lines inside this window reach consumers as one update.
pub const INFO_FLUSH_WINDOW: Duration = Duration::from_millis(100);

/// Latest known state of one multi-PV line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchInfo {
    /// 1-based multi-PV rank
    pub multipv: u32,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
    pub text: Option<String>,
}

impl SearchInfo {
    fn merge(&mut self, info: &UsiInfo) {
        if info.depth.is_some() {
            self.depth = info.depth;
        }
        if info.nodes.is_some() {
            self.nodes = info.nodes;
        }
        if info.score.is_some() {
            self.score = info.score;
        }
        if !info.pv.is_empty() {
            self.pv = info.pv.clone();
        } else if let (Some(mv), true) = (&info.currmove, self.pv.is_empty()) {
            self.pv = vec![mv.clone()];
        }
        if info.string.is_some() {
            self.text = info.string.clone();
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct InfoBuffer {
    lines: BTreeMap<u32, SearchInfo>,
    flush_at: Option<Instant>,
}

impl InfoBuffer {
    pub(crate) fn clear(&mut self) {
        self.lines.clear();
        self.flush_at = None;
    }

    /// Folds `info` into its rank and arms the flush window if idle.
    pub(crate) fn update(&mut self, info: &UsiInfo, now: Instant) {
        let rank = info.multipv.unwrap_or(1).max(1);
        self.lines
            .entry(rank)
            .or_insert_with(|| SearchInfo {
                multipv: rank,
                ..SearchInfo::default()
            })
            .merge(info);
        if self.flush_at.is_none() {
            self.flush_at = Some(now + INFO_FLUSH_WINDOW);
        }
    }

    pub(crate) fn flush_deadline(&self) -> Option<Instant> {
        self.flush_at
    }

    /// All lines ordered by rank, or `None` when nothing changed.
    pub(crate) fn take_update(&mut self) -> Option<Vec<SearchInfo>> {
        self.flush_at.take()?;
        Some(self.lines.values().cloned().collect())
    }

    /// The best line with `played` stripped from the head of its PV.
    pub(crate) fn result_for(&self, played: &str) -> Option<SearchInfo> {
        let mut info = self.lines.get(&1)?.clone();
        if info.pv.first().map(String::as_str) == Some(played) {
            info.pv.remove(0);
        }
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usi_engine::usi::{parse_usi_message, UsiMessage};

    fn info(line: &str) -> UsiInfo {
        match parse_usi_message(line).unwrap() {
            UsiMessage::Info(info) => info,
            other => panic!("not an info line: {:?}", other),
        }
    }

    #[test]
    fn test_currmove_stands_in_for_missing_pv() {
        let mut buffer = InfoBuffer::default();
        buffer.update(&info("info multipv 1 depth 15 score cp 81 currmove 2g2f"), Instant::now());
        let lines = buffer.take_update().unwrap();
        assert_eq!(lines[0].pv, ["2g2f"]);
        assert_eq!(lines[0].depth, Some(15));
    }

    #[test]
    fn test_score_without_pv_keeps_last_pv() {
        let mut buffer = InfoBuffer::default();
        let now = Instant::now();
        buffer.update(&info("info depth 17 score cp 123 pv 2g2f 8c8d 2f2e"), now);
        buffer.update(&info("info score cp -75 string free format message"), now);
        let lines = buffer.take_update().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].depth, Some(17));
        assert_eq!(lines[0].score, Some(Score::Centipawns(-75)));
        assert_eq!(lines[0].pv, ["2g2f", "8c8d", "2f2e"]);
        assert_eq!(lines[0].text.as_deref(), Some("free format message"));
    }

    #[test]
    fn test_ranks_are_isolated() {
        let mut buffer = InfoBuffer::default();
        let now = Instant::now();
        buffer.update(&info("info multipv 2 depth 10 score cp 5 pv 5g5f"), now);
        buffer.update(&info("info multipv 1 depth 11 score cp 40 pv 2g2f 8c8d"), now);
        let lines = buffer.take_update().unwrap();
        assert_eq!(lines[0].multipv, 1);
        assert_eq!(lines[0].pv, ["2g2f", "8c8d"]);
        assert_eq!(lines[1].multipv, 2);
        assert_eq!(lines[1].pv, ["5g5f"]);
        assert_eq!(lines[1].depth, Some(10));
    }

    #[test]
    fn test_window_is_armed_once() {
        let mut buffer = InfoBuffer::default();
        let start = Instant::now();
        buffer.update(&info("info depth 1"), start);
        buffer.update(&info("info depth 2"), start + Duration::from_millis(60));
        assert_eq!(buffer.flush_deadline(), Some(start + INFO_FLUSH_WINDOW));
        assert!(buffer.take_update().is_some());
        assert!(buffer.take_update().is_none());
        assert!(buffer.flush_deadline().is_none());
    }

    #[test]
    fn test_result_strips_played_move() {
        let mut buffer = InfoBuffer::default();
        buffer.update(&info("info depth 32 pv 2g2f 8c8d 2f2e"), Instant::now());
        let result = buffer.result_for("2g2f").unwrap();
        assert_eq!(result.pv, ["8c8d", "2f2e"]);
        let other = buffer.result_for("7g7f").unwrap();
        assert_eq!(other.pv.len(), 3);
        buffer.clear();
        assert!(buffer.result_for("2g2f").is_none());
    }
}
