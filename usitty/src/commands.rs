//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use usi_engine::{DispatchTable, EngineSession, MateSearchResult, Position, Score};
use usi_research::{Player, ResearchEvent, ResearchManager, SearchInfo};

use crate::config;
use crate::process::ProcessConnector;

/// Launches the engine, prints what it declares and quits it.
pub async fn info(path: &Path, json: bool) -> anyhow::Result<()> {
    let engine = config::engine_from_path(path);
    let timeout = Duration::from_secs(config::get_engine_timeout_secs());
    let table = DispatchTable::new();
    let (sink, _events) = tokio::sync::mpsc::unbounded_channel();

    let session = EngineSession::launch(&engine, timeout, &ProcessConnector, &table, sink)
        .await
        .with_context(|| format!("failed to launch {}", path.display()))?;
    let identity = session.identity().clone();
    session.quit().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
        return Ok(());
    }

    println!("name:   {}", identity.name.as_deref().unwrap_or("-"));
    println!("author: {}", identity.author.as_deref().unwrap_or("-"));
    for option in &identity.options {
        let mut line = format!("option {} ({})", option.name, option.kind);
        if let Some(default) = &option.default {
            line.push_str(&format!(" default {}", default));
        }
        if let (Some(min), Some(max)) = (option.min, option.max) {
            line.push_str(&format!(" [{}..{}]", min, max));
        }
        if !option.vars.is_empty() {
            line.push_str(&format!(" {{{}}}", option.vars.join(", ")));
        }
        println!("{}", line);
    }
    Ok(())
}

/// Runs a mate search on one position and prints the outcome.
pub async fn mate(engine: &Path, position: &str, max_seconds: Option<u32>) -> anyhow::Result<()> {
    let engine = config::load_engine_config(engine)?;
    let position: Position = position.parse().context("invalid position")?;
    let timeout = Duration::from_secs(config::get_engine_timeout_secs());
    let table = DispatchTable::new();

    let player = Player::launch(engine, timeout, &ProcessConnector, &table, None).await?;
    player.ready_new_game().await?;
    let result = player.start_mate_search(position, max_seconds).await?;
    let outcome = result.await.context("mate search was cancelled")?;
    player.close().await?;

    match outcome? {
        MateSearchResult::Checkmate(moves) => println!("checkmate {}", moves.join(" ")),
        MateSearchResult::NoMate => println!("nomate"),
        MateSearchResult::NotImplemented => println!("notimplemented"),
        MateSearchResult::Timeout => println!("timeout"),
    }
    Ok(())
}

/// Live analysis: every stdin line is a position for all engines.
pub async fn research(settings: &Path) -> anyhow::Result<()> {
    let settings = config::load_research_settings(settings)?;
    let (manager, mut events) = ResearchManager::new(Arc::new(ProcessConnector));
    let sessions = manager.launch(settings).await?;
    tracing::info!("Research running on sessions {:?}", sessions);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ResearchEvent::SearchInfo { index, update } => {
                    for line in &update.lines {
                        println!("[{}] {}", index, format_info(line));
                    }
                }
                ResearchEvent::Error { session_id, error } => {
                    eprintln!("session {}: {}", session_id, error);
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match line.parse::<Position>() {
                    Ok(position) => manager.update_position(position).await?,
                    Err(e) => eprintln!("{}", e),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.close().await;
    drop(manager);
    let _ = printer.await;
    Ok(())
}

fn format_info(info: &SearchInfo) -> String {
    let mut parts = vec![format!("multipv {}", info.multipv)];
    if let Some(depth) = info.depth {
        parts.push(format!("depth {}", depth));
    }
    if let Some(nodes) = info.nodes {
        parts.push(format!("nodes {}", nodes));
    }
    match info.score {
        Some(Score::Centipawns(cp)) => parts.push(format!("cp {}", cp)),
        Some(Score::Mate(plies)) => parts.push(format!("mate {}", plies)),
        Some(Score::MateUnknown { winning }) => {
            parts.push(format!("mate {}", if winning { "+" } else { "-" }))
        }
        None => {}
    }
    if !info.pv.is_empty() {
        parts.push(format!("pv {}", info.pv.join(" ")));
    }
    if let Some(text) = &info.text {
        parts.push(format!("string {}", text));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_info() {
        let info = SearchInfo {
            multipv: 2,
            depth: Some(17),
            nodes: None,
            score: Some(Score::Centipawns(-98)),
            pv: vec!["5g5f".to_string(), "8c8d".to_string()],
            text: None,
        };
        assert_eq!(format_info(&info), "multipv 2 depth 17 cp -98 pv 5g5f 8c8d");
    }

    #[test]
    fn test_format_unknown_mate() {
        let info = SearchInfo {
            multipv: 1,
            score: Some(Score::MateUnknown { winning: false }),
            ..SearchInfo::default()
        };
        assert_eq!(format_info(&info), "multipv 1 mate -");
    }
}
