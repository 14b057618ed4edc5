//! Scripted in-memory engine for testing - only compiled in test mode or with
//! the mock feature.
//!
//! [`MockConnector`] hands out [`LineChannel`]s whose far end is driven by a
//! small task that answers the handshake on its own and otherwise records
//! every line it receives. Tests push engine output with [`MockEngine::send`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use crate::channel::{Connector, LineChannel};
use crate::EngineConfig;

/// How a mock engine reacts to protocol commands.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub name: String,
    /// Raw `option ...` lines announced during the handshake
    pub option_lines: Vec<String>,
    pub refuse_connection: bool,
    pub answer_usi: bool,
    pub close_on_usi: bool,
    pub answer_isready: bool,
    /// Line sent when `stop` interrupts a normal search
    pub bestmove_on_stop: String,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            name: "Mock".to_string(),
            option_lines: vec![
                "option name USI_Ponder type check default false".to_string(),
                "option name USI_MultiPV type spin default 1 min 1 max 10".to_string(),
            ],
            refuse_connection: false,
            answer_usi: true,
            close_on_usi: false,
            answer_isready: true,
            bestmove_on_stop: "bestmove resign".to_string(),
        }
    }
}

impl MockBehavior {
    /// Never answers `usi`.
    pub fn silent() -> Self {
        Self {
            answer_usi: false,
            ..Self::default()
        }
    }

    /// Hangs up as soon as it hears `usi`.
    pub fn closes_on_launch() -> Self {
        Self {
            close_on_usi: true,
            ..Self::default()
        }
    }

    /// Completes the handshake but never answers `isready`.
    pub fn never_ready() -> Self {
        Self {
            answer_isready: false,
            ..Self::default()
        }
    }

    pub fn refused() -> Self {
        Self {
            refuse_connection: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Running {
    Search,
    Mate,
}

/// Test-side handle to one running mock engine.
#[derive(Clone)]
pub struct MockEngine {
    received: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
    script_tx: mpsc::Sender<String>,
    close: Arc<Notify>,
}

impl MockEngine {
    fn spawn(mut peer: LineChannel, behavior: MockBehavior) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let notify = Arc::new(Notify::new());
        let close = Arc::new(Notify::new());
        let (script_tx, mut script_rx) = mpsc::channel::<String>(64);

        let engine = Self {
            received: received.clone(),
            notify: notify.clone(),
            script_tx,
            close: close.clone(),
        };

        tokio::spawn(async move {
            let mut running: Option<Running> = None;
            loop {
                tokio::select! {
                    line = peer.recv() => {
                        let Some(line) = line else { break };
                        let line = line.trim().to_string();
                        received.lock().unwrap().push(line.clone());
                        notify.notify_waiters();

                        let mut replies = Vec::new();
                        match line.as_str() {
                            "usi" if behavior.close_on_usi => break,
                            "usi" if behavior.answer_usi => {
                                replies.push(format!("id name {}", behavior.name));
                                replies.push("id author mock".to_string());
                                replies.extend(behavior.option_lines.iter().cloned());
                                replies.push("usiok".to_string());
                            }
                            "isready" if behavior.answer_isready => {
                                replies.push("readyok".to_string());
                            }
                            "stop" => match running.take() {
                                Some(Running::Search) => replies.push(behavior.bestmove_on_stop.clone()),
                                Some(Running::Mate) => replies.push("checkmate timeout".to_string()),
                                None => {}
                            },
                            "quit" => break,
                            l if l.starts_with("go mate") => running = Some(Running::Mate),
                            l if l.starts_with("go") => running = Some(Running::Search),
                            _ => {}
                        }
                        for reply in replies {
                            if peer.send(reply).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(out) = script_rx.recv() => {
                        if out.starts_with("bestmove") || out.starts_with("checkmate") {
                            running = None;
                        }
                        if peer.send(out).await.is_err() {
                            break;
                        }
                    }
                    _ = close.notified() => break,
                }
            }
        });

        engine
    }

    /// Push one line of engine output to the session.
    pub async fn send(&self, line: &str) {
        let _ = self.script_tx.send(line.to_string()).await;
    }

    /// Drop the connection as if the engine process died.
    pub fn disconnect(&self) {
        self.close.notify_one();
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Number of received lines starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.starts_with(prefix))
            .count()
    }

    /// Waits until at least `n` received lines start with `prefix`.
    /// Panics after five seconds.
    pub async fn wait_for(&self, prefix: &str, n: usize) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.count(prefix) >= n {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .is_err()
        {
            panic!(
                "timed out waiting for {} x {:?}; received {:?}",
                n,
                prefix,
                self.received()
            );
        }
    }
}

/// Connector that spawns a [`MockEngine`] per connection, keyed by
/// [`EngineConfig::target`].
#[derive(Clone, Default)]
pub struct MockConnector {
    behaviors: Arc<Mutex<HashMap<String, MockBehavior>>>,
    engines: Arc<Mutex<HashMap<String, MockEngine>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(self, target: &str, behavior: MockBehavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(target.to_string(), behavior);
        self
    }

    /// The most recent engine connected for `target`.
    pub fn engine(&self, target: &str) -> MockEngine {
        self.engines
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_else(|| panic!("no mock engine connected for {}", target))
    }

    pub fn connected(&self, target: &str) -> bool {
        self.engines.lock().unwrap().contains_key(target)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &EngineConfig) -> std::io::Result<LineChannel> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&config.target)
            .cloned()
            .unwrap_or_default();
        if behavior.refuse_connection {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("mock refused {}", config.target),
            ));
        }

        let (session_end, engine_end) = LineChannel::pair(64);
        let engine = MockEngine::spawn(engine_end, behavior);
        self.engines
            .lock()
            .unwrap()
            .insert(config.target.clone(), engine);
        Ok(session_end)
    }
}
