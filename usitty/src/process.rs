//! Engine processes as line channels.
//!
//! The engine runs with piped stdin/stdout inside its own directory (engines
//! commonly load evaluation files relative to it). A reader task forwards
//! stdout lines to the session, a writer task feeds session lines to stdin
//! and reaps the child once the session hangs up.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use usi_engine::{Connector, EngineConfig, LineChannel};

/// How long an engine may take to exit after its input closes.
const EXIT_GRACE: Duration = Duration::from_secs(5);

const CHANNEL_CAPACITY: usize = 256;

/// Spawns [`EngineConfig::target`] as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessConnector;

#[async_trait]
impl Connector for ProcessConnector {
    #[tracing::instrument(level = "info", skip_all, fields(engine = %config.name))]
    async fn connect(&self, config: &EngineConfig) -> io::Result<LineChannel> {
        let path = Path::new(&config.target);
        let mut command = Command::new(path);
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        tracing::debug!("Spawning engine process {}", path.display());
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn engine: {}", e);
                e
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("engine stdout unavailable"))?;

        let (to_engine, from_session) = mpsc::channel(CHANNEL_CAPACITY);
        let (to_session, from_engine) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(read_lines(stdout, to_session));
        tokio::spawn(write_lines(child, stdin, from_session));

        Ok(LineChannel::new(to_engine, from_engine))
    }
}

async fn read_lines(stdout: ChildStdout, to_session: mpsc::Sender<String>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if to_session.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("Engine stdout EOF");
                break;
            }
            Err(e) => {
                tracing::error!("Error reading from engine stdout: {}", e);
                break;
            }
        }
    }
}

async fn write_lines(mut child: Child, mut stdin: ChildStdin, mut from_session: mpsc::Receiver<String>) {
    while let Some(line) = from_session.recv().await {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            tracing::warn!("Failed to write to engine stdin: {}", e);
            break;
        }
    }
    drop(stdin);

    match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!("Engine exited with {}", status),
        Ok(Err(e)) => tracing::warn!("Failed to wait for engine: {}", e),
        Err(_) => {
            tracing::warn!("Engine did not exit after its input closed; killing it");
            if let Err(e) = child.kill().await {
                tracing::error!("Failed to kill engine: {}", e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_round_trip_through_process() {
        let config = EngineConfig::new("cat", "/bin/cat");
        let mut channel = ProcessConnector.connect(&config).await.unwrap();

        channel.send("usi").await.unwrap();
        channel.send("isready").await.unwrap();
        assert_eq!(channel.recv().await.as_deref(), Some("usi"));
        assert_eq!(channel.recv().await.as_deref(), Some("isready"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_an_error() {
        let config = EngineConfig::new("missing", "/nonexistent/engine");
        let err = ProcessConnector.connect(&config).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
