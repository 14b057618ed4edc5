//! Line-based duplex transport between a session and its engine.
//!
//! The core never spawns processes or opens sockets itself. A [`Connector`]
//! supplied by the application turns an [`EngineConfig`] into a
//! [`LineChannel`]; the channel is closed once `recv` yields `None`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::EngineConfig;

#[derive(Debug)]
pub struct LineChannel {
    outgoing: mpsc::Sender<String>,
    incoming: mpsc::Receiver<String>,
}

impl LineChannel {
    pub fn new(outgoing: mpsc::Sender<String>, incoming: mpsc::Receiver<String>) -> Self {
        Self { outgoing, incoming }
    }

    /// Two connected in-memory ends: lines sent on one are received on the other.
    pub fn pair(capacity: usize) -> (LineChannel, LineChannel) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (LineChannel::new(a_tx, b_rx), LineChannel::new(b_tx, a_rx))
    }

    /// Sends one line. Fails only when the other end is gone.
    pub async fn send(&self, line: impl Into<String>) -> Result<(), ChannelClosed> {
        let line = line.into();
        tracing::trace!("USI >> {}", line);
        self.outgoing.send(line).await.map_err(|_| ChannelClosed)
    }

    pub async fn recv(&mut self) -> Option<String> {
        let line = self.incoming.recv().await?;
        tracing::trace!("USI << {}", line.trim_end());
        Some(line)
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("line channel closed")]
pub struct ChannelClosed;

/// Opens the transport for one engine.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &EngineConfig) -> std::io::Result<LineChannel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_duplex() {
        let (mut a, mut b) = LineChannel::pair(4);
        a.send("usi").await.unwrap();
        b.send("usiok").await.unwrap();
        assert_eq!(b.recv().await.as_deref(), Some("usi"));
        assert_eq!(a.recv().await.as_deref(), Some("usiok"));
    }

    #[tokio::test]
    async fn test_drop_closes_other_end() {
        let (a, mut b) = LineChannel::pair(4);
        drop(a);
        assert!(b.recv().await.is_none());
        assert!(b.send("quit").await.is_err());
    }
}
