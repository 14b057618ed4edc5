use tokio::sync::mpsc;

use super::commands::{Reply, SessionCommand, SessionError};
use super::state::{ActiveSearch, SearchRequest, SessionState};
use crate::channel::LineChannel;
use crate::usi::{parse_usi_message, UsiCommand, UsiMessage};
use crate::{DispatchTable, GameResult, GoMode, SessionEvent, SessionId};

/// Owns the channel and all protocol state of one engine.
/// Processes commands and engine lines sequentially.
pub(crate) struct SessionActor {
    id: SessionId,
    channel: LineChannel,
    table: DispatchTable,
    state: SessionState,
    active: Option<ActiveSearch>,
    /// Next search, started once the running one reports its result
    queued: Option<SearchRequest>,
    /// Options received mid-search, sent once the engine is idle
    deferred_options: Vec<(String, String)>,
    pending_gameover: Option<GameResult>,
    pending_ready: Option<Reply>,
}

impl SessionActor {
    pub(crate) fn new(id: SessionId, channel: LineChannel, table: DispatchTable) -> Self {
        Self {
            id,
            channel,
            table,
            state: SessionState::Ready,
            active: None,
            queued: None,
            deferred_options: Vec::new(),
            pending_gameover: None,
            pending_ready: None,
        }
    }

    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        tracing::info!("Session actor started");

        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        tracing::info!("All session handles dropped");
                        self.shutdown().await;
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }

                line = self.channel.recv() => {
                    match line {
                        Some(line) => self.handle_line(&line).await,
                        None => {
                            self.on_channel_closed();
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Session actor exited");
    }

    /// Returns false once the session has shut down.
    async fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::ReadyNewGame { reply } => match self.state {
                SessionState::Ready | SessionState::Idle => {
                    match self.send(UsiCommand::IsReady).await {
                        Ok(()) => self.pending_ready = Some(reply),
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                state => {
                    let _ = reply.send(Err(SessionError::InvalidState {
                        operation: "prepare a new game",
                        state,
                    }));
                }
            },
            SessionCommand::SetOption { name, value, reply } => {
                let result = match self.state {
                    SessionState::Ready | SessionState::Idle => {
                        self.send(UsiCommand::SetOption { name, value }).await
                    }
                    state if state.is_searching() => {
                        tracing::debug!("Deferring option {} until the search ends", name);
                        self.deferred_options.retain(|(n, _)| *n != name);
                        self.deferred_options.push((name, value));
                        Ok(())
                    }
                    state => Err(SessionError::InvalidState {
                        operation: "set an option",
                        state,
                    }),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Go { request, reply } => {
                let result = match self.state {
                    SessionState::Idle => self.start(request).await,
                    state if state.is_searching() => {
                        if let Some(old) = self.queued.replace(request) {
                            tracing::debug!("Queued search {} superseded", old.generation);
                        }
                        self.request_stop().await
                    }
                    state => Err(SessionError::InvalidState {
                        operation: "start a search",
                        state,
                    }),
                };
                let _ = reply.send(result);
            }
            SessionCommand::PonderHit {
                times,
                generation,
                reply,
            } => {
                let result = self.ponder_hit(times, generation).await;
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                self.queued = None;
                let result = self.request_stop().await;
                let _ = reply.send(result);
            }
            SessionCommand::GameOver { result, reply } => {
                let outcome = match self.state {
                    SessionState::Ready | SessionState::Idle => {
                        self.state = SessionState::Ready;
                        self.send(UsiCommand::GameOver(result)).await
                    }
                    state if state.is_searching() => {
                        // The engine must report its move before it hears the result
                        self.queued = None;
                        self.pending_gameover = Some(result);
                        self.request_stop().await
                    }
                    state => Err(SessionError::InvalidState {
                        operation: "send gameover",
                        state,
                    }),
                };
                let _ = reply.send(outcome);
            }
            SessionCommand::GetState { reply } => {
                let _ = reply.send(self.state);
            }
            SessionCommand::Quit { reply } => {
                self.shutdown().await;
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    async fn handle_line(&mut self, line: &str) {
        let msg = match parse_usi_message(line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Dropping unparseable line: {}", e);
                return;
            }
        };

        match msg {
            UsiMessage::ReadyOk => {
                let Some(reply) = self.pending_ready.take() else {
                    tracing::trace!("Ignoring unsolicited readyok");
                    return;
                };
                if reply.is_closed() {
                    tracing::warn!("Ignoring readyok that arrived after the caller gave up");
                    return;
                }
                let result = self.send(UsiCommand::UsiNewGame).await;
                if result.is_ok() {
                    self.state = SessionState::Idle;
                    tracing::debug!("Engine ready for a new game");
                }
                let _ = reply.send(result);
            }
            UsiMessage::BestMove(best) => match self.active.take() {
                Some(active) if !active.request.is_mate() => {
                    tracing::debug!("Received bestmove: {:?}", best);
                    self.table.dispatch(
                        self.id,
                        SessionEvent::BestMove {
                            generation: active.request.generation,
                            position: active.request.position,
                            best,
                        },
                    );
                    self.finish_search().await;
                }
                other => {
                    tracing::debug!("Ignoring bestmove outside a search: {:?}", best);
                    self.active = other;
                }
            },
            UsiMessage::Checkmate(result) => match self.active.take() {
                Some(active) if active.request.is_mate() => {
                    tracing::debug!("Received checkmate: {:?}", result);
                    self.table.dispatch(
                        self.id,
                        SessionEvent::Checkmate {
                            generation: active.request.generation,
                            position: active.request.position,
                            result,
                        },
                    );
                    self.finish_search().await;
                }
                other => {
                    tracing::debug!("Ignoring checkmate outside a mate search: {:?}", result);
                    self.active = other;
                }
            },
            UsiMessage::Info(info) => {
                if let Some(active) = &self.active {
                    self.table.dispatch(
                        self.id,
                        SessionEvent::Info {
                            generation: active.request.generation,
                            position: active.request.position.clone(),
                            info,
                        },
                    );
                }
            }
            other => tracing::trace!("Ignoring USI message: {:?}", other),
        }
    }

    async fn start(&mut self, request: SearchRequest) -> Result<(), SessionError> {
        self.send(UsiCommand::Position(request.position.clone()))
            .await?;
        self.send(UsiCommand::Go(request.mode.clone())).await?;
        self.state = request.target_state();
        tracing::debug!(
            "Started search {} ({}) on {}",
            request.generation,
            self.state,
            request.position
        );
        self.active = Some(ActiveSearch {
            request,
            stop_sent: false,
        });
        Ok(())
    }

    async fn ponder_hit(
        &mut self,
        times: crate::TimeStates,
        generation: u64,
    ) -> Result<(), SessionError> {
        let converts = self.state == SessionState::Pondering
            && self.queued.is_none()
            && self.active.as_ref().is_some_and(|a| !a.stop_sent);
        if !converts {
            return Err(SessionError::InvalidState {
                operation: "ponderhit",
                state: self.state,
            });
        }

        self.send(UsiCommand::PonderHit).await?;
        if let Some(active) = self.active.as_mut() {
            active.request.mode = GoMode::Timed(times);
            active.request.generation = generation;
        }
        self.state = SessionState::Searching;
        tracing::debug!("Ponder converted to search {}", generation);
        Ok(())
    }

    /// Sends `stop` at most once per running search.
    async fn request_stop(&mut self) -> Result<(), SessionError> {
        let needs_stop = matches!(&self.active, Some(a) if !a.stop_sent);
        if !needs_stop {
            return Ok(());
        }
        self.send(UsiCommand::Stop).await?;
        if let Some(active) = self.active.as_mut() {
            active.stop_sent = true;
        }
        Ok(())
    }

    /// The running search delivered its terminal event.
    async fn finish_search(&mut self) {
        self.state = SessionState::Idle;

        if let Some(result) = self.pending_gameover.take() {
            self.state = SessionState::Ready;
            if let Err(e) = self.send(UsiCommand::GameOver(result)).await {
                tracing::error!("Failed to send gameover: {}", e);
            }
            return;
        }

        for (name, value) in std::mem::take(&mut self.deferred_options) {
            if let Err(e) = self.send(UsiCommand::SetOption { name, value }).await {
                tracing::error!("Failed to send deferred option: {}", e);
            }
        }

        if let Some(next) = self.queued.take() {
            if let Err(e) = self.start(next).await {
                tracing::error!("Failed to start queued search: {}", e);
            }
        }
    }

    async fn send(&self, cmd: UsiCommand) -> Result<(), SessionError> {
        self.channel
            .send(cmd.to_string())
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    fn on_channel_closed(&mut self) {
        tracing::warn!("Engine channel closed while {}", self.state);
        self.table
            .dispatch(self.id, SessionEvent::Error(SessionError::ChannelClosed));
        if let Some(reply) = self.pending_ready.take() {
            let _ = reply.send(Err(SessionError::ChannelClosed));
        }
        self.table.unregister(self.id);
        self.state = SessionState::Closed;
    }

    async fn shutdown(&mut self) {
        tracing::info!("Sending quit to engine");
        if let Err(e) = self.send(UsiCommand::Quit).await {
            tracing::debug!("Engine already gone: {}", e);
        }
        if let Some(reply) = self.pending_ready.take() {
            let _ = reply.send(Err(SessionError::Closed));
        }
        self.table.unregister(self.id);
        self.state = SessionState::Closed;
    }
}
