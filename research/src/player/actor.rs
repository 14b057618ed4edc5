use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use usi_engine::{BestMove, EngineConfig, EngineSession, Position, SessionEvent, TimeStates};

use super::commands::{MateReply, PlayerCommand, PlayerError, SearchReply};
use super::info::InfoBuffer;
use super::{PlayerEvent, SearchInfoUpdate, SearchResult};

/// The request whose events are currently accepted.
enum Request {
    Search {
        generation: u64,
        /// Ponder generation this search was converted from
        pondered: Option<u64>,
        position: Position,
        result: SearchReply,
    },
    Ponder {
        generation: u64,
        position: Position,
    },
    Research {
        generation: u64,
        position: Position,
    },
    Mate {
        generation: u64,
        position: Position,
        result: MateReply,
    },
}

impl Request {
    fn accepts(&self, generation: u64, position: &Position) -> bool {
        let (current, pondered, expected) = match self {
            Request::Search {
                generation,
                pondered,
                position,
                ..
            } => (*generation, *pondered, position),
            Request::Ponder {
                generation,
                position,
            }
            | Request::Research {
                generation,
                position,
            }
            | Request::Mate {
                generation,
                position,
                ..
            } => (*generation, None, position),
        };
        (generation == current || Some(generation) == pondered) && position == expected
    }
}

pub(crate) struct PlayerActor {
    session: EngineSession,
    config: EngineConfig,
    events: Option<mpsc::UnboundedSender<PlayerEvent>>,
    generation: u64,
    current: Option<Request>,
    /// Opponent reply predicted by the last `bestmove ... ponder`
    ponder_move: Option<String>,
    info: InfoBuffer,
    info_position: Option<Position>,
}

impl PlayerActor {
    pub(crate) fn new(
        session: EngineSession,
        config: EngineConfig,
        events: Option<mpsc::UnboundedSender<PlayerEvent>>,
    ) -> Self {
        Self {
            session,
            config,
            events,
            generation: 0,
            current: None,
            ponder_move: None,
            info: InfoBuffer::default(),
            info_position: None,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<PlayerCommand>,
        mut session_events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        tracing::debug!("Player actor started");
        let mut events_open = true;

        loop {
            let flush_at = self.info.flush_deadline();
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(PlayerCommand::Close { reply }) => {
                        let result = self.close().await;
                        let _ = reply.send(result);
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        tracing::debug!("All player handles dropped");
                        let _ = self.close().await;
                        break;
                    }
                },

                event = session_events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => events_open = false,
                },

                _ = time::sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    self.flush_info();
                }
            }
        }

        tracing::debug!("Player actor stopped");
    }

    async fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::ReadyNewGame { reply } => {
                let result = self.session.ready_new_game().await;
                let _ = reply.send(result.map_err(Into::into));
            }
            PlayerCommand::StartSearch {
                position,
                times,
                result,
                reply,
            } => {
                let _ = reply.send(self.start_search(position, times, result).await);
            }
            PlayerCommand::StartPonder {
                position,
                times,
                reply,
            } => {
                let _ = reply.send(self.start_ponder(position, times).await);
            }
            PlayerCommand::StartResearch { position, reply } => {
                let generation = self.next_generation(&position);
                let result = self.session.go_infinite(position.clone(), generation).await;
                if result.is_ok() {
                    self.current = Some(Request::Research {
                        generation,
                        position,
                    });
                }
                let _ = reply.send(result.map_err(Into::into));
            }
            PlayerCommand::StartMateSearch {
                position,
                max_seconds,
                result,
                reply,
            } => {
                let generation = self.next_generation(&position);
                match self
                    .session
                    .go_mate(position.clone(), max_seconds, generation)
                    .await
                {
                    Ok(()) => {
                        self.current = Some(Request::Mate {
                            generation,
                            position,
                            result,
                        });
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            PlayerCommand::Stop { reply } => {
                let result = self.session.stop().await;
                let _ = reply.send(result.map_err(Into::into));
            }
            PlayerCommand::SetMultiPv { lines, reply } => {
                let _ = reply.send(self.set_multi_pv(lines).await);
            }
            PlayerCommand::GetMultiPv { reply } => {
                let _ = reply.send(self.config.multi_pv());
            }
            PlayerCommand::GameOver { result, reply } => {
                self.current = None;
                self.ponder_move = None;
                let outcome = self.session.game_over(result).await;
                let _ = reply.send(outcome.map_err(Into::into));
            }
            PlayerCommand::Close { reply } => {
                let _ = reply.send(self.close().await);
            }
        }
    }

    async fn start_search(
        &mut self,
        position: Position,
        times: TimeStates,
        result: SearchReply,
    ) -> Result<(), PlayerError> {
        self.generation += 1;
        let generation = self.generation;

        if let Some(Request::Ponder {
            generation: pondered,
            position: ponder_position,
        }) = &self.current
        {
            if *ponder_position == position {
                let pondered = *pondered;
                match self.session.ponder_hit(times, generation).await {
                    Ok(()) => {
                        tracing::debug!("Ponder hit on {}", position);
                        self.current = Some(Request::Search {
                            generation,
                            pondered: Some(pondered),
                            position,
                            result,
                        });
                        return Ok(());
                    }
                    Err(e) => tracing::debug!("Ponder hit rejected ({}), searching afresh", e),
                }
            } else {
                tracing::debug!("Opponent did not play the ponder move");
            }
        }

        self.reset_info(&position);
        self.session
            .go(position.clone(), times, generation)
            .await?;
        if self.current.is_some() {
            tracing::debug!("Superseding previous request");
        }
        self.current = Some(Request::Search {
            generation,
            pondered: None,
            position,
            result,
        });
        Ok(())
    }

    async fn start_ponder(
        &mut self,
        position: Position,
        times: TimeStates,
    ) -> Result<(), PlayerError> {
        if !self.config.ponder_enabled() {
            return Ok(());
        }
        if matches!(self.current, Some(Request::Ponder { .. })) {
            tracing::debug!("Already pondering");
            return Ok(());
        }
        let Some(ponder_move) = self.ponder_move.take() else {
            tracing::debug!("No ponder move predicted");
            return Ok(());
        };

        let position = position.with_move(&ponder_move);
        let generation = self.next_generation(&position);
        self.session
            .go_ponder(position.clone(), times, generation)
            .await?;
        self.current = Some(Request::Ponder {
            generation,
            position,
        });
        Ok(())
    }

    async fn set_multi_pv(&mut self, lines: u32) -> Result<(), PlayerError> {
        let Some(option) = self.config.multi_pv_option().map(str::to_string) else {
            return Err(PlayerError::MultiPvUnsupported(self.config.name.clone()));
        };
        self.session.set_option(option, lines.to_string()).await?;
        self.config.set_multi_pv(lines);
        tracing::info!("Multi-PV set to {}", lines);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PlayerError> {
        self.current = None;
        self.info.clear();
        self.session.close().await.map_err(Into::into)
    }

    fn next_generation(&mut self, position: &Position) -> u64 {
        self.generation += 1;
        self.reset_info(position);
        self.generation
    }

    fn reset_info(&mut self, position: &Position) {
        self.info.clear();
        self.info_position = Some(position.clone());
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Info {
                generation,
                position,
                info,
            } => {
                if self.is_current(generation, &position) {
                    self.info.update(&info, Instant::now());
                }
            }
            SessionEvent::BestMove {
                generation,
                position,
                best,
            } => {
                if !self.is_current(generation, &position) {
                    tracing::debug!("Discarding stale bestmove for generation {}", generation);
                    return;
                }
                match self.current.take() {
                    Some(Request::Search { result, .. }) => {
                        let outcome = match best {
                            BestMove::Move { mv, ponder } => {
                                self.ponder_move = ponder.clone();
                                SearchResult::Move {
                                    info: self.info.result_for(&mv),
                                    mv,
                                    ponder,
                                }
                            }
                            BestMove::Resign => SearchResult::Resign,
                            BestMove::Win => SearchResult::Win,
                        };
                        let _ = result.send(Ok(outcome));
                    }
                    Some(Request::Ponder { .. }) => {
                        tracing::debug!("Ponder search ended without ponderhit")
                    }
                    Some(Request::Research { .. }) => tracing::debug!("Research search ended"),
                    other => self.current = other,
                }
            }
            SessionEvent::Checkmate {
                generation,
                position,
                result,
            } => {
                if !self.is_current(generation, &position) {
                    tracing::debug!("Discarding stale checkmate for generation {}", generation);
                    return;
                }
                match self.current.take() {
                    Some(Request::Mate { result: reply, .. }) => {
                        let _ = reply.send(Ok(result));
                    }
                    other => self.current = other,
                }
            }
            SessionEvent::Error(error) => {
                tracing::error!("Engine session error: {}", error);
                let error = PlayerError::from(error);
                match self.current.take() {
                    Some(Request::Search { result, .. }) => {
                        let _ = result.send(Err(error.clone()));
                    }
                    Some(Request::Mate { result, .. }) => {
                        let _ = result.send(Err(error.clone()));
                    }
                    _ => {}
                }
                self.emit(PlayerEvent::Error {
                    session_id: self.session.id(),
                    error,
                });
            }
        }
    }

    fn is_current(&self, generation: u64, position: &Position) -> bool {
        self.current
            .as_ref()
            .is_some_and(|request| request.accepts(generation, position))
    }

    fn flush_info(&mut self) {
        let Some(lines) = self.info.take_update() else {
            return;
        };
        let Some(position) = self.info_position.clone() else {
            return;
        };
        self.emit(PlayerEvent::SearchInfo(SearchInfoUpdate {
            session_id: self.session.id(),
            position,
            lines,
        }));
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converted_search_accepts_ponder_generation() {
        let position = Position::startpos().with_move("7g7f");
        let (result, _rx) = tokio::sync::oneshot::channel();
        let request = Request::Search {
            generation: 5,
            pondered: Some(4),
            position: position.clone(),
            result,
        };
        assert!(request.accepts(5, &position));
        assert!(request.accepts(4, &position));
        assert!(!request.accepts(3, &position));
        assert!(!request.accepts(5, &Position::startpos()));
    }
}
