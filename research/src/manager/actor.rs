use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use usi_engine::{Connector, DispatchTable, Position, SessionId};

use super::commands::{ResearchCommand, ResearchError, ResearchEvent};
use super::POSITION_DEBOUNCE;
use crate::player::{Player, PlayerError, PlayerEvent};
use crate::settings::ResearchSettings;

struct EngineEntry {
    player: Player,
    /// When the running search on the current position must stop
    deadline: Option<Instant>,
    paused: bool,
}

pub(crate) struct ResearchActor {
    connector: Arc<dyn Connector>,
    table: DispatchTable,
    settings: ResearchSettings,
    engines: Vec<EngineEntry>,
    /// Position last fanned out to the engines
    position: Option<Position>,
    pending: Option<(Instant, Position)>,
    /// False between a position change and its fan-out
    synced: bool,
    player_tx: mpsc::UnboundedSender<PlayerEvent>,
    player_rx: mpsc::UnboundedReceiver<PlayerEvent>,
    events: mpsc::UnboundedSender<ResearchEvent>,
}

impl ResearchActor {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        table: DispatchTable,
        events: mpsc::UnboundedSender<ResearchEvent>,
    ) -> Self {
        let (player_tx, player_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            table,
            settings: ResearchSettings::default(),
            engines: Vec::new(),
            position: None,
            pending: None,
            synced: true,
            player_tx,
            player_rx,
            events,
        }
    }

    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::Receiver<ResearchCommand>) {
        tracing::debug!("Research actor started");

        loop {
            let debounce_at = self.pending.as_ref().map(|(at, _)| *at);
            let deadline = self.engines.iter().filter_map(|e| e.deadline).min();

            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ResearchCommand::Close { reply }) => {
                        self.close().await;
                        let _ = reply.send(());
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        tracing::debug!("All research handles dropped");
                        self.close().await;
                        break;
                    }
                },

                Some(event) = self.player_rx.recv() => self.forward(event),

                _ = time::sleep_until(debounce_at.unwrap_or_else(Instant::now)), if debounce_at.is_some() => {
                    self.fan_out().await;
                }

                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.stop_expired().await;
                }
            }
        }

        tracing::debug!("Research actor stopped");
    }

    async fn handle_command(&mut self, cmd: ResearchCommand) {
        match cmd {
            ResearchCommand::Launch { settings, reply } => {
                let _ = reply.send(self.launch(settings).await);
            }
            ResearchCommand::UpdatePosition { position } => {
                self.synced = false;
                self.pending = Some((Instant::now() + POSITION_DEBOUNCE, position));
            }
            ResearchCommand::Pause { session_id, reply } => {
                let _ = reply.send(self.pause(session_id).await);
            }
            ResearchCommand::Unpause { session_id, reply } => {
                let _ = reply.send(self.unpause(session_id).await);
            }
            ResearchCommand::IsPaused { session_id, reply } => {
                let paused = self
                    .entry(session_id)
                    .map(|entry| entry.paused)
                    .unwrap_or(false);
                let _ = reply.send(paused);
            }
            ResearchCommand::GetMultiPv { session_id, reply } => {
                let lines = match self.entry(session_id) {
                    Ok(entry) => entry.player.multi_pv().await,
                    Err(_) => None,
                };
                let _ = reply.send(lines);
            }
            ResearchCommand::SetMultiPv {
                session_id,
                lines,
                reply,
            } => {
                let _ = reply.send(self.set_multi_pv(session_id, lines).await);
            }
            ResearchCommand::Sessions { reply } => {
                let ids = self
                    .engines
                    .iter()
                    .map(|e| e.player.session_id())
                    .collect();
                let _ = reply.send(ids);
            }
            ResearchCommand::Close { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
        }
    }

    async fn launch(&mut self, settings: ResearchSettings) -> Result<Vec<SessionId>, ResearchError> {
        let configs = settings.engine_configs()?;
        if !self.engines.is_empty() {
            return Err(ResearchError::PreviousBatchRunning);
        }
        tracing::info!("Launching {} research engines", configs.len());

        let timeout = settings.engine_timeout();
        let launches = configs.into_iter().map(|config| {
            Player::launch(
                config,
                timeout,
                self.connector.as_ref(),
                &self.table,
                Some(self.player_tx.clone()),
            )
        });
        let mut players = Vec::new();
        let mut failure = None;
        for result in join_all(launches).await {
            match result {
                Ok(player) => players.push(player),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(e) => tracing::warn!("Additional launch failure: {}", e),
            }
        }
        if let Some(e) = failure {
            tracing::error!("Research launch failed: {}", e);
            self.close_players(&players).await;
            return Err(e.into());
        }

        let readies = join_all(players.iter().map(|p| p.ready_new_game())).await;
        if let Some(e) = readies.into_iter().find_map(Result::err) {
            tracing::error!("Research engine failed to get ready: {}", e);
            self.close_players(&players).await;
            return Err(e.into());
        }

        let ids = players.iter().map(Player::session_id).collect();
        self.engines = players
            .into_iter()
            .map(|player| EngineEntry {
                player,
                deadline: None,
                paused: false,
            })
            .collect();
        self.settings = settings;
        self.position = None;
        self.synced = true;
        Ok(ids)
    }

    /// Starts every unpaused engine on the debounced position.
    async fn fan_out(&mut self) {
        let Some((_, position)) = self.pending.take() else {
            return;
        };
        self.position = Some(position.clone());
        self.synced = true;
        if self.engines.is_empty() {
            return;
        }
        tracing::debug!("Researching {}", position);

        let deadline = self.settings.watchdog().map(|limit| Instant::now() + limit);
        let mut players = Vec::new();
        for entry in self.engines.iter_mut().filter(|e| !e.paused) {
            entry.deadline = deadline;
            players.push(entry.player.clone());
        }
        let results = join_all(
            players
                .iter()
                .map(|p| p.start_research(position.clone())),
        )
        .await;
        for (player, result) in players.iter().zip(results) {
            if let Err(e) = result {
                self.report(player.session_id(), e);
            }
        }
    }

    async fn stop_expired(&mut self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        for entry in &mut self.engines {
            if entry.deadline.is_some_and(|at| at <= now) {
                entry.deadline = None;
                expired.push(entry.player.clone());
            }
        }
        for player in expired {
            tracing::info!("Search time limit reached for session {}", player.session_id());
            if let Err(e) = player.stop().await {
                self.report(player.session_id(), e);
            }
        }
    }

    async fn pause(&mut self, session_id: SessionId) -> Result<(), ResearchError> {
        let entry = self.entry_mut(session_id)?;
        entry.paused = true;
        entry.deadline = None;
        entry.player.stop().await?;
        Ok(())
    }

    async fn unpause(&mut self, session_id: SessionId) -> Result<(), ResearchError> {
        let position = self.position.clone();
        let limit = self.settings.watchdog();
        let entry = self.entry_mut(session_id)?;
        entry.paused = false;
        if let Some(position) = position {
            entry.deadline = limit.map(|limit| Instant::now() + limit);
            entry.player.start_research(position).await?;
        }
        Ok(())
    }

    async fn set_multi_pv(&mut self, session_id: SessionId, lines: u32) -> Result<(), ResearchError> {
        let position = self.position.clone();
        let limit = self.settings.watchdog();
        let entry = self.entry_mut(session_id)?;

        tracing::debug!("Setting multi-PV of session {} to {}", session_id, lines);
        entry.player.set_multi_pv(lines).await?;
        entry.player.stop().await?;
        if let (Some(position), false) = (position, entry.paused) {
            tracing::debug!("Restarting session {} after multi-PV change", session_id);
            entry.deadline = limit.map(|limit| Instant::now() + limit);
            entry.player.start_research(position).await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.pending = None;
        self.position = None;
        self.synced = true;
        let engines = std::mem::take(&mut self.engines);
        if engines.is_empty() {
            return;
        }
        tracing::info!("Closing {} research engines", engines.len());
        let players: Vec<Player> = engines.into_iter().map(|e| e.player).collect();
        self.close_players(&players).await;
    }

    async fn close_players(&self, players: &[Player]) {
        let results = join_all(players.iter().map(|p| p.close())).await;
        for (player, result) in players.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!("Failed to close session {}: {}", player.session_id(), e);
                self.report(player.session_id(), e);
            }
        }
    }

    fn forward(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::SearchInfo(update) => {
                // Updates flushed before a fan-out can still be queued after it.
                if !self.synced || self.position.as_ref() != Some(&update.position) {
                    return;
                }
                let Some(index) = self
                    .engines
                    .iter()
                    .position(|e| e.player.session_id() == update.session_id)
                else {
                    return;
                };
                let _ = self
                    .events
                    .send(ResearchEvent::SearchInfo { index, update });
            }
            PlayerEvent::Error { session_id, error } => self.report(session_id, error),
        }
    }

    fn report(&self, session_id: SessionId, error: PlayerError) {
        let _ = self.events.send(ResearchEvent::Error { session_id, error });
    }

    fn entry(&self, session_id: SessionId) -> Result<&EngineEntry, ResearchError> {
        self.engines
            .iter()
            .find(|e| e.player.session_id() == session_id)
            .ok_or(ResearchError::UnknownSession(session_id))
    }

    fn entry_mut(&mut self, session_id: SessionId) -> Result<&mut EngineEntry, ResearchError> {
        self.engines
            .iter_mut()
            .find(|e| e.player.session_id() == session_id)
            .ok_or(ResearchError::UnknownSession(session_id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use usi_engine::mock::MockConnector;
    use usi_engine::EngineConfig;

    use super::*;
    use crate::player::SearchInfoUpdate;

    fn info(session_id: SessionId, position: &Position) -> PlayerEvent {
        PlayerEvent::SearchInfo(SearchInfoUpdate {
            session_id,
            position: position.clone(),
            lines: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_forward_drops_info_for_previous_position() {
        let connector = MockConnector::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut actor =
            ResearchActor::new(Arc::new(connector.clone()), DispatchTable::new(), events_tx);
        let player = Player::launch(
            EngineConfig::new("a", "a"),
            Duration::from_secs(1),
            &connector,
            &actor.table,
            None,
        )
        .await
        .unwrap();
        let session_id = player.session_id();
        actor.engines.push(EngineEntry {
            player,
            deadline: None,
            paused: false,
        });

        let previous: Position = "startpos".parse().unwrap();
        let current: Position = "startpos moves 7g7f".parse().unwrap();
        actor.position = Some(current.clone());
        actor.synced = true;

        actor.forward(info(session_id, &previous));
        assert!(events_rx.try_recv().is_err());

        actor.forward(info(session_id, &current));
        match events_rx.try_recv() {
            Ok(ResearchEvent::SearchInfo { index, update }) => {
                assert_eq!(index, 0);
                assert_eq!(update.position, current);
            }
            other => panic!("expected search info, got {:?}", other),
        }
    }
}
