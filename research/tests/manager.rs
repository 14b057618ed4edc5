use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use usi_engine::mock::{MockBehavior, MockConnector, MockEngine};
use usi_engine::{DispatchTable, EngineConfig, EngineOption, Position, SessionError, SessionId};
use usi_research::{
    PlayerError, ResearchError, ResearchEvent, ResearchManager, ResearchSettings,
    SearchInfoUpdate,
};

fn engine(target: &str) -> EngineConfig {
    EngineConfig::new(target, target).with_option(
        "USI_MultiPV",
        EngineOption::Spin {
            value: 1,
            min: Some(1),
            max: Some(10),
        },
    )
}

fn settings(targets: &[&str]) -> ResearchSettings {
    let mut settings = ResearchSettings::new(engine(targets[0]));
    for target in &targets[1..] {
        settings = settings.with_secondary(engine(target));
    }
    settings
}

fn position(text: &str) -> Position {
    text.parse().expect("invalid test position")
}

fn spawn_manager(connector: &MockConnector) -> (ResearchManager, mpsc::UnboundedReceiver<ResearchEvent>) {
    ResearchManager::with_table(Arc::new(connector.clone()), DispatchTable::new())
}

async fn next_info(events: &mut mpsc::UnboundedReceiver<ResearchEvent>) -> (usize, SearchInfoUpdate) {
    loop {
        match events.recv().await {
            Some(ResearchEvent::SearchInfo { index, update }) => return (index, update),
            Some(ResearchEvent::Error { error, .. }) => panic!("unexpected error: {}", error),
            None => panic!("research events closed"),
        }
    }
}

fn last_position(engine: &MockEngine) -> String {
    engine
        .received()
        .iter()
        .rev()
        .find(|l| l.starts_with("position"))
        .cloned()
        .unwrap_or_default()
}

fn index_of(engine: &MockEngine, line: &str) -> usize {
    engine
        .received()
        .iter()
        .rposition(|l| l == line)
        .unwrap_or_else(|| panic!("{:?} never received", line))
}

#[tokio::test(start_paused = true)]
async fn test_position_changes_are_debounced() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let ids = manager.launch(settings(&["a", "b"])).await.unwrap();
    assert_eq!(ids.len(), 2);

    manager
        .update_position(position("startpos moves 7g7f"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager
        .update_position(position("startpos moves 7g7f 3c3d"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager
        .update_position(position("startpos moves 7g7f 3c3d 2g2f"))
        .await
        .unwrap();

    for target in ["a", "b"] {
        let engine = connector.engine(target);
        engine.wait_for("go infinite", 1).await;
        assert_eq!(
            last_position(&engine),
            "position startpos moves 7g7f 3c3d 2g2f"
        );
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(connector.engine("a").count("go infinite"), 1);
    assert_eq!(connector.engine("b").count("go infinite"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_info_is_tagged_with_engine_index() {
    let connector = MockConnector::new();
    let (manager, mut events) = spawn_manager(&connector);
    let ids = manager.launch(settings(&["a", "b"])).await.unwrap();
    let target = position("startpos moves 7g7f");

    manager.update_position(target.clone()).await.unwrap();
    let engine = connector.engine("b");
    engine.wait_for("go infinite", 1).await;
    engine
        .send("info depth 12 score cp 40 pv 3c3d 2g2f")
        .await;

    let (index, update) = next_info(&mut events).await;
    assert_eq!(index, 1);
    assert_eq!(update.session_id, ids[1]);
    assert_eq!(update.position, target);
    assert_eq!(update.lines[0].pv, ["3c3d", "2g2f"]);
}

#[tokio::test(start_paused = true)]
async fn test_info_is_suppressed_until_position_settles() {
    let connector = MockConnector::new();
    let (manager, mut events) = spawn_manager(&connector);
    manager.launch(settings(&["a"])).await.unwrap();
    let engine = connector.engine("a");

    manager
        .update_position(position("startpos moves 7g7f"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    manager
        .update_position(position("startpos moves 7g7f 3c3d"))
        .await
        .unwrap();
    engine.send("info depth 9 score cp 10 pv 3c3d").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(events.try_recv().is_err());

    engine.wait_for("go infinite", 2).await;
    engine.send("info depth 10 score cp 12 pv 2g2f").await;
    let (_, update) = next_info(&mut events).await;
    assert_eq!(update.position, position("startpos moves 7g7f 3c3d"));
    assert_eq!(update.lines[0].depth, Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_time_limit_stops_each_search_once() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let mut config = settings(&["a"]);
    config.enable_max_seconds = true;
    config.max_seconds = 5;
    manager.launch(config).await.unwrap();
    let engine = connector.engine("a");

    manager
        .update_position(position("startpos"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(engine.count("stop"), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    engine.wait_for("stop", 1).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.count("stop"), 1);
}

fn timed_settings(max_seconds: u64) -> ResearchSettings {
    let mut config = settings(&["a"]);
    config.enable_max_seconds = true;
    config.max_seconds = max_seconds;
    config
}

#[tokio::test(start_paused = true)]
async fn test_zero_time_limit_never_stops() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    manager.launch(timed_settings(0)).await.unwrap();
    let engine = connector.engine("a");

    manager
        .update_position(position("startpos"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(engine.count("stop"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_position_restarts_time_limit() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    manager.launch(timed_settings(5)).await.unwrap();
    let engine = connector.engine("a");

    manager
        .update_position(position("startpos"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    manager
        .update_position(position("startpos moves 7g7f"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 2).await;
    // Superseding the first search stops it once.
    let stops = engine.count("stop");

    // Past the first search's limit, within the second's.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(engine.count("stop"), stops);

    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.wait_for("stop", stops + 1).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.count("stop"), stops + 1);
}

#[tokio::test(start_paused = true)]
async fn test_unpause_restarts_time_limit() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let ids = manager.launch(timed_settings(5)).await.unwrap();
    let engine = connector.engine("a");

    manager
        .update_position(position("startpos"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.pause(ids[0]).await.unwrap();
    engine.wait_for("stop", 1).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.unpause(ids[0]).await.unwrap();
    engine.wait_for("go infinite", 2).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(engine.count("stop"), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    engine.wait_for("stop", 2).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.count("stop"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_set_multi_pv_restarts_time_limit() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let ids = manager.launch(timed_settings(5)).await.unwrap();
    let engine = connector.engine("a");

    manager
        .update_position(position("startpos"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    manager.set_multi_pv(ids[0], 2).await.unwrap();
    engine.wait_for("go infinite", 2).await;
    assert_eq!(engine.count("stop"), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(engine.count("stop"), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.wait_for("stop", 2).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.count("stop"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_unpause() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let ids = manager.launch(settings(&["a", "b"])).await.unwrap();
    let engine = connector.engine("a");

    manager
        .update_position(position("startpos moves 7g7f"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    manager.pause(ids[0]).await.unwrap();
    assert!(manager.is_paused(ids[0]).await);
    assert!(!manager.is_paused(ids[1]).await);
    engine.wait_for("stop", 1).await;

    manager
        .update_position(position("startpos moves 7g7f 3c3d"))
        .await
        .unwrap();
    connector.engine("b").wait_for("go infinite", 2).await;
    assert_eq!(engine.count("go infinite"), 1);

    manager.unpause(ids[0]).await.unwrap();
    assert!(!manager.is_paused(ids[0]).await);
    engine.wait_for("go infinite", 2).await;
    assert_eq!(last_position(&engine), "position startpos moves 7g7f 3c3d");

    assert_eq!(
        manager.pause(SessionId(999)).await,
        Err(ResearchError::UnknownSession(SessionId(999)))
    );
}

#[tokio::test]
async fn test_set_multi_pv_restarts_search() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let ids = manager.launch(settings(&["a"])).await.unwrap();
    let engine = connector.engine("a");
    assert_eq!(manager.multi_pv(ids[0]).await, Some(1));

    manager
        .update_position(position("startpos moves 7g7f"))
        .await
        .unwrap();
    engine.wait_for("go infinite", 1).await;

    manager.set_multi_pv(ids[0], 3).await.unwrap();
    engine.wait_for("go infinite", 2).await;
    assert_eq!(manager.multi_pv(ids[0]).await, Some(3));

    let stop = index_of(&engine, "stop");
    let option = index_of(&engine, "setoption name USI_MultiPV value 3");
    let go = index_of(&engine, "go infinite");
    assert!(stop < option);
    assert!(option < go);
    assert_eq!(last_position(&engine), "position startpos moves 7g7f");
}

#[tokio::test]
async fn test_set_multi_pv_unsupported() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let ids = manager
        .launch(ResearchSettings::new(EngineConfig::new("plain", "plain")))
        .await
        .unwrap();

    assert_eq!(manager.multi_pv(ids[0]).await, None);
    assert_eq!(
        manager.set_multi_pv(ids[0], 2).await,
        Err(ResearchError::Player(PlayerError::MultiPvUnsupported(
            "plain".to_string()
        )))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_engine_aborts_whole_batch() {
    let connector = MockConnector::new().with_engine("b", MockBehavior::never_ready());
    let table = DispatchTable::new();
    let (manager, _events) = ResearchManager::with_table(Arc::new(connector.clone()), table.clone());
    let mut config = settings(&["a", "b"]);
    config.engine_timeout_seconds = 1;

    assert_eq!(
        manager.launch(config).await,
        Err(ResearchError::Player(PlayerError::Session(
            SessionError::ProtocolTimeout { command: "isready" }
        )))
    );
    connector.engine("a").wait_for("quit", 1).await;
    connector.engine("b").wait_for("quit", 1).await;
    assert!(table.is_empty());
    assert!(manager.sessions().await.is_empty());

    // The failed batch left nothing behind to block a new one.
    let ids = manager.launch(settings(&["a"])).await.unwrap();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn test_refused_engine_aborts_whole_batch() {
    let connector = MockConnector::new().with_engine("b", MockBehavior::refused());
    let (manager, _events) = spawn_manager(&connector);

    let err = manager.launch(settings(&["a", "b"])).await.unwrap_err();
    assert!(matches!(
        err,
        ResearchError::Player(PlayerError::Session(SessionError::LaunchRejected { .. }))
    ));
    connector.engine("a").wait_for("quit", 1).await;
    assert!(manager.table().is_empty());
}

#[tokio::test]
async fn test_missing_engine_configuration() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);

    let err = manager
        .launch(ResearchSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::Configuration(_)));
    assert!(!connector.connected("a"));
}

#[tokio::test]
async fn test_second_batch_requires_close() {
    let connector = MockConnector::new();
    let (manager, _events) = spawn_manager(&connector);
    let ids = manager.launch(settings(&["a"])).await.unwrap();
    assert!(manager.session_exists(ids[0]).await);

    assert_eq!(
        manager.launch(settings(&["b"])).await,
        Err(ResearchError::PreviousBatchRunning)
    );

    manager.close().await;
    connector.engine("a").wait_for("quit", 1).await;
    assert!(!manager.session_exists(ids[0]).await);
    assert!(manager.table().is_empty());

    let ids = manager.launch(settings(&["b"])).await.unwrap();
    assert_eq!(manager.sessions().await, ids);
}
