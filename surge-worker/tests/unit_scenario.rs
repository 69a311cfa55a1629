mod support;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use support::{as_dyn, settings, Behavior, Broken, MockConnection};
use surge_client::Connection;
use surge_common::{LatencyMode, Result, SurgeError};
use surge_worker::scenario::builtin::{NAVIGATOR_PAGES, ORDER_FLOW};
use surge_worker::{Scenario, ScenarioKind, ScenarioRegistry};
use tokio_util::sync::CancellationToken;

/// Run `name` from the default registry for `run_for`, then cancel it.
async fn run_for(name: &str, connections: &[Arc<MockConnection>], run_for: Duration) -> Result<()> {
    let registry = ScenarioRegistry::with_defaults();
    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(run_for).await;
        timer.cancel();
    });
    registry.run(name, &as_dyn(connections), cancel).await
}

#[test]
fn test_scenario_kind_name_round_trip() {
    for kind in ScenarioKind::ALL {
        assert_eq!(ScenarioKind::from_name(kind.as_name()), Some(kind));
    }
    assert_eq!(ScenarioKind::from_name("navigator"), None);
    assert_eq!(ScenarioKind::from_name(""), None);
}

#[test]
fn test_default_registry_lists_enabled_scenarios() {
    let registry = ScenarioRegistry::with_defaults();
    assert_eq!(registry.names(), vec!["BlazingPizza", "Clicker", "Navigator", "Rogue"]);
    assert!(registry.contains("Navigator"));
    assert!(!registry.contains("Reconnects"));
    assert!(!registry.contains("navigator"));
    assert!(!ScenarioKind::Reconnects.is_enabled());
}

#[test]
fn test_empty_registry() {
    let registry = ScenarioRegistry::new();
    assert!(registry.names().is_empty());
    assert!(!registry.contains("Navigator"));
}

#[tokio::test]
async fn test_unknown_scenario_is_rejected() {
    let registry = ScenarioRegistry::with_defaults();
    let conn = MockConnection::detailed(0);

    let err = registry
        .run("Nonexistent", &as_dyn(&[Arc::clone(&conn)]), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, SurgeError::UnknownScenario("Nonexistent".to_string()));
    assert!(conn.paths().is_empty());
}

#[tokio::test]
async fn test_disabled_scenario_is_rejected() {
    let registry = ScenarioRegistry::with_defaults();
    let conn = MockConnection::detailed(0);

    let err = registry
        .run("Reconnects", &as_dyn(&[Arc::clone(&conn)]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SurgeError::UnknownScenario(msg) if msg.contains("disabled")));
    assert!(conn.paths().is_empty());
}

#[tokio::test]
async fn test_scenario_errors_are_wrapped_with_the_name() {
    let mut registry = ScenarioRegistry::new();
    registry.register("Custom", Arc::new(Broken));

    let err = registry.run("Custom", &[], CancellationToken::new()).await.unwrap_err();
    assert_eq!(
        err,
        SurgeError::ScenarioRuntime("Custom: Network error: socket reset".to_string())
    );
}

struct CountConnections;

#[async_trait]
impl Scenario for CountConnections {
    async fn run(&self, connections: &[Arc<dyn Connection>], _cancel: CancellationToken) -> Result<()> {
        if connections.len() == 3 {
            Ok(())
        } else {
            Err(SurgeError::ScenarioRuntime(format!("got {} connections", connections.len())))
        }
    }
}

#[tokio::test]
async fn test_custom_registration_receives_every_connection() {
    let mut registry = ScenarioRegistry::new();
    registry.register("Count", Arc::new(CountConnections));
    let connections: Vec<_> = (0..3).map(MockConnection::detailed).collect();

    registry
        .run("Count", &as_dyn(&connections), CancellationToken::new())
        .await
        .expect("scenario failed");
}

#[tokio::test]
async fn test_navigator_cycles_pages_on_every_connection() {
    let connections: Vec<_> = (0..2).map(MockConnection::detailed).collect();

    run_for("Navigator", &connections, Duration::from_millis(100)).await.expect("navigator failed");

    for conn in &connections {
        let paths = conn.paths();
        assert!(paths.len() >= NAVIGATOR_PAGES.len(), "only {} requests", paths.len());
        for (i, path) in paths.iter().enumerate() {
            assert_eq!(path, NAVIGATOR_PAGES[i % NAVIGATOR_PAGES.len()]);
        }
    }
}

#[tokio::test]
async fn test_clicker_opens_counter_then_clicks() {
    let connections = vec![MockConnection::detailed(0)];

    run_for("Clicker", &connections, Duration::from_millis(50)).await.expect("clicker failed");

    let paths = connections[0].paths();
    assert!(paths.len() >= 2);
    assert_eq!(paths[0], "/counter");
    assert!(paths[1..].iter().all(|p| p == "/counter/increment"));
}

#[tokio::test]
async fn test_blazing_pizza_follows_the_order_flow() {
    let connections = vec![MockConnection::detailed(0)];

    run_for("BlazingPizza", &connections, Duration::from_millis(100))
        .await
        .expect("blazing pizza failed");

    let paths = connections[0].paths();
    assert!(paths.len() >= ORDER_FLOW.len(), "only {} requests", paths.len());
    for (i, path) in paths.iter().enumerate() {
        assert_eq!(path, ORDER_FLOW[i % ORDER_FLOW.len()]);
    }
}

#[tokio::test]
async fn test_rogue_stops_on_cancel() {
    let connections: Vec<_> = (0..2).map(MockConnection::detailed).collect();

    tokio::time::timeout(
        Duration::from_secs(2),
        run_for("Rogue", &connections, Duration::from_millis(100)),
    )
    .await
    .expect("rogue did not observe cancellation")
    .expect("rogue failed");

    assert!(connections.iter().all(|c| !c.paths().is_empty()));
}

#[tokio::test]
async fn test_failing_connection_cancels_its_siblings() {
    let failing = Arc::new(MockConnection::new(
        settings(0, LatencyMode::Detailed),
        Behavior { fail_send_after: Some(2), ..Behavior::new() },
    ));
    let healthy = MockConnection::detailed(1);
    let connections = vec![Arc::clone(&failing), Arc::clone(&healthy)];

    // The outer token never fires; only the failure can end the run.
    let registry = ScenarioRegistry::with_defaults();
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        registry.run("Navigator", &as_dyn(&connections), CancellationToken::new()),
    )
    .await
    .expect("siblings were not cancelled");

    assert!(matches!(outcome, Err(SurgeError::ScenarioRuntime(msg)) if msg.contains("HTTP 500")));
    assert_eq!(failing.paths().len(), 2);
}

#[tokio::test]
async fn test_reconnects_reopens_sessions_when_enabled() {
    let mut registry = ScenarioRegistry::new();
    registry.register("Reconnects", ScenarioKind::Reconnects.scenario());
    let connections = vec![MockConnection::detailed(0)];

    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        timer.cancel();
    });
    registry.run("Reconnects", &as_dyn(&connections), cancel).await.expect("reconnects failed");

    let conn = &connections[0];
    assert!(conn.initializations.load(std::sync::atomic::Ordering::Acquire) >= 1);
    assert!(conn.paths().iter().all(|p| p == "/"));
}
