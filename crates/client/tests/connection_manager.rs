use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_channel::mpsc::{TryRecvError, UnboundedReceiver};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::time::Instant;

use gruzreis_client::ws::transport::mock::{MockConnector, MockServer};
use gruzreis_client::ws::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, Credentials, ReconnectPolicy,
    StatusChange,
};
use gruzreis_shared::ConnectError;

fn setup() -> (ConnectionManager, MockConnector) {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(Arc::new(connector.clone()));
    (manager, connector)
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new("http://test.local").with_reconnect(ReconnectPolicy::new(5, 1000))
}

fn config_with_login() -> ConnectionConfig {
    config().with_credentials(Credentials::new("79991234567", "x"))
}

fn auth_ok(token: &str) -> Value {
    json!({
        "success": true,
        "data": { "guid": "u-1", "token": token, "name": "Иван", "user_type": 1 }
    })
}

async fn wait_for(changes: &mut UnboundedReceiver<StatusChange>, status: ConnectionStatus) {
    loop {
        let change = changes.next().await.expect("status stream ended");
        if change.status == status {
            return;
        }
    }
}

/// Start a credentialed connect and return the server end once the
/// handshake request has arrived.
async fn start_login(
    manager: &ConnectionManager,
    connector: &MockConnector,
) -> (
    tokio::task::JoinHandle<Result<Option<gruzreis_shared::AuthSession>, ConnectError>>,
    MockServer,
) {
    let task = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect(config_with_login()).await }
    });
    let mut server = connector.accept().await.unwrap();
    let request = server.recv().await.unwrap();
    assert_eq!(request.event, "authorization");
    (task, server)
}

#[tokio::test(start_paused = true)]
async fn connect_without_credentials_goes_straight_to_connected() {
    let (manager, connector) = setup();

    let session = manager.connect(config()).await.unwrap();
    assert!(session.is_none());
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    let mut server = connector.accept().await.unwrap();
    assert!(manager.emit("get_cargos", json!({ "token": "t" })));
    let sent = server.recv().await.unwrap();
    assert_eq!(sent.event, "get_cargos");
    assert_eq!(sent.payload, json!({ "token": "t" }));
}

#[tokio::test(start_paused = true)]
async fn second_connect_while_connecting_creates_no_transport() {
    let (manager, connector) = setup();

    let (first, second) = tokio::join!(manager.connect(config()), manager.connect(config()));
    assert!(first.is_ok());
    assert_eq!(second, Err(ConnectError::AlreadyConnecting));
    assert_eq!(connector.open_calls(), 1);

    // Also refused once connected.
    assert_eq!(
        manager.connect(config()).await,
        Err(ConnectError::AlreadyConnecting)
    );
    assert_eq!(connector.open_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn handshake_success_returns_the_session() {
    let (manager, connector) = setup();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    manager.watch_status(move |change| sink.lock().unwrap().push(change.status));

    let (task, mut server) = start_login(&manager, &connector).await;
    assert_eq!(manager.status(), ConnectionStatus::Authenticating);
    server.send("authorization", auth_ok("tok-1"));

    let session = task.await.unwrap().unwrap().unwrap();
    assert_eq!(session.token, "tok-1");
    assert_eq!(session.name, "Иван");
    assert_eq!(
        *observed.lock().unwrap(),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Connected,
        ]
    );
    assert!(!server.is_closed());
}

#[tokio::test(start_paused = true)]
async fn rejected_handshake_is_an_error_without_retry() {
    let (manager, connector) = setup();

    let task = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect(config_with_login()).await }
    });
    let mut server = connector.accept().await.unwrap();
    let request = server.recv().await.unwrap();
    assert_eq!(request.event, "authorization");
    assert_eq!(
        request.payload,
        json!({ "login": "79991234567", "password": "x" })
    );

    server.send(
        "authorization",
        json!({ "success": false, "message": "bad creds" }),
    );
    let result = task.await.unwrap();
    assert_eq!(result, Err(ConnectError::AuthRejected("bad creds".into())));
    assert_eq!(manager.status(), ConnectionStatus::Error);
    assert!(server.is_closed());
    assert_eq!(manager.last_error().as_deref(), Some("authorization rejected: bad creds"));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_calls(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn response_without_success_flag_is_a_failure() {
    let (manager, connector) = setup();
    let (task, server) = start_login(&manager, &connector).await;

    server.send("authorization", json!({ "data": { "token": "t" } }));
    assert_eq!(
        task.await.unwrap(),
        Err(ConnectError::AuthRejected("authorization failed".into()))
    );
    assert_eq!(manager.status(), ConnectionStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_closes_the_transport() {
    let (manager, connector) = setup();
    let (task, mut server) = start_login(&manager, &connector).await;
    let started = Instant::now();

    let result = task.await.unwrap();
    assert_eq!(result, Err(ConnectError::AuthTimeout(10_000)));
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(manager.status(), ConnectionStatus::Error);
    assert!(server.is_closed());
}

#[tokio::test(start_paused = true)]
async fn transport_failure_on_connect_is_an_error_and_manual_retry_works() {
    let (manager, connector) = setup();
    connector.fail_next(1);

    let result = manager.connect(config()).await;
    assert!(matches!(result, Err(ConnectError::Transport(_))));
    assert_eq!(manager.status(), ConnectionStatus::Error);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.open_calls(), 1);

    manager.connect(config()).await.unwrap();
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert_eq!(manager.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn reconnect_backoff_is_linear_and_bounded() {
    let (manager, connector) = setup();
    manager.connect(config()).await.unwrap();
    let server = connector.accept().await.unwrap();
    let mut changes = manager.status_changes();

    connector.fail_all(true);
    let closed_at = Instant::now();
    server.drop_connection();
    wait_for(&mut changes, ConnectionStatus::Error).await;

    let opens = connector.open_times();
    assert_eq!(opens.len(), 6, "initial open plus five retries");
    let mut previous = closed_at;
    for (i, opened) in opens[1..].iter().enumerate() {
        let gap = opened.duration_since(previous);
        let expected = Duration::from_millis(1000 * (i as u64 + 1));
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(50),
            "retry {} after {:?}, expected {:?}",
            i + 1,
            gap,
            expected
        );
        previous = *opened;
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_calls(), 6);
    assert_eq!(manager.status(), ConnectionStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn reconnect_reports_attempts_and_resets_counter() {
    let (manager, connector) = setup();
    manager.connect(config()).await.unwrap();
    let server = connector.accept().await.unwrap();
    let mut changes = manager.status_changes();

    connector.fail_next(1);
    server.drop_connection();

    let mut seen = Vec::new();
    loop {
        let change = changes.next().await.unwrap();
        seen.push((change.status, change.attempt));
        if change.status == ConnectionStatus::Connected {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![
            (ConnectionStatus::Reconnecting, 1),
            (ConnectionStatus::Reconnecting, 2),
            (ConnectionStatus::Connected, 0),
        ]
    );
    assert_eq!(connector.open_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_max_attempts_fails_on_first_close() {
    let (manager, connector) = setup();
    manager
        .connect(config().with_reconnect(ReconnectPolicy::new(0, 1000)))
        .await
        .unwrap();
    let server = connector.accept().await.unwrap();
    let mut changes = manager.status_changes();

    server.close();
    wait_for(&mut changes, ConnectionStatus::Error).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.open_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_with_reconnect_disabled_goes_to_disconnected() {
    let (manager, connector) = setup();
    manager
        .connect(config().with_reconnect(ReconnectPolicy::disabled()))
        .await
        .unwrap();
    let server = connector.accept().await.unwrap();
    let mut changes = manager.status_changes();

    server.close();
    wait_for(&mut changes, ConnectionStatus::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.open_calls(), 1);
    assert!(!manager.emit("get_cargos", json!({})));
}

#[tokio::test(start_paused = true)]
async fn late_response_from_a_replaced_session_does_not_leak_into_the_new_one() {
    let (manager, connector) = setup();
    let replayed = Arc::new(Mutex::new(Vec::new()));
    let sink = replayed.clone();
    manager.on("authorization", move |payload| sink.lock().unwrap().push(payload.clone()));

    let (first, old_server) = start_login(&manager, &connector).await;
    manager.disconnect();
    assert_eq!(first.await.unwrap(), Err(ConnectError::Cancelled));

    let (second, new_server) = start_login(&manager, &connector).await;
    old_server.send("authorization", auth_ok("stale"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.status(), ConnectionStatus::Authenticating);

    new_server.send("authorization", auth_ok("fresh"));
    let session = second.await.unwrap().unwrap().unwrap();
    assert_eq!(session.token, "fresh");
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert!(replayed.lock().unwrap().is_empty());
    assert_eq!(connector.open_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_handshake_ignores_the_late_response() {
    let (manager, connector) = setup();
    let (task, server) = start_login(&manager, &connector).await;
    assert_eq!(manager.status(), ConnectionStatus::Authenticating);

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(task.await.unwrap(), Err(ConnectError::Cancelled));

    let mut changes = manager.status_changes();
    server.send("authorization", auth_ok("late"));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        changes.try_recv(),
        Err(TryRecvError::Empty),
        "no transition after disconnect"
    );
    assert_eq!(connector.open_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn emit_while_disconnected_returns_false() {
    let (manager, _connector) = setup();
    assert!(!manager.emit("get_cargos", json!({ "token": "t" })));
    assert_eq!(
        manager.try_emit("get_cargos", json!({ "token": "t" })),
        Err(ConnectError::NotConnected)
    );
}

#[tokio::test(start_paused = true)]
async fn listeners_run_in_order_and_survive_reconnects() {
    let (manager, connector) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let log = log.clone();
        manager.on("cargo_updated", move |payload| {
            log.lock()
                .unwrap()
                .push(format!("{}:{}", tag, payload["guid"].as_str().unwrap_or("")));
        });
    }
    let (_, mut delivered) = manager.events("cargo_updated");

    manager.connect(config()).await.unwrap();
    let server = connector.accept().await.unwrap();
    server.send("cargo_updated", json!({ "guid": "1" }));
    delivered.next().await.unwrap();

    let mut changes = manager.status_changes();
    server.drop_connection();
    let server = connector.accept().await.unwrap();
    wait_for(&mut changes, ConnectionStatus::Connected).await;

    server.send("cargo_updated", json!({ "guid": "2" }));
    delivered.next().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:1", "second:1", "first:2", "second:2"]
    );
}

#[tokio::test(start_paused = true)]
async fn off_removes_one_or_all_listeners() {
    let (manager, _connector) = setup();
    let a = manager.on("publish", |_| {});
    manager.on("publish", |_| {});
    manager.on("new_offer", |_| {});

    assert_eq!(manager.off("publish", Some(a)), 1);
    assert_eq!(manager.off("publish", Some(a)), 0);
    assert_eq!(manager.off("new_offer", None), 1);
    assert_eq!(manager.listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_keeps_listeners_and_reset_clears_them() {
    let (manager, _connector) = setup();
    manager.connect(config()).await.unwrap();
    manager.on("get_cargos", |_| {});

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(manager.listener_count(), 1);

    manager.reset();
    assert_eq!(manager.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_replays_the_handshake_for_listeners() {
    let (manager, connector) = setup();
    let (task, server) = start_login(&manager, &connector).await;
    server.send("authorization", auth_ok("tok-1"));
    task.await.unwrap().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer = manager.clone();
    manager.on("authorization", move |payload| {
        let token = payload["data"]["token"].as_str().unwrap_or("").to_string();
        sink.lock().unwrap().push((token, observer.status()));
    });

    let mut changes = manager.status_changes();
    server.drop_connection();
    let mut server = connector.accept().await.unwrap();
    let replay = server.recv().await.unwrap();
    assert_eq!(replay.event, "authorization");
    server.send("authorization", auth_ok("tok-2"));
    wait_for(&mut changes, ConnectionStatus::Connected).await;

    // Status observers see `connected` before the listener runs.
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("tok-2".to_string(), ConnectionStatus::Connected)]
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_reconnect_handshake_stops_retrying() {
    let (manager, connector) = setup();
    let (task, server) = start_login(&manager, &connector).await;
    server.send("authorization", auth_ok("tok-1"));
    task.await.unwrap().unwrap();

    let mut changes = manager.status_changes();
    server.drop_connection();
    let mut server = connector.accept().await.unwrap();
    server.recv().await.unwrap();
    server.send(
        "authorization",
        json!({ "success": false, "message": "session expired" }),
    );
    wait_for(&mut changes, ConnectionStatus::Error).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_calls(), 2);
    assert!(server.is_closed());
}
