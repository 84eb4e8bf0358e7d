//! End-to-end notification channel tests over real WebSockets
//!
//! An axum server plays the backend's push endpoints. Every connection gets
//! the same short burst of messages followed by a close frame, which forces
//! the client through its reconnect loop.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use kage_control::channels::ReconnectPolicy;
use kage_control::{AppContext, ClientConfig, ConnectionState, Endpoint, NotificationEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn notifications(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        for text in [
            r#"{"event":"order_created","order_id":1,"arrival_id":2}"#,
            "definitely not json",
            r#"{"event":"kitchen_alarm"}"#,
            r#"{"event":"order_status_changed","order_id":1,"status":"en_preparacion"}"#,
        ] {
            if socket.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = socket.send(Message::Close(None)).await;
    })
}

/// Keeps every socket open and counts upgrades
async fn spawn_backend(upgrades: Arc<AtomicUsize>) -> String {
    let app = Router::new()
        .route("/ws/notifications", get(notifications))
        .route(
            "/ws/tables",
            get(move |ws: WebSocketUpgrade| {
                let upgrades = upgrades.clone();
                async move {
                    upgrades.fetch_add(1, Ordering::SeqCst);
                    ws.on_upgrade(|mut socket: WebSocket| async move {
                        let _ = socket
                            .send(Message::Text(r#"{"event":"update_tables","tables":[{"id":1}]}"#.into()))
                            .await;
                        while let Some(Ok(_)) = socket.recv().await {}
                    })
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<NotificationEvent>) -> NotificationEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

#[tokio::test]
async fn test_events_survive_server_closes() {
    let url = spawn_backend(Arc::new(AtomicUsize::new(0))).await;
    let config = ClientConfig::new(url)
        .reconnect_policy(ReconnectPolicy::constant(Duration::from_millis(50)))
        .no_dedup();
    let ctx = AppContext::in_memory(config).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ctx
        .channel(Endpoint::Notifications)
        .unwrap()
        .on_event(move |event| {
            let _ = tx.send(event);
        })
        .start();

    // two full bursts means at least one reconnect happened
    let mut events = Vec::new();
    for _ in 0..4 {
        events.push(next_event(&mut rx).await);
    }

    assert_eq!(
        events[0],
        NotificationEvent::OrderCreated {
            order_id: 1,
            arrival_id: 2
        }
    );
    assert_eq!(events[2], events[0]);
    assert!(matches!(
        &events[1],
        NotificationEvent::OrderStatusChanged { status, .. } if status == "en_preparacion"
    ));
    assert!(handle.attempts() >= 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_repeated_bursts_are_deduplicated() {
    let url = spawn_backend(Arc::new(AtomicUsize::new(0))).await;
    let config = ClientConfig::new(url)
        .reconnect_policy(ReconnectPolicy::constant(Duration::from_millis(20)));
    let ctx = AppContext::in_memory(config).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ctx
        .channel(Endpoint::Notifications)
        .unwrap()
        .on_event(move |event| {
            let _ = tx.send(event);
        })
        .start();

    next_event(&mut rx).await;
    next_event(&mut rx).await;

    let mut state = handle.state_receiver();
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.attempts() < 4 {
            state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    assert!(rx.try_recv().is_err());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_table_snapshots_and_clean_shutdown() {
    let upgrades = Arc::new(AtomicUsize::new(0));
    let url = spawn_backend(upgrades.clone()).await;
    let ctx = AppContext::in_memory(ClientConfig::new(url)).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ctx
        .channel(Endpoint::Tables)
        .unwrap()
        .on_event(move |event| {
            let _ = tx.send(event);
        })
        .start();

    match next_event(&mut rx).await {
        NotificationEvent::UpdateTables { tables } => assert_eq!(tables.len(), 1),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(handle.connection_state(), ConnectionState::Open);

    let state = handle.state_receiver();
    handle.shutdown().await;

    assert_eq!(*state.borrow(), ConnectionState::Closed);
    assert_eq!(upgrades.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_server_reports_errors() {
    let config = ClientConfig::new("http://127.0.0.1:9")
        .reconnect_policy(ReconnectPolicy::constant(Duration::from_millis(10)).max_attempts(2));
    let ctx = AppContext::in_memory(config).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ctx
        .channel(Endpoint::Notifications)
        .unwrap()
        .on_error(move |e| {
            let _ = tx.send(e.to_string());
        })
        .start();

    let mut errors = Vec::new();
    for _ in 0..3 {
        let error = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        errors.push(error);
    }

    assert!(errors[0].starts_with("Connection error:"));
    assert_eq!(errors[2], "Gave up after 2 reconnect attempts");

    let mut state = handle.state_receiver();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *state.borrow_and_update() != ConnectionState::Closed {
            state.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    assert_eq!(handle.attempts(), 2);
}
