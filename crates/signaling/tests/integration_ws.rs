//! Integrationstests fuer den WebSocket-Transport
//!
//! Der Router laeuft auf einem zufaelligen Port, die Clients sprechen ihn
//! mit tokio-tungstenite an.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use voxlink_observability::VoxlinkMetrics;
use voxlink_signaling::{ws_router, SignalingConfig, SignalingState, WsOptionen};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WARTEZEIT: Duration = Duration::from_secs(5);

/// Test-Logging, gesteuert ueber `RUST_LOG`
fn log_initialisieren() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

async fn server_starten(config: SignalingConfig) -> (SocketAddr, watch::Sender<bool>) {
    log_initialisieren();
    let state = SignalingState::neu(config, VoxlinkMetrics::neu().unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = ws_router(Arc::clone(&state), &WsOptionen::default(), shutdown_rx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, shutdown_tx)
}

async fn verbinden(addr: SocketAddr) -> WsClient {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("WebSocket-Verbindung fehlgeschlagen");
    // Initialer Snapshot
    assert_eq!(empfangen(&mut ws).await["event"], "users");
    ws
}

async fn senden(ws: &mut WsClient, event: Value) {
    ws.send(Message::Text(event.to_string())).await.unwrap();
}

/// Naechstes Text-Event als JSON
async fn empfangen(ws: &mut WsClient) -> Value {
    loop {
        let nachricht = tokio::time::timeout(WARTEZEIT, ws.next())
            .await
            .expect("Timeout beim Warten auf ein Event")
            .expect("Verbindung unerwartet geschlossen")
            .unwrap();
        match nachricht {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            andere => panic!("Unerwartete Nachricht: {andere:?}"),
        }
    }
}

#[tokio::test]
async fn register_offer_und_end_call() {
    let (addr, _shutdown) = server_starten(SignalingConfig::default()).await;
    let mut alice = verbinden(addr).await;
    let mut bob = verbinden(addr).await;

    senden(&mut alice, json!({"event": "register", "data": "alice"})).await;
    assert_eq!(
        empfangen(&mut alice).await,
        json!({"event": "users", "data": ["alice"]})
    );
    assert_eq!(
        empfangen(&mut bob).await,
        json!({"event": "users", "data": ["alice"]})
    );

    senden(&mut bob, json!({"event": "register", "data": "bob"})).await;
    empfangen(&mut alice).await;
    assert_eq!(
        empfangen(&mut bob).await,
        json!({"event": "users", "data": ["alice", "bob"]})
    );

    senden(
        &mut alice,
        json!({"event": "offer", "data": {"to": "bob", "offer": {"sdp": "o"}}}),
    )
    .await;
    assert_eq!(
        empfangen(&mut bob).await,
        json!({"event": "offer", "data": {"from": "alice", "offer": {"sdp": "o"}}})
    );

    senden(
        &mut bob,
        json!({"event": "answer", "data": {"to": "alice", "answer": {"sdp": "a"}}}),
    )
    .await;
    assert_eq!(
        empfangen(&mut alice).await,
        json!({"event": "answer", "data": {"answer": {"sdp": "a"}, "from": "bob"}})
    );

    senden(&mut bob, json!({"event": "end-call", "data": {"to": "alice"}})).await;
    assert_eq!(empfangen(&mut alice).await, json!({"event": "call-ended"}));
}

#[tokio::test]
async fn ungueltiger_text_trennt_nicht() {
    let (addr, _shutdown) = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(addr).await;

    ws.send(Message::Text("kein json".into())).await.unwrap();
    ws.send(Message::Binary(vec![0, 1, 2])).await.unwrap();

    senden(&mut ws, json!({"event": "register", "data": "erin"})).await;
    assert_eq!(
        empfangen(&mut ws).await,
        json!({"event": "users", "data": ["erin"]})
    );
}

#[tokio::test]
async fn ungueltiger_name_erzeugt_username_error() {
    let (addr, _shutdown) = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(addr).await;

    senden(&mut ws, json!({"event": "register", "data": "   "})).await;
    assert_eq!(empfangen(&mut ws).await["event"], "username-error");
}

#[tokio::test]
async fn volle_instanz_lehnt_upgrade_ab() {
    let config = SignalingConfig {
        max_connections: 1,
        ..SignalingConfig::default()
    };
    let (addr, _shutdown) = server_starten(config).await;
    let _erste = verbinden(addr).await;

    let ergebnis = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await;
    assert!(ergebnis.is_err());
}

#[tokio::test]
async fn shutdown_schliesst_verbindung() {
    let (addr, shutdown_tx) = server_starten(SignalingConfig::default()).await;
    let mut ws = verbinden(addr).await;

    shutdown_tx.send(true).unwrap();

    let ende = tokio::time::timeout(WARTEZEIT, async {
        while let Some(Ok(nachricht)) = ws.next().await {
            if nachricht.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(ende.is_ok());
}
