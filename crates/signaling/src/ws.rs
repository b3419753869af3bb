//! WebSocket-Transport – Browser-Clients ueber axum
//!
//! Jede Text-Nachricht enthaelt genau ein JSON-Event im selben Envelope wie
//! auf TCP. Binaer-Nachrichten werden als ungueltig verworfen. Keepalives
//! laufen ueber WebSocket-Ping/Pong, die der Browser selbst beantwortet.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{future, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use voxlink_protocol::ClientEvent;

use crate::connection::{Ausgang, ClientConnection, Eingang};
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Standard-Pfad des WebSocket-Endpunkts
pub const DEFAULT_WS_PFAD: &str = "/ws";

/// Einstellungen fuer den WebSocket-Router
#[derive(Debug, Clone)]
pub struct WsOptionen {
    pub pfad: String,
    /// Erlaubte Origins; leer oder `*` erlaubt alle
    pub cors_origins: Vec<String>,
}

impl Default for WsOptionen {
    fn default() -> Self {
        Self {
            pfad: DEFAULT_WS_PFAD.to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Clone)]
struct WsState {
    state: Arc<SignalingState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Baut den Router mit dem WebSocket-Endpunkt
///
/// Muss mit `into_make_service_with_connect_info::<SocketAddr>()` bedient
/// werden.
pub fn ws_router(
    state: Arc<SignalingState>,
    optionen: &WsOptionen,
    shutdown_rx: watch::Receiver<bool>,
) -> Router {
    Router::new()
        .route(&optionen.pfad, get(ws_upgrade))
        .with_state(WsState { state, shutdown_rx })
        .layer(cors_layer(&optionen.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Startet den WebSocket-Server
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn ws_server_starten(
    bind_addr: SocketAddr,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(adresse = %bind_addr, "WebSocket Signaling-Server gestartet");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
    })
    .await?;

    tracing::info!("WebSocket Signaling-Server gestoppt");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any);
    }

    let erlaubt: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(wert) => Some(wert),
            Err(_) => {
                tracing::warn!(origin = %o, "Ungueltiger CORS-Origin ignoriert");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(erlaubt))
}

/// GET <pfad> – WebSocket-Upgrade
async fn ws_upgrade(
    State(ws_state): State<WsState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let state = ws_state.state;
    let Some(platz) = state.platz_reservieren() else {
        tracing::warn!(
            peer = %peer_addr,
            max = state.config.max_connections,
            "Server voll – WebSocket abgelehnt"
        );
        state
            .metriken
            .ablehnungen_gesamt
            .with_label_values(&["server_full"])
            .inc();
        return (StatusCode::SERVICE_UNAVAILABLE, "Server voll").into_response();
    };

    // Scheitert das Upgrade, wird die Closure samt Platz verworfen
    let max_groesse = state.config.max_frame_size;
    let shutdown_rx = ws_state.shutdown_rx;
    ws.max_message_size(max_groesse).on_upgrade(move |socket| async move {
        let _platz = platz;
        ws_verbindung_bedienen(state, socket, peer_addr, shutdown_rx).await;
    })
}

async fn ws_verbindung_bedienen(
    state: Arc<SignalingState>,
    socket: WebSocket,
    peer_addr: SocketAddr,
    shutdown_rx: watch::Receiver<bool>,
) {
    let (sink, stream) = socket.split();

    let ausgang = sink.with(|nachricht: Ausgang| future::ready(als_ws_nachricht(nachricht)));
    let eingang = stream.filter_map(|gelesen| future::ready(als_eingang(gelesen)));

    ClientConnection::neu(state, peer_addr.to_string())
        .verarbeiten(eingang, ausgang, shutdown_rx)
        .await;
}

fn als_ws_nachricht(nachricht: Ausgang) -> SignalingResult<Message> {
    match nachricht {
        Ausgang::Event(event) => Ok(Message::Text(event.als_json()?)),
        Ausgang::Keepalive { timestamp_ms } => {
            Ok(Message::Ping(timestamp_ms.to_be_bytes().to_vec()))
        }
    }
}

/// Uebersetzt eine WebSocket-Nachricht; `None` ueberspringt sie
///
/// Close beendet den Stream nicht selbst, axum liefert danach `None`.
fn als_eingang(gelesen: Result<Message, axum::Error>) -> Option<SignalingResult<Eingang>> {
    let nachricht = match gelesen {
        Ok(nachricht) => nachricht,
        Err(e) => return Some(Err(SignalingError::from(e))),
    };

    match nachricht {
        Message::Text(text) => Some(Ok(match ClientEvent::aus_json(&text) {
            Ok(event) => Eingang::Event(event),
            Err(e) => Eingang::Ungueltig(e.to_string()),
        })),
        Message::Binary(_) => Some(Ok(Eingang::Ungueltig(
            "Binaer-Nachrichten werden nicht unterstuetzt".into(),
        ))),
        Message::Ping(_) | Message::Pong(_) => Some(Ok(Eingang::Lebenszeichen)),
        Message::Close(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
