//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientConnection`.
//!
//! ## Frame-Format
//! Laengenpraefix (u32 Big-Endian) + JSON-Event, siehe `voxlink_protocol::wire`.
//! Keepalives werden als `ping`-Event gesendet, der Client antwortet mit `pong`.

use futures_util::{future, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use voxlink_protocol::{Frame, ServerCodec, ServerEvent};

use crate::connection::{Ausgang, ClientConnection, Eingang};
use crate::error::SignalingError;
use crate::server_state::SignalingState;

/// TCP-Signaling-Server
///
/// Bindet einen TCP-Socket und akzeptiert Verbindungen in einer Loop.
pub struct SignalingServer {
    state: Arc<SignalingState>,
    bind_addr: SocketAddr,
}

impl SignalingServer {
    /// Erstellt einen neuen SignalingServer
    pub fn neu(state: Arc<SignalingState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Bindet den Socket und akzeptiert Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(
        self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.bedienen(listener, shutdown_rx).await
    }

    /// Accept-Loop auf einem bereits gebundenen Listener
    pub async fn bedienen(
        self,
        listener: TcpListener,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;

        tracing::info!(
            adresse = %lokale_addr,
            "TCP Signaling-Server gestartet"
        );

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let Some(platz) = self.state.platz_reservieren() else {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.state.config.max_connections,
                                    "Server voll – Verbindung abgelehnt"
                                );
                                self.state
                                    .metriken
                                    .ablehnungen_gesamt
                                    .with_label_values(&["server_full"])
                                    .inc();
                                drop(stream);
                                continue;
                            };

                            tracing::debug!(
                                peer = %peer_addr,
                                belegt = self.state.belegte_plaetze(),
                                "Verbindung akzeptiert"
                            );

                            let state = Arc::clone(&self.state);
                            let shutdown_rx_clone = shutdown_rx.clone();
                            tokio::spawn(async move {
                                let _platz = platz;
                                tcp_verbindung_bedienen(state, stream, peer_addr, shutdown_rx_clone)
                                    .await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("TCP Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }
}

/// Verbindet einen TCP-Stream ueber den Frame-Codec mit einer `ClientConnection`
async fn tcp_verbindung_bedienen(
    state: Arc<SignalingState>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
    }

    let codec = ServerCodec::with_max_size(state.config.max_frame_size);
    let (sink, stream) = Framed::new(stream, codec).split();

    // Zu grosse Events sind ein eigener Fehler, damit die Schleife nur sie verwirft
    let ausgang = sink
        .sink_map_err(SignalingError::aus_schreibfehler)
        .with(|nachricht: Ausgang| {
            future::ready(Ok::<ServerEvent, SignalingError>(als_frame(nachricht)))
        });
    let eingang = stream.map(|frame| match frame {
        Ok(Frame::Nachricht(event)) => Ok(Eingang::Event(event)),
        Ok(Frame::Ungueltig(grund)) => Ok(Eingang::Ungueltig(grund)),
        Err(e) => Err(SignalingError::from(e)),
    });

    ClientConnection::neu(state, peer_addr.to_string())
        .verarbeiten(eingang, ausgang, shutdown_rx)
        .await;
}

fn als_frame(nachricht: Ausgang) -> ServerEvent {
    match nachricht {
        Ausgang::Event(event) => event,
        Ausgang::Keepalive { timestamp_ms } => ServerEvent::ping(timestamp_ms),
    }
}
