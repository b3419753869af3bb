//! Client-Connection – Verwaltet eine einzelne Verbindung
//!
//! Jede Verbindung (TCP oder WebSocket) bekommt eine `ClientConnection` in
//! einem eigenen tokio-Task. Die Schleife ist transportunabhaengig: der
//! Transport liefert einen Stream von `Eingang` und einen Sink fuer
//! `Ausgang`, die Uebersetzung auf Frames oder WebSocket-Nachrichten
//! passiert in `tcp` bzw. `ws`.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` ein Lebenszeichen
//! - Kommt innerhalb von `verbindungs_timeout_sek` nichts vom Client,
//!   wird die Verbindung getrennt
//! - Jeder Schreibvorgang ist auf `verbindungs_timeout_sek` begrenzt. Ein
//!   Client, der nicht mehr liest, blockiert die Schleife also nicht
//!   dauerhaft.
//!
//! ## Cleanup
//! Egal wie die Schleife endet (Client trennt, Fehler, Timeout, Shutdown),
//! danach wird `verbindung_beendet` genau einmal aufgerufen, noch bevor der
//! Transport geschlossen wird.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use voxlink_core::ConnectionId;
use voxlink_protocol::{ClientEvent, ServerEvent};

use crate::dispatcher::{jetzt_ms, MessageDispatcher};
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::SignalingState;

/// Was der Transport von der Gegenseite gelesen hat
#[derive(Debug)]
pub enum Eingang {
    /// Gueltiges Event
    Event(ClientEvent),
    /// Nachricht, die sich nicht dekodieren liess
    Ungueltig(String),
    /// Transport-Lebenszeichen ohne Inhalt (z.B. WebSocket-Pong)
    Lebenszeichen,
}

/// Was der Transport an die Gegenseite schreiben soll
#[derive(Debug)]
pub enum Ausgang {
    Event(ServerEvent),
    /// Keepalive, der Transport waehlt die Darstellung
    Keepalive { timestamp_ms: u64 },
}

/// Verarbeitet eine einzelne Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    id: ConnectionId,
    peer: String,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    ///
    /// `peer` dient nur dem Logging (Adresse des Clients).
    pub fn neu(state: Arc<SignalingState>, peer: impl Into<String>) -> Self {
        Self {
            state,
            id: ConnectionId::new(),
            peer: peer.into(),
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht.
    pub async fn verarbeiten<E, A>(
        self,
        mut eingang: E,
        mut ausgang: A,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) where
        E: Stream<Item = SignalingResult<Eingang>> + Unpin,
        A: Sink<Ausgang, Error = SignalingError> + Unpin,
    {
        let id = self.id;
        let peer = self.peer.as_str();
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        tracing::info!(connection = %id, peer, "Neue Verbindung");

        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));
        let mut postfach = dispatcher.verbindung_geoeffnet(id);

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        let mut keepalive =
            tokio::time::interval_at(Instant::now() + keepalive_intervall, keepalive_intervall);

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Client
                gelesen = eingang.next() => {
                    match gelesen {
                        Some(Ok(Eingang::Event(event))) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(connection = %id, event = event.name(), "Event empfangen");
                            dispatcher.dispatch(id, event);
                        }
                        Some(Ok(Eingang::Ungueltig(grund))) => {
                            letzter_empfang = Instant::now();
                            tracing::warn!(connection = %id, peer, grund = %grund, "Ungueltige Nachricht verworfen");
                            self.state
                                .metriken
                                .verworfen_gesamt
                                .with_label_values(&["invalid"])
                                .inc();
                        }
                        Some(Ok(Eingang::Lebenszeichen)) => {
                            letzter_empfang = Instant::now();
                        }
                        Some(Err(e)) => {
                            tracing::warn!(connection = %id, peer, fehler = %e, "Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(connection = %id, peer, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus dem Postfach
                Some(event) = postfach.recv() => {
                    let ergebnis = senden_mit_frist(&mut ausgang, Ausgang::Event(event), timeout_dauer).await;
                    if !self.sendeergebnis_pruefen(ergebnis) {
                        break;
                    }
                }

                // Keepalive und Timeout
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() > timeout_dauer {
                        tracing::warn!(connection = %id, peer, "Verbindungs-Timeout");
                        break;
                    }
                    let keepalive_nachricht = Ausgang::Keepalive { timestamp_ms: jetzt_ms() };
                    let ergebnis = senden_mit_frist(&mut ausgang, keepalive_nachricht, timeout_dauer).await;
                    if !self.sendeergebnis_pruefen(ergebnis) {
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection = %id, peer, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        dispatcher.verbindung_beendet(id);
        if tokio::time::timeout(timeout_dauer, ausgang.close()).await.is_err() {
            tracing::debug!(connection = %id, peer, "Transport liess sich nicht sauber schliessen");
        }

        tracing::info!(connection = %id, peer, "Verbindungs-Task beendet");
    }

    /// Wertet ein Sendeergebnis aus; `false` beendet die Schleife
    ///
    /// Ein einzelnes zu grosses Event wird verworfen, die Verbindung bleibt
    /// offen. Alles andere (Transportfehler, Schreib-Timeout) trennt.
    fn sendeergebnis_pruefen(&self, ergebnis: SignalingResult<()>) -> bool {
        let fehler = match ergebnis {
            Ok(()) => return true,
            Err(fehler) => fehler,
        };

        if fehler.nur_nachricht_betroffen() {
            tracing::warn!(connection = %self.id, peer = %self.peer, fehler = %fehler, "Ausgehendes Event verworfen");
            self.state
                .metriken
                .verworfen_gesamt
                .with_label_values(&[fehler.grund()])
                .inc();
            return true;
        }

        match fehler {
            SignalingError::Timeout => {
                tracing::warn!(connection = %self.id, peer = %self.peer, "Client liest nicht – Verbindung wird getrennt");
            }
            andere => {
                tracing::warn!(connection = %self.id, peer = %self.peer, fehler = %andere, "Senden fehlgeschlagen");
            }
        }
        false
    }
}

/// Schreibt `nachricht`, gibt aber nach `frist` mit `Timeout` auf
async fn senden_mit_frist<A>(
    ausgang: &mut A,
    nachricht: Ausgang,
    frist: Duration,
) -> SignalingResult<()>
where
    A: Sink<Ausgang, Error = SignalingError> + Unpin,
{
    match tokio::time::timeout(frist, ausgang.send(nachricht)).await {
        Ok(ergebnis) => ergebnis,
        Err(_) => Err(SignalingError::Timeout),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
