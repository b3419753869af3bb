//! Message-Dispatcher – Routet Client-Events an den Session-Lifecycle
//!
//! Der Dispatcher empfaengt `ClientEvent`s von einer ClientConnection und
//! ruft die passende Operation des `SessionManager` auf. Fehler werden hier
//! in Antworten an den Aufrufer uebersetzt:
//! - Registrierungsfehler -> `username-error`
//! - Abgelehnte Angebote -> `call-error`
//! - Unzustellbare Signale -> still verworfen (nur Metrik und Log)

use std::sync::Arc;
use tokio::sync::mpsc;
use voxlink_core::ConnectionId;
use voxlink_protocol::{ClientEvent, ServerEvent};

use crate::error::SignalingError;
use crate::lifecycle::SessionManager;
use crate::relay::Signal;
use crate::server_state::SignalingState;

/// Zentraler Message-Dispatcher
#[derive(Clone)]
pub struct MessageDispatcher {
    sitzungen: SessionManager,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self {
            sitzungen: SessionManager::neu(state),
        }
    }

    fn state(&self) -> &SignalingState {
        self.sitzungen.state()
    }

    /// Meldet eine neue Verbindung an und gibt ihr Postfach zurueck
    pub fn verbindung_geoeffnet(&self, verbindung: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        self.sitzungen.verbindung_oeffnen(verbindung)
    }

    /// Raeumt nach dem Ende einer Verbindung auf
    pub fn verbindung_beendet(&self, verbindung: ConnectionId) {
        self.sitzungen.verbindung_schliessen(verbindung);
    }

    /// Verarbeitet ein eingehendes Event
    ///
    /// Antworten landen im Postfach der Verbindung, nicht im Rueckgabewert.
    pub fn dispatch(&self, verbindung: ConnectionId, event: ClientEvent) {
        let art = event.name();

        let ergebnis = match event {
            ClientEvent::Register(roh) => self.sitzungen.registrieren(verbindung, &roh),

            ClientEvent::Offer(req) => self.sitzungen.anrufen(verbindung, &req.to, req.offer),

            ClientEvent::Answer(req) => {
                self.sitzungen
                    .signal_weiterleiten(verbindung, &req.to, Signal::Answer(req.answer))
            }

            ClientEvent::IceCandidate(req) => self.sitzungen.signal_weiterleiten(
                verbindung,
                &req.to,
                Signal::IceCandidate(req.candidate),
            ),

            ClientEvent::EndCall(req) => self.sitzungen.auflegen(verbindung, &req.to).map(|_| ()),

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ClientEvent::Ping(ping) => {
                self.state()
                    .broadcaster
                    .an_verbindung_senden(&verbindung, ServerEvent::pong(ping.timestamp_ms));
                Ok(())
            }

            ClientEvent::Pong(pong) => {
                let rtt_ms = jetzt_ms().saturating_sub(pong.timestamp_ms);
                tracing::trace!(connection = %verbindung, rtt_ms, "Pong empfangen");
                Ok(())
            }
        };

        if let Err(fehler) = ergebnis {
            self.fehler_behandeln(verbindung, art, fehler);
        }
    }

    fn fehler_behandeln(&self, verbindung: ConnectionId, art: &'static str, fehler: SignalingError) {
        let metriken = &self.state().metriken;
        match fehler.antwort_an_aufrufer() {
            Some(antwort) => {
                tracing::debug!(
                    connection = %verbindung,
                    event = art,
                    fehler = %fehler,
                    "Anfrage abgelehnt"
                );
                metriken
                    .ablehnungen_gesamt
                    .with_label_values(&[fehler.grund()])
                    .inc();
                self.state()
                    .broadcaster
                    .an_verbindung_senden(&verbindung, antwort);
            }
            None => {
                tracing::debug!(
                    connection = %verbindung,
                    event = art,
                    fehler = %fehler,
                    "Nachricht verworfen"
                );
                metriken
                    .verworfen_gesamt
                    .with_label_values(&[fehler.grund()])
                    .inc();
            }
        }
    }
}

/// Aktuelle Unix-Zeit in Millisekunden
pub(crate) fn jetzt_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::SignalingConfig;
    use serde_json::json;
    use voxlink_core::{Username, DEFAULT_MAX_USERNAME_LEN};
    use voxlink_observability::VoxlinkMetrics;
    use voxlink_protocol::events::{EndCallRequest, KeepalivePayload, OfferRequest};

    fn name(s: &str) -> Username {
        Username::parse(s, DEFAULT_MAX_USERNAME_LEN).unwrap()
    }

    fn dispatcher() -> MessageDispatcher {
        let metriken = VoxlinkMetrics::neu().unwrap();
        MessageDispatcher::neu(SignalingState::neu(SignalingConfig::default(), metriken))
    }

    fn letztes(rx: &mut mpsc::Receiver<ServerEvent>) -> Option<ServerEvent> {
        let mut letztes = None;
        while let Ok(ev) = rx.try_recv() {
            letztes = Some(ev);
        }
        letztes
    }

    #[test]
    fn ping_wird_beantwortet() {
        let d = dispatcher();
        let id = ConnectionId::new();
        let mut rx = d.verbindung_geoeffnet(id);

        d.dispatch(id, ClientEvent::Ping(KeepalivePayload { timestamp_ms: 42 }));
        assert_eq!(letztes(&mut rx), Some(ServerEvent::pong(42)));
    }

    #[test]
    fn doppelter_name_erzeugt_username_error() {
        let d = dispatcher();
        let erste = ConnectionId::new();
        let zweite = ConnectionId::new();
        let _rx1 = d.verbindung_geoeffnet(erste);
        let mut rx2 = d.verbindung_geoeffnet(zweite);

        d.dispatch(erste, ClientEvent::Register("dave".into()));
        d.dispatch(zweite, ClientEvent::Register("dave".into()));

        assert!(matches!(letztes(&mut rx2), Some(ServerEvent::UsernameError(_))));
        assert_eq!(
            d.state()
                .metriken
                .ablehnungen_gesamt
                .with_label_values(&["duplicate_username"])
                .get(),
            1
        );
    }

    #[test]
    fn offer_ohne_registrierung_erzeugt_call_error() {
        let d = dispatcher();
        let id = ConnectionId::new();
        let mut rx = d.verbindung_geoeffnet(id);

        d.dispatch(
            id,
            ClientEvent::Offer(OfferRequest {
                to: name("bob"),
                offer: json!({}),
            }),
        );
        assert!(matches!(letztes(&mut rx), Some(ServerEvent::CallError(_))));
    }

    #[test]
    fn offer_an_unbekannten_bleibt_still() {
        let d = dispatcher();
        let id = ConnectionId::new();
        let mut rx = d.verbindung_geoeffnet(id);
        d.dispatch(id, ClientEvent::Register("alice".into()));
        letztes(&mut rx);

        d.dispatch(
            id,
            ClientEvent::Offer(OfferRequest {
                to: name("ghost"),
                offer: json!({}),
            }),
        );
        assert_eq!(letztes(&mut rx), None);
        assert_eq!(
            d.state()
                .metriken
                .verworfen_gesamt
                .with_label_values(&["unknown_peer"])
                .get(),
            1
        );
    }

    #[test]
    fn end_call_ohne_anruf_bleibt_still() {
        let d = dispatcher();
        let id = ConnectionId::new();
        let mut rx = d.verbindung_geoeffnet(id);
        d.dispatch(id, ClientEvent::Register("alice".into()));
        letztes(&mut rx);

        d.dispatch(id, ClientEvent::EndCall(EndCallRequest { to: name("bob") }));
        assert_eq!(letztes(&mut rx), None);
    }

    #[test]
    fn verbindung_beendet_gibt_postfach_frei() {
        let d = dispatcher();
        let id = ConnectionId::new();
        let _rx = d.verbindung_geoeffnet(id);
        assert_eq!(d.state().broadcaster.anzahl(), 1);

        d.verbindung_beendet(id);
        assert_eq!(d.state().broadcaster.anzahl(), 0);
    }
}
