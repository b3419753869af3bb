//! Event-Broadcaster – Postfaecher aller offenen Verbindungen
//!
//! Jede Verbindung hat eine begrenzte FIFO-Queue (`mpsc`). Der Verbindungs-
//! Task liest daraus und schreibt auf den Transport. Zustellung ist
//! fire-and-forget: volle oder geschlossene Queues verwerfen die Nachricht.
//!
//! ## Senden
//! - An eine Verbindung: `an_verbindung_senden`
//! - An alle Verbindungen: `an_alle_senden`

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use voxlink_core::ConnectionId;
use voxlink_protocol::ServerEvent;

/// Standard-Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub verbindung: ConnectionId,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ServerEvent) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(
                    connection = %self.verbindung,
                    event = n.name(),
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(connection = %self.verbindung, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Broadcaster fuer alle offenen Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    clients: DashMap<ConnectionId, ClientSender>,
    queue_groesse: usize,
}

impl EventBroadcaster {
    /// Erstellt einen Broadcaster mit der Standard-Queue-Groesse
    pub fn neu() -> Self {
        Self::mit_queue_groesse(SEND_QUEUE_GROESSE)
    }

    /// Erstellt einen Broadcaster mit eigener Queue-Groesse pro Verbindung
    pub fn mit_queue_groesse(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Legt das Postfach einer neuen Verbindung an und gibt die Empfangsseite zurueck
    pub fn verbindung_registrieren(&self, verbindung: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner
            .clients
            .insert(verbindung, ClientSender { verbindung, tx });
        tracing::debug!(connection = %verbindung, "Verbindung im Broadcaster registriert");
        rx
    }

    /// Entfernt das Postfach einer Verbindung
    pub fn verbindung_entfernen(&self, verbindung: &ConnectionId) {
        if self.inner.clients.remove(verbindung).is_some() {
            tracing::debug!(connection = %verbindung, "Verbindung aus Broadcaster entfernt");
        }
    }

    /// Sendet eine Nachricht an eine einzelne Verbindung
    ///
    /// Gibt `true` zurueck wenn die Nachricht eingereiht wurde.
    pub fn an_verbindung_senden(&self, verbindung: &ConnectionId, nachricht: ServerEvent) -> bool {
        match self.inner.clients.get(verbindung) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(connection = %verbindung, "Senden an unbekannte Verbindung");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle offenen Verbindungen
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, nachricht: ServerEvent) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Anzahl offener Verbindungen
    pub fn anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, verbindung: &ConnectionId) -> bool {
        self.inner.clients.contains_key(verbindung)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbindung_registrieren_und_senden() {
        let broadcaster = EventBroadcaster::neu();
        let id = ConnectionId::new();

        let mut rx = broadcaster.verbindung_registrieren(id);
        assert!(broadcaster.ist_registriert(&id));
        assert!(broadcaster.an_verbindung_senden(&id, ServerEvent::CallEnded));

        let empfangen = rx.try_recv().expect("Nachricht muss vorhanden sein");
        assert_eq!(empfangen, ServerEvent::CallEnded);
    }

    #[test]
    fn reihenfolge_bleibt_erhalten() {
        let broadcaster = EventBroadcaster::neu();
        let id = ConnectionId::new();
        let mut rx = broadcaster.verbindung_registrieren(id);

        for ts in 0..5 {
            broadcaster.an_verbindung_senden(&id, ServerEvent::ping(ts));
        }
        for ts in 0..5 {
            assert_eq!(rx.try_recv().unwrap(), ServerEvent::ping(ts));
        }
    }

    #[test]
    fn an_alle_senden() {
        let broadcaster = EventBroadcaster::neu();
        let mut receivers: Vec<_> = (0..5)
            .map(|_| broadcaster.verbindung_registrieren(ConnectionId::new()))
            .collect();

        assert_eq!(broadcaster.an_alle_senden(ServerEvent::Users(vec![])), 5);
        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[test]
    fn volle_queue_verwirft() {
        let broadcaster = EventBroadcaster::mit_queue_groesse(1);
        let id = ConnectionId::new();
        let _rx = broadcaster.verbindung_registrieren(id);

        assert!(broadcaster.an_verbindung_senden(&id, ServerEvent::CallEnded));
        assert!(!broadcaster.an_verbindung_senden(&id, ServerEvent::CallEnded));
    }

    #[test]
    fn senden_an_entfernte_verbindung_schlaegt_fehl() {
        let broadcaster = EventBroadcaster::neu();
        let id = ConnectionId::new();
        let _rx = broadcaster.verbindung_registrieren(id);

        broadcaster.verbindung_entfernen(&id);
        assert!(!broadcaster.ist_registriert(&id));
        assert!(!broadcaster.an_verbindung_senden(&id, ServerEvent::CallEnded));
        assert_eq!(broadcaster.anzahl(), 0);
    }
}
