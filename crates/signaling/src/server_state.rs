//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Registry und Call-Tracker liegen zusammen im `Verzeichnis` hinter einem
//! einzigen Mutex. Jede Pruefen-und-Aendern-Operation (`registrieren`,
//! `paaren_versuchen`, Cleanup) laeuft vollstaendig unter diesem Lock.
//!
//! Das Verbindungslimit wird beim Accept ueber einen atomaren Zaehler
//! reserviert ([`SignalingState::platz_reservieren`]), nicht erst wenn der
//! Verbindungs-Task sein Postfach anlegt.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use voxlink_core::DEFAULT_MAX_USERNAME_LEN;
use voxlink_observability::{VoxlinkMetrics, ZustandsQuelle};
use voxlink_protocol::wire::DEFAULT_MAX_FRAME_SIZE;

use crate::broadcast::{EventBroadcaster, SEND_QUEUE_GROESSE};
use crate::calls::CallTracker;
use crate::registry::ConnectionRegistry;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Maximale Anzahl gleichzeitiger Verbindungen (alle Transporte)
    pub max_connections: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Laenge eines Benutzernamens in Zeichen
    pub max_username_len: usize,
    /// Maximale Groesse eines Frames / einer WebSocket-Nachricht in Bytes
    pub max_frame_size: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: SEND_QUEUE_GROESSE,
            max_username_len: DEFAULT_MAX_USERNAME_LEN,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Registry und Call-Tracker, gemeinsam gesperrt
#[derive(Debug, Default)]
pub struct Verzeichnis {
    pub registry: ConnectionRegistry,
    pub anrufe: CallTracker,
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Postfaecher aller offenen Verbindungen
    pub broadcaster: EventBroadcaster,
    /// Prometheus-Metriken
    pub metriken: VoxlinkMetrics,
    verzeichnis: Mutex<Verzeichnis>,
    herunterfahren: AtomicBool,
    belegte_plaetze: AtomicUsize,
}

/// Reservierter Verbindungsplatz, wird beim Drop freigegeben
///
/// Lebt so lange wie der Task, der die Verbindung bedient.
pub struct VerbindungsPlatz {
    state: Arc<SignalingState>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.belegte_plaetze.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig, metriken: VoxlinkMetrics) -> Arc<Self> {
        let broadcaster = EventBroadcaster::mit_queue_groesse(config.send_queue_groesse);
        Arc::new(Self {
            config: Arc::new(config),
            broadcaster,
            metriken,
            verzeichnis: Mutex::new(Verzeichnis::default()),
            herunterfahren: AtomicBool::new(false),
            belegte_plaetze: AtomicUsize::new(0),
        })
    }

    /// Sperrt Registry und Call-Tracker
    ///
    /// Der Guard darf nicht ueber einen `.await` gehalten werden.
    pub fn verzeichnis(&self) -> parking_lot::MutexGuard<'_, Verzeichnis> {
        self.verzeichnis.lock()
    }

    /// Markiert den Server als herunterfahrend (neue Verbindungen werden abgelehnt)
    pub fn herunterfahren_einleiten(&self) {
        self.herunterfahren.store(true, Ordering::SeqCst);
    }

    pub fn faehrt_herunter(&self) -> bool {
        self.herunterfahren.load(Ordering::SeqCst)
    }

    /// Reserviert einen Platz fuer eine neue Verbindung
    ///
    /// `None`, wenn der Server voll ist oder herunterfaehrt.
    pub fn platz_reservieren(self: &Arc<Self>) -> Option<VerbindungsPlatz> {
        if self.faehrt_herunter() {
            return None;
        }
        let max = self.config.max_connections;
        self.belegte_plaetze
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |belegt| {
                (belegt < max).then_some(belegt + 1)
            })
            .ok()?;
        Some(VerbindungsPlatz {
            state: Arc::clone(self),
        })
    }

    /// Anzahl der aktuell reservierten Verbindungsplaetze
    pub fn belegte_plaetze(&self) -> usize {
        self.belegte_plaetze.load(Ordering::SeqCst)
    }
}

impl ZustandsQuelle for SignalingState {
    fn verbindungen(&self) -> usize {
        self.broadcaster.anzahl()
    }

    fn registrierte_benutzer(&self) -> usize {
        self.verzeichnis().registry.anzahl()
    }

    fn aktive_anrufe(&self) -> usize {
        self.verzeichnis().anrufe.aktive_anrufe()
    }

    fn faehrt_herunter(&self) -> bool {
        SignalingState::faehrt_herunter(self)
    }
}
