//! Session-Lifecycle – Registrierung, Anrufaufbau und Aufraeumen
//!
//! Alle Operationen sind synchron: sie sperren das `Verzeichnis`, pruefen
//! und aendern Registry und Call-Tracker in einem Schritt und legen die
//! resultierenden Events in die Postfaecher der betroffenen Verbindungen.
//! Weil auch die `users`-Broadcasts unter dem Lock eingereiht werden, sehen
//! alle Clients die Snapshots in derselben Reihenfolge.
//!
//! ## Ablauf eines Anrufs
//! ```text
//! register(alice), register(bob)
//! alice: offer(to=bob)        -> bob: offer(from=alice)      [Paar alice<->bob]
//! bob:   answer(to=alice)     -> alice: answer
//! beide: ice-candidate(to=..) -> Gegenstelle
//! alice: end-call(to=bob)     -> bob: call-ended             [Paar entfernt]
//! ```

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use voxlink_core::{ConnectionId, Username};
use voxlink_protocol::ServerEvent;

use crate::error::{SignalingError, SignalingResult};
use crate::registry::{ConnectionRegistry, Registrierung};
use crate::relay::{Signal, SignalingRelay};
use crate::server_state::{SignalingState, Verzeichnis};

/// Verwaltet den Lebenszyklus aller Sitzungen
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<SignalingState>,
}

impl SessionManager {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<SignalingState> {
        &self.state
    }

    /// Legt das Postfach einer neuen Verbindung an
    ///
    /// Die Verbindung erhaelt sofort einen `users`-Snapshot, damit sie die
    /// aktuell erreichbaren Benutzer kennt, ohne selbst registriert zu sein.
    pub fn verbindung_oeffnen(&self, verbindung: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let v = self.state.verzeichnis();
        let rx = self.state.broadcaster.verbindung_registrieren(verbindung);
        self.state
            .broadcaster
            .an_verbindung_senden(&verbindung, ServerEvent::Users(v.registry.snapshot()));
        self.kennzahlen_aktualisieren(&v);
        rx
    }

    /// Bindet einen Benutzernamen an die Verbindung
    ///
    /// Bei Erfolg erhalten alle offenen Verbindungen den neuen Snapshot.
    /// Registriert die Verbindung denselben Namen erneut, bekommt nur sie
    /// selbst den Snapshot.
    pub fn registrieren(&self, verbindung: ConnectionId, roh: &str) -> SignalingResult<()> {
        let name = Username::parse(roh, self.state.config.max_username_len)?;

        let mut v = self.state.verzeichnis();
        match v.registry.registrieren(verbindung, name.clone())? {
            Registrierung::Neu => {
                tracing::info!(connection = %verbindung, user = %name, "Benutzer registriert");
                self.benutzerliste_verteilen(&v.registry);
            }
            Registrierung::Unveraendert => {
                tracing::debug!(connection = %verbindung, user = %name, "Erneute Registrierung ignoriert");
                self.state
                    .broadcaster
                    .an_verbindung_senden(&verbindung, ServerEvent::Users(v.registry.snapshot()));
            }
        }
        self.kennzahlen_aktualisieren(&v);
        Ok(())
    }

    /// Startet einen Anruf an `an` und leitet das Angebot weiter
    ///
    /// Das Paar wird nur gebildet, wenn beide Seiten frei sind. Kann das
    /// Angebot nicht zugestellt werden, wird die Paarung zurueckgenommen.
    pub fn anrufen(
        &self,
        verbindung: ConnectionId,
        an: &Username,
        offer: Value,
    ) -> SignalingResult<()> {
        let mut guard = self.state.verzeichnis();
        let Verzeichnis { registry, anrufe } = &mut *guard;

        let anrufer = registry
            .name_von(&verbindung)
            .cloned()
            .ok_or(SignalingError::NichtRegistriert)?;
        if anrufer == *an {
            return Err(SignalingError::SelbstAnruf);
        }
        if registry.aufloesen(an).is_none() {
            return Err(SignalingError::UnbekannterPeer(an.clone()));
        }

        anrufe.paaren_versuchen(&anrufer, an)?;

        let relay = SignalingRelay::neu(
            registry,
            &self.state.broadcaster,
            self.state.config.max_frame_size,
        );
        if let Err(fehler) = relay.weiterleiten(Signal::Offer(offer), Some(&anrufer), an) {
            anrufe.entpaaren(&anrufer);
            return Err(fehler);
        }

        tracing::info!(from = %anrufer, to = %an, "Anruf gestartet");
        self.state.metriken.anrufe_gesamt.inc();
        self.state
            .metriken
            .signale_gesamt
            .with_label_values(&["offer"])
            .inc();
        self.kennzahlen_aktualisieren(&guard);
        Ok(())
    }

    /// Leitet Answer oder ICE-Kandidat an `an` weiter
    ///
    /// Der Absender muss nicht registriert sein; ist er es, wird sein Name
    /// als `from` mitgeschickt.
    pub fn signal_weiterleiten(
        &self,
        verbindung: ConnectionId,
        an: &Username,
        signal: Signal,
    ) -> SignalingResult<()> {
        let v = self.state.verzeichnis();
        let von = v.registry.name_von(&verbindung);
        let art = signal.art();

        SignalingRelay::neu(
            &v.registry,
            &self.state.broadcaster,
            self.state.config.max_frame_size,
        )
        .weiterleiten(signal, von, an)?;

        tracing::trace!(connection = %verbindung, to = %an, art, "Signal weitergeleitet");
        self.state
            .metriken
            .signale_gesamt
            .with_label_values(&[art])
            .inc();
        Ok(())
    }

    /// Beendet den Anruf des Aufrufers
    ///
    /// Benachrichtigt wird die tatsaechliche Gegenstelle, auch wenn `an`
    /// einen anderen Namen nennt. Ohne laufenden Anruf ist das ein No-op.
    /// Gibt die benachrichtigte Gegenstelle zurueck.
    pub fn auflegen(
        &self,
        verbindung: ConnectionId,
        an: &Username,
    ) -> SignalingResult<Option<Username>> {
        let mut guard = self.state.verzeichnis();
        let Verzeichnis { registry, anrufe } = &mut *guard;

        let Some(name) = registry.name_von(&verbindung).cloned() else {
            tracing::debug!(connection = %verbindung, "end-call ohne Registrierung ignoriert");
            return Ok(None);
        };
        let Some(beendet) = anrufe.entpaaren(&name) else {
            tracing::debug!(user = %name, "end-call ohne laufenden Anruf ignoriert");
            return Ok(None);
        };

        if beendet.peer != *an {
            tracing::warn!(
                user = %name,
                angegeben = %an,
                peer = %beendet.peer,
                "end-call nennt nicht die Gegenstelle, tatsaechlicher Peer wird benachrichtigt"
            );
        }
        self.anruf_beendet_melden(registry, &beendet.peer);
        tracing::info!(
            user = %name,
            peer = %beendet.peer,
            dauer_sek = beendet.dauer_sek(),
            "Anruf beendet"
        );

        self.kennzahlen_aktualisieren(&guard);
        Ok(Some(beendet.peer))
    }

    /// Raeumt nach dem Ende einer Verbindung auf
    ///
    /// Entfernt das Postfach, gibt den Namen frei, beendet einen laufenden
    /// Anruf (die Gegenstelle erhaelt `call-ended`) und verteilt den neuen
    /// Snapshot. Idempotent.
    pub fn verbindung_schliessen(&self, verbindung: ConnectionId) {
        let mut guard = self.state.verzeichnis();
        self.state.broadcaster.verbindung_entfernen(&verbindung);

        let Verzeichnis { registry, anrufe } = &mut *guard;
        if let Some((name, eintrag)) = registry.entbinden(&verbindung) {
            if let Some(beendet) = anrufe.entpaaren(&name) {
                self.anruf_beendet_melden(registry, &beendet.peer);
                tracing::info!(
                    user = %name,
                    peer = %beendet.peer,
                    dauer_sek = beendet.dauer_sek(),
                    "Anruf durch Verbindungsende beendet"
                );
            }
            self.benutzerliste_verteilen(registry);

            let sitzung_sek = (chrono::Utc::now() - eintrag.registriert_seit).num_seconds();
            tracing::info!(connection = %verbindung, user = %name, sitzung_sek, "Benutzer abgemeldet");
        }

        self.kennzahlen_aktualisieren(&guard);
    }

    // -----------------------------------------------------------------------
    // Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn benutzerliste_verteilen(&self, registry: &ConnectionRegistry) {
        let snapshot = registry.snapshot();
        let anzahl = snapshot.len();
        let erreicht = self
            .state
            .broadcaster
            .an_alle_senden(ServerEvent::Users(snapshot));
        tracing::debug!(benutzer = anzahl, erreicht, "Benutzerliste verteilt");
    }

    fn anruf_beendet_melden(&self, registry: &ConnectionRegistry, peer: &Username) {
        match registry.aufloesen(peer) {
            Some(ziel) => {
                self.state
                    .broadcaster
                    .an_verbindung_senden(&ziel, ServerEvent::CallEnded);
            }
            None => tracing::debug!(peer = %peer, "Gegenstelle nicht mehr verbunden"),
        }
    }

    fn kennzahlen_aktualisieren(&self, v: &Verzeichnis) {
        let m = &self.state.metriken;
        m.verbindungen.set(self.state.broadcaster.anzahl() as i64);
        m.registrierte_benutzer.set(v.registry.anzahl() as i64);
        m.aktive_anrufe.set(v.anrufe.aktive_anrufe() as i64);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
