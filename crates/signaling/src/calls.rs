//! Call-Tracker – Wer telefoniert mit wem
//!
//! Haelt fuer jeden Benutzer im Gespraech den Namen der Gegenstelle. Paare
//! werden immer in beide Richtungen gemeinsam eingefuegt und entfernt, ein
//! Benutzer kommt hoechstens einmal als Schluessel vor.
//!
//! Der Tracker selbst ist nicht synchronisiert. Atomaritaet von
//! `paaren_versuchen` ergibt sich daraus, dass er nur unter dem Mutex des
//! `SignalingState` benutzt wird.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use voxlink_core::Username;

use crate::error::{SignalingError, SignalingResult};

/// Eine Richtung eines Paares
#[derive(Debug, Clone)]
struct Paarung {
    peer: Username,
    begonnen: DateTime<Utc>,
}

/// Beendetes Gespraech, wie es `entpaaren` zurueckgibt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeendeterAnruf {
    pub peer: Username,
    pub begonnen: DateTime<Utc>,
}

impl BeendeterAnruf {
    /// Dauer des Gespraechs bis jetzt in Sekunden
    pub fn dauer_sek(&self) -> i64 {
        (Utc::now() - self.begonnen).num_seconds()
    }
}

/// Symmetrische Zuordnung Benutzer -> Gegenstelle
#[derive(Debug, Default)]
pub struct CallTracker {
    paare: HashMap<Username, Paarung>,
}

impl CallTracker {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Verbindet `a` und `b` zu einem Paar
    ///
    /// Lehnt ab, wenn einer der beiden bereits gepaart ist. Bei Erfolg
    /// werden beide Richtungen eingefuegt.
    pub fn paaren_versuchen(&mut self, a: &Username, b: &Username) -> SignalingResult<()> {
        if a == b {
            return Err(SignalingError::SelbstAnruf);
        }
        for name in [a, b] {
            if self.paare.contains_key(name) {
                return Err(SignalingError::BereitsImAnruf(name.clone()));
            }
        }

        let begonnen = Utc::now();
        self.paare.insert(
            a.clone(),
            Paarung {
                peer: b.clone(),
                begonnen,
            },
        );
        self.paare.insert(
            b.clone(),
            Paarung {
                peer: a.clone(),
                begonnen,
            },
        );
        Ok(())
    }

    /// Entfernt das Paar, zu dem `name` gehoert, in beide Richtungen
    ///
    /// Gibt die Gegenstelle zurueck. Idempotent: der zweite Aufruf liefert `None`.
    pub fn entpaaren(&mut self, name: &Username) -> Option<BeendeterAnruf> {
        let paarung = self.paare.remove(name)?;
        // Rueckrichtung nur entfernen, wenn sie wirklich auf `name` zeigt
        if self
            .paare
            .get(&paarung.peer)
            .is_some_and(|rueck| rueck.peer == *name)
        {
            self.paare.remove(&paarung.peer);
        }
        Some(BeendeterAnruf {
            peer: paarung.peer,
            begonnen: paarung.begonnen,
        })
    }

    /// Gegenstelle eines Benutzers, falls er im Gespraech ist
    pub fn peer_von(&self, name: &Username) -> Option<&Username> {
        self.paare.get(name).map(|p| &p.peer)
    }

    pub fn ist_im_anruf(&self, name: &Username) -> bool {
        self.paare.contains_key(name)
    }

    /// Anzahl laufender Gespraeche (Paare, nicht Teilnehmer)
    pub fn aktive_anrufe(&self) -> usize {
        self.paare.len() / 2
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use voxlink_core::DEFAULT_MAX_USERNAME_LEN;

    fn name(s: &str) -> Username {
        Username::parse(s, DEFAULT_MAX_USERNAME_LEN).unwrap()
    }

    #[test]
    fn paar_ist_symmetrisch() {
        let mut tracker = CallTracker::neu();
        tracker.paaren_versuchen(&name("alice"), &name("bob")).unwrap();

        assert_eq!(tracker.peer_von(&name("alice")), Some(&name("bob")));
        assert_eq!(tracker.peer_von(&name("bob")), Some(&name("alice")));
        assert_eq!(tracker.aktive_anrufe(), 1);
    }

    #[test]
    fn zweites_paar_mit_gleichem_anrufer_abgelehnt() {
        let mut tracker = CallTracker::neu();
        tracker.paaren_versuchen(&name("alice"), &name("bob")).unwrap();

        let fehler = tracker
            .paaren_versuchen(&name("alice"), &name("carol"))
            .unwrap_err();
        assert!(matches!(fehler, SignalingError::BereitsImAnruf(n) if n == name("alice")));
        assert!(!tracker.ist_im_anruf(&name("carol")));
        assert_eq!(tracker.aktive_anrufe(), 1);
    }

    #[test]
    fn besetzte_gegenstelle_abgelehnt() {
        let mut tracker = CallTracker::neu();
        tracker.paaren_versuchen(&name("alice"), &name("bob")).unwrap();

        let fehler = tracker
            .paaren_versuchen(&name("carol"), &name("bob"))
            .unwrap_err();
        assert!(matches!(fehler, SignalingError::BereitsImAnruf(n) if n == name("bob")));
        assert!(!tracker.ist_im_anruf(&name("carol")));
    }

    #[test]
    fn selbstanruf_abgelehnt() {
        let mut tracker = CallTracker::neu();
        assert!(matches!(
            tracker.paaren_versuchen(&name("alice"), &name("alice")),
            Err(SignalingError::SelbstAnruf)
        ));
        assert_eq!(tracker.aktive_anrufe(), 0);
    }

    #[test]
    fn entpaaren_entfernt_beide_richtungen() {
        let mut tracker = CallTracker::neu();
        tracker.paaren_versuchen(&name("alice"), &name("bob")).unwrap();

        let beendet = tracker.entpaaren(&name("bob")).expect("Paar erwartet");
        assert_eq!(beendet.peer, name("alice"));
        assert!(!tracker.ist_im_anruf(&name("alice")));
        assert!(!tracker.ist_im_anruf(&name("bob")));
        assert!(beendet.dauer_sek() >= 0);
    }

    #[test]
    fn entpaaren_ist_idempotent() {
        let mut tracker = CallTracker::neu();
        tracker.paaren_versuchen(&name("alice"), &name("bob")).unwrap();

        assert!(tracker.entpaaren(&name("alice")).is_some());
        assert!(tracker.entpaaren(&name("alice")).is_none());
        assert!(tracker.entpaaren(&name("bob")).is_none());
    }

    #[test]
    fn nach_entpaaren_neues_paar_moeglich() {
        let mut tracker = CallTracker::neu();
        tracker.paaren_versuchen(&name("alice"), &name("bob")).unwrap();
        tracker.entpaaren(&name("alice"));

        tracker.paaren_versuchen(&name("alice"), &name("carol")).unwrap();
        assert_eq!(tracker.peer_von(&name("carol")), Some(&name("alice")));
        assert_eq!(tracker.aktive_anrufe(), 1);
    }
}
