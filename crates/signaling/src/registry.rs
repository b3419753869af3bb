//! Connection-Registry – Benutzername <-> Verbindung
//!
//! Bidirektionale Zuordnung zwischen einem registrierten Benutzernamen und
//! der Verbindung, die ihn gerade haelt. Die Registry ist nicht thread-safe;
//! sie lebt im `Verzeichnis` hinter dem Mutex des `SignalingState`.
//!
//! Invarianten:
//! - hoechstens ein Eintrag pro Benutzername
//! - eine Verbindung haelt hoechstens einen Benutzernamen

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use voxlink_core::{ConnectionId, Username};

use crate::error::{SignalingError, SignalingResult};

/// Ein Registry-Eintrag
#[derive(Debug, Clone)]
pub struct RegistryEintrag {
    pub verbindung: ConnectionId,
    pub registriert_seit: DateTime<Utc>,
}

/// Ergebnis einer erfolgreichen Registrierung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registrierung {
    /// Name wurde neu gebunden
    Neu,
    /// Verbindung hatte genau diesen Namen bereits
    Unveraendert,
}

/// Bidirektionale Zuordnung Benutzername <-> Verbindung
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Sortiert, damit der Snapshot eine stabile Reihenfolge hat
    nach_name: BTreeMap<Username, RegistryEintrag>,
    nach_verbindung: HashMap<ConnectionId, Username>,
}

impl ConnectionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Bindet `name` an `verbindung`
    ///
    /// Schlaegt fehl, wenn der Name an eine andere Verbindung gebunden ist
    /// oder die Verbindung bereits einen anderen Namen haelt. Bei Fehlern
    /// bleibt die Registry unveraendert.
    pub fn registrieren(
        &mut self,
        verbindung: ConnectionId,
        name: Username,
    ) -> SignalingResult<Registrierung> {
        if let Some(bisher) = self.nach_verbindung.get(&verbindung) {
            if *bisher == name {
                return Ok(Registrierung::Unveraendert);
            }
            return Err(SignalingError::BereitsRegistriert(bisher.clone()));
        }

        if self.nach_name.contains_key(&name) {
            return Err(SignalingError::BenutzernameVergeben(name));
        }

        self.nach_verbindung.insert(verbindung, name.clone());
        self.nach_name.insert(
            name,
            RegistryEintrag {
                verbindung,
                registriert_seit: Utc::now(),
            },
        );
        Ok(Registrierung::Neu)
    }

    /// Loest die Bindung einer Verbindung, falls vorhanden
    ///
    /// Idempotent: gibt beim zweiten Aufruf `None` zurueck.
    pub fn entbinden(&mut self, verbindung: &ConnectionId) -> Option<(Username, RegistryEintrag)> {
        let name = self.nach_verbindung.remove(verbindung)?;
        let eintrag = self.nach_name.remove(&name)?;
        Some((name, eintrag))
    }

    /// Sucht die Verbindung zu einem Benutzernamen
    pub fn aufloesen(&self, name: &Username) -> Option<ConnectionId> {
        self.nach_name.get(name).map(|e| e.verbindung)
    }

    /// Gibt den Benutzernamen einer Verbindung zurueck
    pub fn name_von(&self, verbindung: &ConnectionId) -> Option<&Username> {
        self.nach_verbindung.get(verbindung)
    }

    /// Alle registrierten Benutzernamen in aufsteigender Reihenfolge
    pub fn snapshot(&self) -> Vec<Username> {
        self.nach_name.keys().cloned().collect()
    }

    pub fn anzahl(&self) -> usize {
        self.nach_name.len()
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
    fn registrieren_und_aufloesen() {
        let mut registry = ConnectionRegistry::neu();
        let conn = ConnectionId::new();

        assert_eq!(
            registry.registrieren(conn, name("alice")).unwrap(),
            Registrierung::Neu
        );
        assert_eq!(registry.aufloesen(&name("alice")), Some(conn));
        assert_eq!(registry.name_von(&conn), Some(&name("alice")));
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn doppelter_name_von_anderer_verbindung_abgelehnt() {
        let mut registry = ConnectionRegistry::neu();
        let erste = ConnectionId::new();
        let zweite = ConnectionId::new();

        registry.registrieren(erste, name("dave")).unwrap();
        let fehler = registry.registrieren(zweite, name("dave")).unwrap_err();
        assert!(matches!(fehler, SignalingError::BenutzernameVergeben(_)));

        // Keine Teilzustaende
        assert_eq!(registry.aufloesen(&name("dave")), Some(erste));
        assert!(registry.name_von(&zweite).is_none());
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn gleicher_name_gleiche_verbindung_ist_idempotent() {
        let mut registry = ConnectionRegistry::neu();
        let conn = ConnectionId::new();

        registry.registrieren(conn, name("alice")).unwrap();
        assert_eq!(
            registry.registrieren(conn, name("alice")).unwrap(),
            Registrierung::Unveraendert
        );
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn zweiter_name_fuer_gebundene_verbindung_abgelehnt() {
        let mut registry = ConnectionRegistry::neu();
        let conn = ConnectionId::new();

        registry.registrieren(conn, name("alice")).unwrap();
        let fehler = registry.registrieren(conn, name("alicia")).unwrap_err();
        assert!(matches!(fehler, SignalingError::BereitsRegistriert(n) if n == name("alice")));
        assert!(registry.aufloesen(&name("alicia")).is_none());
    }

    #[test]
    fn entbinden_ist_idempotent() {
        let mut registry = ConnectionRegistry::neu();
        let conn = ConnectionId::new();
        registry.registrieren(conn, name("bob")).unwrap();

        let (entfernt, _) = registry.entbinden(&conn).expect("Eintrag erwartet");
        assert_eq!(entfernt, name("bob"));
        assert!(registry.entbinden(&conn).is_none());
        assert!(registry.aufloesen(&name("bob")).is_none());
    }

    #[test]
    fn name_nach_entbinden_wieder_frei() {
        let mut registry = ConnectionRegistry::neu();
        let alt = ConnectionId::new();
        let neu = ConnectionId::new();

        registry.registrieren(alt, name("erin")).unwrap();
        registry.entbinden(&alt);
        registry.registrieren(neu, name("erin")).unwrap();
        assert_eq!(registry.aufloesen(&name("erin")), Some(neu));
    }

    #[test]
    fn snapshot_ist_sortiert() {
        let mut registry = ConnectionRegistry::neu();
        for n in ["carol", "alice", "bob"] {
            registry.registrieren(ConnectionId::new(), name(n)).unwrap();
        }
        assert_eq!(
            registry.snapshot(),
            vec![name("alice"), name("bob"), name("carol")]
        );
    }

    #[test]
    fn entbinden_ohne_namen_ist_noop() {
        let mut registry = ConnectionRegistry::neu();
        assert!(registry.entbinden(&ConnectionId::new()).is_none());
    }
}
