//! Gemeinsame Identifikationstypen fuer Voxlink
//!
//! Verbindungs-IDs und Benutzernamen verwenden das Newtype-Pattern, damit
//! sie zur Compilezeit nicht mit beliebigen Strings verwechselt werden.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Standard-Maximallaenge eines Benutzernamens (in Zeichen)
pub const DEFAULT_MAX_USERNAME_LEN: usize = 32;

/// Eindeutige ID einer Transport-Verbindung
///
/// Wird beim Annehmen der Verbindung vergeben und lebt genau so lange
/// wie die Verbindung selbst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Selbst gewaehlter Benutzername
///
/// Deserialisierung ist transparent und prueft nichts; Namen, die
/// registriert werden sollen, laufen ueber [`Username::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Validiert und normalisiert einen Benutzernamen
    ///
    /// Fuehrende und abschliessende Leerzeichen werden entfernt. Der Rest
    /// darf nicht leer sein, hoechstens `max_len` Zeichen haben und keine
    /// Steuerzeichen enthalten.
    pub fn parse(roh: &str, max_len: usize) -> Result<Self, CoreError> {
        let name = roh.trim();

        if name.is_empty() {
            return Err(CoreError::UngueltigerBenutzername(
                "Benutzername darf nicht leer sein".into(),
            ));
        }

        let laenge = name.chars().count();
        if laenge > max_len {
            return Err(CoreError::UngueltigerBenutzername(format!(
                "Benutzername zu lang: {laenge} Zeichen (Maximum: {max_len})"
            )));
        }

        if name.chars().any(char::is_control) {
            return Err(CoreError::UngueltigerBenutzername(
                "Benutzername enthaelt Steuerzeichen".into(),
            ));
        }

        Ok(Self(name.to_string()))
    }

    /// Gibt den Namen als `&str` zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
