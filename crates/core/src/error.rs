//! Fehlertypen fuer Voxlink
//!
//! Gemeinsame Fehler, die von mehreren Crates erzeugt werden. Crates mit
//! eigenen Fehlern konvertieren diese via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Voxlink
pub type Result<T> = std::result::Result<T, CoreError>;

/// Gemeinsame Fehler im Voxlink-System
#[derive(Debug, Error)]
pub enum CoreError {
    /// Benutzername verletzt die Namensregeln
    #[error("Ungueltiger Benutzername: {0}")]
    UngueltigerBenutzername(String),

    /// Nachricht konnte nicht gelesen werden
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    /// Konfiguration ist widerspruechlich oder unvollstaendig
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl CoreError {
    /// Erstellt einen Konfigurationsfehler aus einer beliebigen Nachricht
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
