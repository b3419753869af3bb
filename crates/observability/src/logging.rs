//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Konfigurationsdatei):
//! - `VX_LOG_LEVEL`: Log-Level bzw. EnvFilter-Direktive, Standard: info
//! - `VX_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Verbindungs-IDs und Benutzernamen werden als strukturierte Felder geloggt.

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer das Log-Level
pub const LOG_LEVEL_ENV: &str = "VX_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const LOG_FORMAT_ENV: &str = "VX_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `level` und `format` stammen aus der Konfiguration und werden von
/// `VX_LOG_LEVEL` / `VX_LOG_FORMAT` ueberschrieben.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match effektives_format(format).as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Gibt das Log-Format zurueck, das tatsaechlich verwendet wird
fn effektives_format(konfiguriert: &str) -> String {
    std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| konfiguriert.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
