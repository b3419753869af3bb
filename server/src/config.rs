//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use voxlink_core::{CoreError, DEFAULT_MAX_USERNAME_LEN};
use voxlink_observability::logging::{log_format_gueltig, log_level_gueltig};
use voxlink_signaling::{SignalingConfig, WsOptionen};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Signaling-Einstellungen (Keepalive, Queues, Benutzernamen)
    pub signaling: SignalingEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen (WebSocket + TCP)
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Voxlink Server".into(),
            max_verbindungen: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer WebSocket-Clients
    pub ws_port: u16,
    /// Pfad des WebSocket-Endpunkts
    pub ws_pfad: String,
    /// Aktiviert den TCP-Listener (Laengenpraefix-Frames)
    pub tcp_aktiviert: bool,
    /// Port fuer den TCP-Listener
    pub tcp_port: u16,
    /// Maximale Groesse eines Frames / einer WebSocket-Nachricht in Bytes
    pub max_frame_groesse: usize,
    /// CORS-Origins fuer den WebSocket-Endpunkt (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            ws_port: 8080,
            ws_pfad: "/ws".into(),
            tcp_aktiviert: true,
            tcp_port: 9987,
            max_frame_groesse: 64 * 1024,
            cors_origins: vec![],
        }
    }
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Verbindungen ohne Lebenszeichen werden nach dieser Zeit getrennt
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Laenge eines Benutzernamens in Zeichen
    pub max_username_laenge: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: 64,
            max_username_laenge: DEFAULT_MAX_USERNAME_LEN,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };

        config
            .validieren()
            .map_err(|e| anyhow::anyhow!("Ungueltige Konfiguration in '{pfad}': {e}"))?;
        Ok(config)
    }

    /// Prueft Werte, die serde nicht pruefen kann
    pub fn validieren(&self) -> Result<(), CoreError> {
        if self.server.max_verbindungen == 0 {
            return Err(CoreError::konfiguration("server.max_verbindungen muss > 0 sein"));
        }
        if !self.netzwerk.ws_pfad.starts_with('/') {
            return Err(CoreError::konfiguration(
                "netzwerk.ws_pfad muss mit '/' beginnen",
            ));
        }
        if self.netzwerk.max_frame_groesse < 1024 {
            return Err(CoreError::konfiguration(
                "netzwerk.max_frame_groesse muss mindestens 1024 Bytes sein",
            ));
        }
        if self.signaling.keepalive_sek == 0 {
            return Err(CoreError::konfiguration("signaling.keepalive_sek muss > 0 sein"));
        }
        if self.signaling.verbindungs_timeout_sek <= self.signaling.keepalive_sek {
            return Err(CoreError::konfiguration(
                "signaling.verbindungs_timeout_sek muss groesser als keepalive_sek sein",
            ));
        }
        if self.signaling.send_queue_groesse == 0 {
            return Err(CoreError::konfiguration(
                "signaling.send_queue_groesse muss > 0 sein",
            ));
        }
        if self.signaling.max_username_laenge == 0 {
            return Err(CoreError::konfiguration(
                "signaling.max_username_laenge muss > 0 sein",
            ));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(CoreError::konfiguration(format!(
                "Unbekanntes Log-Level: {}",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(CoreError::konfiguration(format!(
                "Unbekanntes Log-Format: {}",
                self.logging.format
            )));
        }
        self.ws_bind_adresse()?;
        Ok(())
    }

    /// Konfiguration fuer den Signaling-Kern
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            max_connections: self.server.max_verbindungen,
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            send_queue_groesse: self.signaling.send_queue_groesse,
            max_username_len: self.signaling.max_username_laenge,
            max_frame_size: self.netzwerk.max_frame_groesse,
        }
    }

    pub fn ws_optionen(&self) -> WsOptionen {
        WsOptionen {
            pfad: self.netzwerk.ws_pfad.clone(),
            cors_origins: self.netzwerk.cors_origins.clone(),
        }
    }

    /// Gibt die Bind-Adresse fuer den WebSocket-Server zurueck
    pub fn ws_bind_adresse(&self) -> Result<SocketAddr, CoreError> {
        self.bind_adresse(self.netzwerk.ws_port)
    }

    /// Gibt die Bind-Adresse fuer den TCP-Listener zurueck
    pub fn tcp_bind_adresse(&self) -> Result<SocketAddr, CoreError> {
        self.bind_adresse(self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> Result<SocketAddr, CoreError> {
        self.bind_adresse(self.observability.port)
    }

    fn bind_adresse(&self, port: u16) -> Result<SocketAddr, CoreError> {
        format!("{}:{}", self.netzwerk.bind_adresse, port)
            .parse()
            .map_err(|e| {
                CoreError::konfiguration(format!(
                    "Ungueltige Bind-Adresse '{}': {e}",
                    self.netzwerk.bind_adresse
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.server.max_verbindungen, 1024);
        assert_eq!(cfg.netzwerk.tcp_port, 9987);
        assert_eq!(cfg.netzwerk.ws_pfad, "/ws");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse().unwrap().to_string(), "0.0.0.0:9987");
        assert_eq!(cfg.ws_bind_adresse().unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9300"
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Server"
            max_verbindungen = 100

            [netzwerk]
            tcp_port = 10000
            cors_origins = ["http://localhost:5173"]

            [signaling]
            keepalive_sek = 10
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Server");
        assert_eq!(cfg.server.max_verbindungen, 100);
        assert_eq!(cfg.netzwerk.tcp_port, 10000);
        assert_eq!(cfg.netzwerk.cors_origins, vec!["http://localhost:5173"]);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.ws_port, 8080);
        assert_eq!(cfg.signaling.verbindungs_timeout_sek, 90);

        let signaling = cfg.signaling_config();
        assert_eq!(signaling.keepalive_sek, 10);
        assert_eq!(signaling.max_connections, 100);
    }

    #[test]
    fn timeout_kleiner_als_keepalive_ist_ungueltig() {
        let mut cfg = ServerConfig::default();
        cfg.signaling.keepalive_sek = 60;
        cfg.signaling.verbindungs_timeout_sek = 30;
        assert!(matches!(cfg.validieren(), Err(CoreError::Konfiguration(_))));
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein-host".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn unbekanntes_log_level() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/voxlink.toml").unwrap();
        assert_eq!(cfg.netzwerk.ws_port, 8080);
    }
}
