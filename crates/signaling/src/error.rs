//! Fehlertypen fuer den Signaling-Service

use thiserror::Error;
use voxlink_core::{CoreError, Username};
use voxlink_protocol::{frame_zu_gross, FrameZuGross, ServerEvent};

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket-Fehler
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(#[from] axum::Error),

    /// Validierung oder Serialisierung fehlgeschlagen
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Benutzername ist an eine andere Verbindung gebunden
    #[error("Benutzername '{0}' ist bereits vergeben")]
    BenutzernameVergeben(Username),

    /// Verbindung hat bereits einen anderen Namen registriert
    #[error("Verbindung ist bereits als '{0}' registriert")]
    BereitsRegistriert(Username),

    /// Anrufer oder Gegenstelle ist bereits im Gespraech
    #[error("'{0}' ist bereits in einem Gespraech")]
    BereitsImAnruf(Username),

    /// Aktion erfordert einen registrierten Benutzernamen
    #[error("Bitte zuerst einen Benutzernamen registrieren")]
    NichtRegistriert,

    /// Anruf an sich selbst
    #[error("Anruf an sich selbst ist nicht moeglich")]
    SelbstAnruf,

    /// Ziel-Benutzer ist nicht (mehr) registriert
    #[error("Unbekannter Benutzer: {0}")]
    UnbekannterPeer(Username),

    /// Event waere groesser als ein Frame erlaubt
    #[error("Nachricht zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    NachrichtZuGross { groesse: usize, maximum: usize },

    /// Senden an Client fehlgeschlagen (Queue voll oder geschlossen)
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Client hat innerhalb der Frist nicht gelesen
    #[error("Timeout")]
    Timeout,
}

impl From<FrameZuGross> for SignalingError {
    fn from(fehler: FrameZuGross) -> Self {
        Self::NachrichtZuGross {
            groesse: fehler.groesse,
            maximum: fehler.maximum,
        }
    }
}

impl SignalingError {
    /// Das Event, das der ausloesende Client als Antwort erhaelt
    ///
    /// `None` bedeutet: die Anfrage wird still verworfen.
    pub fn antwort_an_aufrufer(&self) -> Option<ServerEvent> {
        match self {
            Self::BenutzernameVergeben(_) | Self::BereitsRegistriert(_) => {
                Some(ServerEvent::UsernameError(self.to_string()))
            }
            Self::Core(CoreError::UngueltigerBenutzername(grund)) => {
                Some(ServerEvent::UsernameError(grund.clone()))
            }
            Self::BereitsImAnruf(_) | Self::NichtRegistriert | Self::SelbstAnruf => {
                Some(ServerEvent::CallError(self.to_string()))
            }
            _ => None,
        }
    }

    /// Kurzer Grund fuer Metrik-Labels
    pub fn grund(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::WebSocket(_) => "transport",
            Self::Core(_) => "invalid",
            Self::BenutzernameVergeben(_) => "duplicate_username",
            Self::BereitsRegistriert(_) => "already_registered",
            Self::BereitsImAnruf(_) => "already_in_call",
            Self::NichtRegistriert => "not_registered",
            Self::SelbstAnruf => "self_call",
            Self::UnbekannterPeer(_) => "unknown_peer",
            Self::NachrichtZuGross { .. } => "too_large",
            Self::SendFehler => "send_failed",
            Self::Timeout => "timeout",
        }
    }

    /// Betrifft der Fehler nur die eine ausgehende Nachricht?
    ///
    /// Dann wird sie verworfen und die Verbindung bleibt offen.
    pub fn nur_nachricht_betroffen(&self) -> bool {
        matches!(self, Self::NachrichtZuGross { .. })
    }

    /// Uebersetzt einen Schreibfehler des Frame-Codecs
    pub fn aus_schreibfehler(fehler: std::io::Error) -> Self {
        match frame_zu_gross(&fehler) {
            Some(zu_gross) => zu_gross.into(),
            None => Self::Io(fehler),
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use voxlink_core::DEFAULT_MAX_USERNAME_LEN;

    fn name(s: &str) -> Username {
        Username::parse(s, DEFAULT_MAX_USERNAME_LEN).unwrap()
    }

    #[test]
    fn vergebener_name_wird_username_error() {
        let antwort = SignalingError::BenutzernameVergeben(name("dave")).antwort_an_aufrufer();
        assert!(matches!(antwort, Some(ServerEvent::UsernameError(msg)) if msg.contains("dave")));
    }

    #[test]
    fn ungueltiger_name_wird_username_error() {
        let fehler: SignalingError = CoreError::UngueltigerBenutzername("leer".into()).into();
        assert_eq!(
            fehler.antwort_an_aufrufer(),
            Some(ServerEvent::UsernameError("leer".into()))
        );
    }

    #[test]
    fn besetzt_wird_call_error() {
        let antwort = SignalingError::BereitsImAnruf(name("bob")).antwort_an_aufrufer();
        assert!(matches!(antwort, Some(ServerEvent::CallError(_))));
    }

    #[test]
    fn zu_grosser_frame_betrifft_nur_die_nachricht() {
        let io_fehler: std::io::Error = FrameZuGross {
            groesse: 70_000,
            maximum: 65_536,
        }
        .into();
        let fehler = SignalingError::aus_schreibfehler(io_fehler);
        assert!(fehler.nur_nachricht_betroffen());
        assert_eq!(fehler.grund(), "too_large");
        assert!(fehler.antwort_an_aufrufer().is_none());

        let getrennt = SignalingError::aus_schreibfehler(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "weg",
        ));
        assert!(matches!(getrennt, SignalingError::Io(_)));
        assert!(!getrennt.nur_nachricht_betroffen());
    }

    #[test]
    fn unbekannter_peer_wird_verschluckt() {
        assert!(SignalingError::UnbekannterPeer(name("x"))
            .antwort_an_aufrufer()
            .is_none());
    }
}
