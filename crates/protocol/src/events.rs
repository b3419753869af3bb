//! Signaling-Events (Client <-> Server)
//!
//! Definiert alle Nachrichten, die ueber WebSocket oder TCP zwischen Client
//! und Server ausgetauscht werden.
//!
//! ## Design
//! - Envelope: `{"event": "<name>", "data": <payload>}`
//! - Events ohne Payload lassen `data` weg (z.B. `call-ended`)
//! - Session-Beschreibungen und ICE-Kandidaten sind opake JSON-Werte,
//!   der Server interpretiert sie nicht

use serde::{Deserialize, Serialize};
use serde_json::Value;
use voxlink_core::{CoreError, Username};

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Angebot an einen anderen Benutzer (Anruf starten)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub to: Username,
    pub offer: Value,
}

/// Antwort auf ein Angebot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub to: Username,
    pub answer: Value,
}

/// Ein einzelner ICE-Kandidat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub to: Username,
    pub candidate: Value,
}

/// Anruf beenden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndCallRequest {
    pub to: Username,
}

/// Keepalive-Zeitstempel (nur TCP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepalivePayload {
    pub timestamp_ms: u64,
}

/// Alle Events, die ein Client senden darf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Benutzernamen binden (roh, wird serverseitig validiert)
    Register(String),
    Offer(OfferRequest),
    Answer(AnswerRequest),
    IceCandidate(IceCandidateRequest),
    EndCall(EndCallRequest),
    Ping(KeepalivePayload),
    Pong(KeepalivePayload),
}

impl ClientEvent {
    /// Name des Events auf dem Draht (fuer Logs und Metriken)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::EndCall(_) => "end-call",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }

    /// Parst ein Event aus einem JSON-Text (WebSocket-Textframe)
    pub fn aus_json(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(|e| CoreError::UngueltigeNachricht(e.to_string()))
    }

    /// Parst ein Event aus JSON-Bytes (TCP-Frame)
    pub fn aus_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::UngueltigeNachricht(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Weitergeleitetes Angebot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferEvent {
    pub from: Username,
    pub offer: Value,
}

/// Weitergeleitete Antwort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub answer: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Username>,
}

/// Weitergeleiteter ICE-Kandidat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidateEvent {
    pub candidate: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Username>,
}

/// Alle Events, die der Server sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Vollstaendige Liste der registrierten Benutzer
    Users(Vec<Username>),
    /// Registrierung abgelehnt
    UsernameError(String),
    Offer(OfferEvent),
    /// Angebot abgelehnt (Gegenstelle oder Anrufer bereits im Gespraech)
    CallError(String),
    Answer(AnswerEvent),
    IceCandidate(IceCandidateEvent),
    /// Die Gegenstelle hat aufgelegt oder die Verbindung verloren
    CallEnded,
    Ping(KeepalivePayload),
    Pong(KeepalivePayload),
}

impl ServerEvent {
    /// Name des Events auf dem Draht
    pub fn name(&self) -> &'static str {
        match self {
            Self::Users(_) => "users",
            Self::UsernameError(_) => "username-error",
            Self::Offer(_) => "offer",
            Self::CallError(_) => "call-error",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::CallEnded => "call-ended",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }

    /// Erstellt einen Ping mit Zeitstempel
    pub fn ping(timestamp_ms: u64) -> Self {
        Self::Ping(KeepalivePayload { timestamp_ms })
    }

    /// Erstellt einen Pong mit Zeitstempel
    pub fn pong(timestamp_ms: u64) -> Self {
        Self::Pong(KeepalivePayload { timestamp_ms })
    }

    /// Serialisiert das Event als JSON-Text
    pub fn als_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::UngueltigeNachricht(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
