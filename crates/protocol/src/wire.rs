//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Envelope.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//!
//! Ein Frame mit kaputtem Laengenfeld oder Uebergroesse ist ein IO-Fehler und
//! beendet die Verbindung. Ein sauber gerahmter Frame mit ungueltigem JSON
//! wird als [`Frame::Ungueltig`] geliefert, der Stream bleibt benutzbar.

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::io;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

use crate::events::{ClientEvent, ServerEvent};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (64 KiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Nachricht ueberschreitet die maximale Frame-Groesse
///
/// Steckt als Quelle in einem `io::Error` der Art `InvalidData`, damit
/// Aufrufer ein zu grosses Event von einem Socket-Fehler unterscheiden
/// koennen (siehe [`frame_zu_gross`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameZuGross {
    pub groesse: usize,
    pub maximum: usize,
}

impl fmt::Display for FrameZuGross {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
            self.groesse, self.maximum
        )
    }
}

impl std::error::Error for FrameZuGross {}

impl From<FrameZuGross> for io::Error {
    fn from(fehler: FrameZuGross) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, fehler)
    }
}

/// Liefert die Groessenangaben, falls `fehler` von einem zu grossen Frame stammt
pub fn frame_zu_gross(fehler: &io::Error) -> Option<FrameZuGross> {
    fehler
        .get_ref()
        .and_then(|quelle| quelle.downcast_ref::<FrameZuGross>())
        .copied()
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Ergebnis eines vollstaendig gelesenen Frames
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    /// Gueltige Nachricht
    Nachricht(T),
    /// Frame war korrekt gerahmt, der Inhalt aber kein gueltiges Event
    Ungueltig(String),
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// `In` ist der Typ, der gelesen wird, `Out` der Typ, der geschrieben wird.
/// Der Server nutzt [`ServerCodec`], Clients (und Tests) [`ClientCodec`].
#[derive(Debug)]
pub struct FrameCodec<In, Out> {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
    _typen: PhantomData<fn(Out) -> In>,
}

/// Codec der Serverseite: liest Client-Events, schreibt Server-Events
pub type ServerCodec = FrameCodec<ClientEvent, ServerEvent>;

/// Codec der Clientseite: liest Server-Events, schreibt Client-Events
pub type ClientCodec = FrameCodec<ServerEvent, ClientEvent>;

impl<In, Out> FrameCodec<In, Out> {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _typen: PhantomData,
        }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<In, Out> Default for FrameCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> Clone for FrameCodec<In, Out> {
    fn clone(&self) -> Self {
        Self::with_max_size(self.max_frame_size)
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl<In, Out> Decoder for FrameCodec<In, Out>
where
    In: DeserializeOwned,
{
    type Item = Frame<In>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen (big-endian u32) ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_frame_size {
            return Err(FrameZuGross {
                groesse: length,
                maximum: self.max_frame_size,
            }
            .into());
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        match serde_json::from_slice::<In>(&payload) {
            Ok(nachricht) => Ok(Some(Frame::Nachricht(nachricht))),
            Err(e) => Ok(Some(Frame::Ungueltig(e.to_string()))),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<In, Out> Encoder<Out> for FrameCodec<In, Out>
where
    Out: Serialize,
{
    type Error = io::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        if json.len() > self.max_frame_size {
            return Err(FrameZuGross {
                groesse: json.len(),
                maximum: self.max_frame_size,
            }
            .into());
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
