//! Signaling-Relay – Offer, Answer und ICE-Kandidaten weiterleiten
//!
//! Zustandslos: loest den Zielnamen ueber die Registry auf und legt das
//! Event in das Postfach der Zielverbindung. Die Payloads werden nicht
//! geprueft, nur die Groesse des fertigen Envelopes: durch das `from`-Feld
//! kann ein Event, das gerade noch in einen Frame passte, beim Empfaenger
//! zu gross werden. Solche Events werden beim Absender abgewiesen.

use serde_json::Value;
use voxlink_core::Username;
use voxlink_protocol::events::{AnswerEvent, IceCandidateEvent, OfferEvent};
use voxlink_protocol::ServerEvent;

use crate::broadcast::EventBroadcaster;
use crate::error::{SignalingError, SignalingResult};
use crate::registry::ConnectionRegistry;

/// Eine weiterzuleitende Verhandlungsnachricht
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
}

impl Signal {
    /// Art des Signals (Event-Name auf dem Draht)
    pub fn art(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
        }
    }

    /// Baut das Event, das beim Empfaenger ankommt
    ///
    /// Ein Offer ohne Absender ist nicht zustellbar.
    fn zu_event(self, von: Option<&Username>) -> SignalingResult<ServerEvent> {
        Ok(match self {
            Self::Offer(offer) => ServerEvent::Offer(OfferEvent {
                from: von.cloned().ok_or(SignalingError::NichtRegistriert)?,
                offer,
            }),
            Self::Answer(answer) => ServerEvent::Answer(AnswerEvent {
                answer,
                from: von.cloned(),
            }),
            Self::IceCandidate(candidate) => ServerEvent::IceCandidate(IceCandidateEvent {
                candidate,
                from: von.cloned(),
            }),
        })
    }
}

/// Leitet Signale an registrierte Benutzer weiter
pub struct SignalingRelay<'a> {
    registry: &'a ConnectionRegistry,
    broadcaster: &'a EventBroadcaster,
    max_groesse: usize,
}

impl<'a> SignalingRelay<'a> {
    /// `max_groesse` ist die groesste zustellbare Nachricht in Bytes
    pub fn neu(
        registry: &'a ConnectionRegistry,
        broadcaster: &'a EventBroadcaster,
        max_groesse: usize,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            max_groesse,
        }
    }

    /// Stellt `signal` von `von` an `an` zu
    ///
    /// `UnbekannterPeer`, wenn `an` nicht registriert ist;
    /// `NachrichtZuGross`, wenn das Event nicht in einen Frame passt;
    /// `SendFehler`, wenn das Postfach voll oder geschlossen ist.
    pub fn weiterleiten(
        &self,
        signal: Signal,
        von: Option<&Username>,
        an: &Username,
    ) -> SignalingResult<()> {
        let ziel = self
            .registry
            .aufloesen(an)
            .ok_or_else(|| SignalingError::UnbekannterPeer(an.clone()))?;

        let event = signal.zu_event(von)?;
        let groesse = event.als_json()?.len();
        if groesse > self.max_groesse {
            return Err(SignalingError::NachrichtZuGross {
                groesse,
                maximum: self.max_groesse,
            });
        }

        if self.broadcaster.an_verbindung_senden(&ziel, event) {
            Ok(())
        } else {
            Err(SignalingError::SendFehler)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
