//! voxlink-signaling – Signaling und Anrufkoordination
//!
//! Dieser Crate vermittelt WebRTC-Verhandlungen zwischen Clients. Er
//! verwaltet Verbindungen (WebSocket und TCP), bindet Benutzernamen an
//! Verbindungen, fuehrt Buch darueber, wer mit wem telefoniert, und leitet
//! Offer, Answer und ICE-Kandidaten unveraendert weiter. Medien laufen nie
//! ueber den Server.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket (ws_router)      TCP Listener (SignalingServer)
//!        \                        /
//!         v                      v
//!     ClientConnection (pro Verbindung ein Task)
//!         |  Postfach (mpsc) <- EventBroadcaster
//!         v
//!     MessageDispatcher
//!         |
//!         v
//!     SessionManager
//!         +-- ConnectionRegistry  (Benutzername <-> Verbindung)
//!         +-- CallTracker         (Benutzer <-> Gegenstelle)
//!         +-- SignalingRelay      (Offer, Answer, ICE)
//! ```

pub mod broadcast;
pub mod calls;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod relay;
pub mod server_state;
pub mod tcp;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::EventBroadcaster;
pub use calls::CallTracker;
pub use connection::ClientConnection;
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use lifecycle::SessionManager;
pub use registry::ConnectionRegistry;
pub use relay::{Signal, SignalingRelay};
pub use server_state::{SignalingConfig, SignalingState, VerbindungsPlatz};
pub use tcp::SignalingServer;
pub use ws::{ws_router, ws_server_starten, WsOptionen};
