//! voxlink-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Events, die zwischen Client und Server
//! ausgetauscht werden, sowie das Frame-Format der TCP-Verbindung.

pub mod events;
pub mod wire;

pub use events::{ClientEvent, ServerEvent};
pub use wire::{frame_zu_gross, ClientCodec, Frame, FrameCodec, FrameZuGross, ServerCodec};
