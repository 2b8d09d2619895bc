//! Communication channels: the two chat networks' inbound messages and outbound transports.
//!
//! Network clients are black boxes behind [`RoomTransport`]; inbound events are turned into
//! [`InboundMessage`] and handed to the bridge.

mod console;
mod inbound;
mod sidecar;
mod transport;

#[cfg(feature = "discord")]
mod discord;
#[cfg(test)]
pub(crate) mod testing;

pub use console::ConsoleTransport;
pub use inbound::{InboundMessage, MessageId, Network};
pub use sidecar::SidecarTransport;
pub use transport::{RoomTransport, TransportError, TransportRegistry};

#[cfg(feature = "discord")]
pub use discord::{start_discord, DiscordTransport};
