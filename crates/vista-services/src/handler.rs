//! Handler trait for packet-driven protocol roles.
//!
//! The daemon owns the connection and routes every inbound packet to the
//! handler registered for its kind. Handlers interpret packets; they never
//! touch the socket.

use anyhow::Result;
use vista_core::wire::PacketKind;
use vista_core::Packet;

/// A protocol role that consumes some kinds of inbound packets.
pub trait PacketHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Packet kinds this handler wants routed to it.
    fn kinds(&self) -> &'static [PacketKind];

    /// Handle one inbound packet. Called on the connection's read task in
    /// arrival order, so it must not block.
    fn handle_packet(&self, packet: Packet) -> Result<()>;

    /// Called once when the connection carrying this handler's traffic ends.
    fn on_disconnect(&self);
}
