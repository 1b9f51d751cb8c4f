//! Routes inbound packets to the handler registered for their kind.

use std::collections::HashMap;
use std::sync::Arc;

use vista_core::wire::PacketKind;
use vista_core::Packet;
use vista_services::PacketHandler;

/// Maps packet kinds to handlers. One dispatcher per connection.
pub struct PacketDispatcher {
    by_kind: HashMap<PacketKind, Arc<dyn PacketHandler>>,
    /// Every registered handler, in registration order.
    handlers: Vec<Arc<dyn PacketHandler>>,
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self {
            by_kind: HashMap::new(),
            handlers: Vec::new(),
        }
    }

    /// Register a handler for all the kinds it declares. A later handler
    /// for the same kind replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn PacketHandler>) {
        for kind in handler.kinds() {
            if let Some(previous) = self.by_kind.insert(*kind, handler.clone()) {
                tracing::warn!(
                    kind = kind.name(),
                    previous = previous.name(),
                    handler = handler.name(),
                    "packet kind re-registered"
                );
            }
        }
        self.handlers.push(handler);
    }

    /// Dispatch one packet. Returns false if nobody handles its kind.
    pub fn dispatch(&self, packet: Packet) -> bool {
        let kind = packet.kind();
        let Some(handler) = self.by_kind.get(&kind) else {
            tracing::debug!(kind = kind.name(), "no handler for packet kind");
            return false;
        };

        let transfer = packet.transfer_id();
        if let Err(e) = handler.handle_packet(packet) {
            tracing::warn!(
                handler = handler.name(),
                kind = kind.name(),
                transfer = %transfer,
                error = %e,
                "packet handling failed"
            );
        }
        true
    }

    /// Notify every handler that the connection is gone.
    pub fn disconnect(&self) {
        for handler in &self.handlers {
            handler.on_disconnect();
        }
    }
}

impl Default for PacketDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
