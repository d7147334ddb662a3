//! Byte-level RPC seam the bus delivers over.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use pulsenet_core::CoreError;

/// One request/response round trip to a peer address. The node glue wires a
/// real socket here; tests and single-process deployments use the loopback.
pub trait Transport: Send + Sync {
    fn send(&self, address: &str, data: &[u8]) -> Result<Vec<u8>, CoreError>;
}

pub type InboundHandler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, CoreError> + Send + Sync>;

/// In-process transport: requests are dispatched straight into the inbound
/// handler registered for the address.
#[derive(Default)]
pub struct LoopbackTransport {
    inbound: RwLock<HashMap<String, InboundHandler>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the delivery callback for `address`. A later registration
    /// for the same address replaces the earlier one.
    pub fn register(&self, address: &str, handler: InboundHandler) {
        self.inbound.write().insert(address.to_string(), handler);
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, address: &str, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        let handler = self
            .inbound
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| CoreError::Network(format!("{address} unreachable")))?;
        handler(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_routes_by_address() {
        let transport = LoopbackTransport::new();
        transport.register("a:1", Arc::new(|data| Ok(data.to_vec())));

        assert_eq!(transport.send("a:1", b"ping").unwrap(), b"ping");
        assert!(matches!(
            transport.send("b:2", b"ping"),
            Err(CoreError::Network(_))
        ));
    }
}
