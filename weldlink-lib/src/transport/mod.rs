//! Byte-level transports behind one capability trait.
//!
//! Two interchangeable links carry the same frames: a directly attached
//! serial port and a serial-to-Ethernet tunnel reached over TCP. The
//! session picks one based on which candidate won discovery.

mod serial;
mod tcp;

pub use serial::{SerialTransport, list_serial_ports};
pub use tcp::TcpTunnelTransport;

use crate::endpoint::{TransportEndpoint, TransportKind};
use crate::error::WeldError;
use async_trait::async_trait;

/// Capability shared by both links.
#[async_trait]
pub trait Transport: Send {
    /// Open the link. Idempotent on an already-open link.
    async fn connect(&mut self) -> Result<(), WeldError>;

    /// Write one complete frame.
    async fn send(&mut self, data: &[u8]) -> Result<(), WeldError>;

    /// Read whatever bytes are available into `buf`, blocking until at
    /// least one arrives. Deadlines are the caller's job (the framer
    /// races this against its silence window).
    async fn recv_chunk(&mut self, buf: &mut [u8]) -> Result<usize, WeldError>;

    /// Drop the link. Never fails; a close error is not actionable.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn endpoint(&self) -> TransportEndpoint;

    fn kind(&self) -> TransportKind {
        self.endpoint().kind()
    }

    /// Capability probe run once after a discovery win. Only the tunnel
    /// transport has anything to say (its AT-mode firmware banner).
    async fn probe_capabilities(&mut self) -> Result<Option<String>, WeldError> {
        Ok(None)
    }
}

/// Seam for producing transports from endpoints, so discovery and the
/// session can be driven by scripted links in tests.
pub trait TransportFactory: Send + Sync {
    fn open(&self, endpoint: &TransportEndpoint) -> Box<dyn Transport>;

    /// Names of the serial ports currently present on the machine.
    fn available_ports(&self) -> Vec<String>;
}

/// Production factory backed by real serial ports and TCP sockets.
pub struct SystemTransportFactory;

impl TransportFactory for SystemTransportFactory {
    fn open(&self, endpoint: &TransportEndpoint) -> Box<dyn Transport> {
        match endpoint {
            TransportEndpoint::Serial {
                port_name,
                baud_rate,
            } => Box::new(SerialTransport::new(port_name.clone(), *baud_rate)),
            TransportEndpoint::Network { host, port } => {
                Box::new(TcpTunnelTransport::new(host.clone(), *port))
            }
        }
    }

    fn available_ports(&self) -> Vec<String> {
        list_serial_ports()
    }
}
