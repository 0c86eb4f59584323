//! Direct serial link to the controller: 8 data bits, no parity, one
//! stop bit. Serial ports are cheap to reopen, so the session opens one
//! per operation and drops it afterwards.

use super::Transport;
use crate::constants::WRITE_TIMEOUT;
use crate::endpoint::TransportEndpoint;
use crate::error::WeldError;
use async_trait::async_trait;
use serialport::SerialPort as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            stream: None,
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<(), WeldError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = tokio_serial::new(&self.port_name, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open_native_async()?;

        // Stale bytes from a previous session would confuse the framer.
        stream.clear(serialport::ClearBuffer::All)?;

        debug!("opened {} at {} baud", self.port_name, self.baud_rate);
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), WeldError> {
        let stream = self.stream.as_mut().ok_or(WeldError::NotConnected)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn recv_chunk(&mut self, buf: &mut [u8]) -> Result<usize, WeldError> {
        let stream = self.stream.as_mut().ok_or(WeldError::NotConnected)?;
        Ok(stream.read(buf).await?)
    }

    async fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("closed {}", self.port_name);
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> TransportEndpoint {
        TransportEndpoint::serial(self.port_name.clone(), self.baud_rate)
    }
}

/// Enumerate serial ports present on the machine.
pub fn list_serial_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("failed to enumerate serial ports: {e}");
            Vec::new()
        }
    }
}
