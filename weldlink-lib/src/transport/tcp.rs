//! TCP link to the serial-to-Ethernet tunnel device.
//!
//! The tunnel forwards raw bytes to the controller's serial line, so
//! frames on this transport are identical to the direct-serial ones.
//! Connecting has noticeable latency, which is why the session keeps one
//! of these open across calls instead of reconnecting per operation.
//!
//! The tunnel also speaks a small AT-command sub-protocol (entered with a
//! guarded `+++` escape) used only while probing device capabilities,
//! never during telemetry or configuration reads.

use super::Transport;
use crate::constants::{AT_GUARD_TIME, AT_SILENCE_WINDOW, CONNECT_TIMEOUT};
use crate::endpoint::TransportEndpoint;
use crate::error::WeldError;
use crate::framer::read_response;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

pub struct TcpTunnelTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTunnelTransport {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            stream: None,
        }
    }

    /// Enter the tunnel's AT command mode: quiet period, literal `+++`,
    /// quiet period, then the tunnel answers on its own behalf.
    async fn enter_command_mode(&mut self) -> Result<(), WeldError> {
        sleep(AT_GUARD_TIME).await;
        self.send(b"+++").await?;
        sleep(AT_GUARD_TIME).await;
        let reply = read_response(self, AT_SILENCE_WINDOW).await?;
        let text = String::from_utf8_lossy(&reply.bytes);
        if text.contains("OK") {
            debug!("tunnel entered AT command mode");
            Ok(())
        } else {
            Err(WeldError::Protocol(format!(
                "tunnel did not acknowledge command mode: {text:?}"
            )))
        }
    }

    /// Issue one AT query and return the tunnel's reply line.
    async fn at_query(&mut self, cmd: &str) -> Result<String, WeldError> {
        self.send(format!("{cmd}\r").as_bytes()).await?;
        let reply = read_response(self, AT_SILENCE_WINDOW).await?;
        Ok(String::from_utf8_lossy(&reply.bytes).trim().to_string())
    }

    /// Leave command mode and return the tunnel to pass-through.
    async fn exit_command_mode(&mut self) -> Result<(), WeldError> {
        self.send(b"ATO\r").await?;
        // Drain the "CONNECT"-style acknowledgement so it cannot be
        // mistaken for controller output later.
        let _ = read_response(self, AT_SILENCE_WINDOW).await?;
        debug!("tunnel left AT command mode");
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTunnelTransport {
    async fn connect(&mut self) -> Result<(), WeldError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = format!("{}:{}", self.host, self.port);
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await??;
        stream.set_nodelay(true)?;
        info!("connected to tunnel at {addr}");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), WeldError> {
        let stream = self.stream.as_mut().ok_or(WeldError::NotConnected)?;
        stream.write_all(data).await?;
        Ok(())
    }

    async fn recv_chunk(&mut self, buf: &mut [u8]) -> Result<usize, WeldError> {
        let stream = self.stream.as_mut().ok_or(WeldError::NotConnected)?;
        let n = stream.read(buf).await?;
        if n == 0 {
            // Peer closed; surface as a lost link so the retry path kicks in.
            self.stream = None;
            return Err(WeldError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "tunnel closed the connection",
            )));
        }
        Ok(n)
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.ok();
            debug!("tunnel connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> TransportEndpoint {
        TransportEndpoint::network(self.host.clone(), self.port)
    }

    async fn probe_capabilities(&mut self) -> Result<Option<String>, WeldError> {
        self.enter_command_mode().await?;
        let banner = self.at_query("ATI").await?;
        self.exit_command_mode().await?;
        Ok(Some(banner))
    }
}
