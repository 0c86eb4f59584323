//! Scripted transports and a scripted factory for behavior tests.
//! Test-only; nothing here touches real ports or sockets.

use crate::endpoint::TransportEndpoint;
use crate::error::WeldError;
use crate::transport::{Transport, TransportFactory};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted endpoint does when probed.
#[derive(Clone)]
pub enum MockBehavior {
    /// The open/connect itself fails (port busy, host unreachable).
    ConnectFail,
    /// Connects but never sends a byte back.
    Silent,
    /// Connects and answers every read with these chunks, in order.
    Reply(Vec<Vec<u8>>),
}

pub struct ScriptedTransport {
    endpoint: TransportEndpoint,
    chunks: VecDeque<Vec<u8>>,
    connect_ok: bool,
    connected: bool,
    connect_attempts: Arc<AtomicU32>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    /// An already-connected transport that replays `chunks`. Used by the
    /// framer tests, which never call `connect`.
    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            endpoint: TransportEndpoint::serial("MOCK", 19_200),
            chunks: chunks.into(),
            connect_ok: true,
            connected: true,
            connect_attempts: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_behavior(
        endpoint: TransportEndpoint,
        behavior: MockBehavior,
        connect_attempts: Arc<AtomicU32>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    ) -> Self {
        let (connect_ok, chunks) = match behavior {
            MockBehavior::ConnectFail => (false, Vec::new()),
            MockBehavior::Silent => (true, Vec::new()),
            MockBehavior::Reply(chunks) => (true, chunks),
        };
        Self {
            endpoint,
            chunks: chunks.into(),
            connect_ok,
            connected: false,
            connect_attempts,
            sent,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), WeldError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.connect_ok {
            self.connected = true;
            Ok(())
        } else {
            Err(WeldError::Protocol(format!(
                "scripted connect failure on {}",
                self.endpoint
            )))
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), WeldError> {
        if !self.connected {
            return Err(WeldError::NotConnected);
        }
        self.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn recv_chunk(&mut self, buf: &mut [u8]) -> Result<usize, WeldError> {
        if !self.connected {
            return Err(WeldError::NotConnected);
        }
        match self.chunks.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // Keep the tail for the next read.
                    self.chunks.push_front(chunk.split_off(n));
                }
                Ok(n)
            }
            // Out of script: hang until the caller's deadline fires.
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(0)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn endpoint(&self) -> TransportEndpoint {
        self.endpoint.clone()
    }
}

/// Factory producing scripted transports keyed by endpoint display name.
/// Endpoints without a scripted behavior fail to connect.
pub struct MockFactory {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    ports: Vec<String>,
    pub opened: Arc<Mutex<Vec<TransportEndpoint>>>,
    pub connect_attempts: Arc<AtomicU32>,
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockFactory {
    pub fn new(ports: Vec<&str>) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            ports: ports.into_iter().map(String::from).collect(),
            opened: Arc::new(Mutex::new(Vec::new())),
            connect_attempts: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn behave(self, endpoint: &TransportEndpoint, behavior: MockBehavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), behavior);
        self
    }

    pub fn opened_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl TransportFactory for MockFactory {
    fn open(&self, endpoint: &TransportEndpoint) -> Box<dyn Transport> {
        self.opened.lock().unwrap().push(endpoint.clone());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&endpoint.to_string())
            .cloned()
            .unwrap_or(MockBehavior::ConnectFail);
        Box::new(ScriptedTransport::from_behavior(
            endpoint.clone(),
            behavior,
            Arc::clone(&self.connect_attempts),
            Arc::clone(&self.sent),
        ))
    }

    fn available_ports(&self) -> Vec<String> {
        self.ports.clone()
    }
}
