//! Endpoint identities and connection state.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::Display;

/// Which kind of link the session is riding on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum TransportKind {
    Serial,
    Network,
}

/// Immutable identity of a candidate or active link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportEndpoint {
    Serial { port_name: String, baud_rate: u32 },
    Network { host: String, port: u16 },
}

impl TransportEndpoint {
    pub fn serial(port_name: impl Into<String>, baud_rate: u32) -> Self {
        TransportEndpoint::Serial {
            port_name: port_name.into(),
            baud_rate,
        }
    }

    pub fn network(host: impl Into<String>, port: u16) -> Self {
        TransportEndpoint::Network {
            host: host.into(),
            port,
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TransportEndpoint::Serial { .. } => TransportKind::Serial,
            TransportEndpoint::Network { .. } => TransportKind::Network,
        }
    }
}

impl fmt::Display for TransportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEndpoint::Serial {
                port_name,
                baud_rate,
            } => write!(f, "{port_name}@{baud_rate}"),
            TransportEndpoint::Network { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

/// Connection status owned by the session and mutated only by
/// scan/connect/read outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ConnectionState {
    #[default]
    NoConnection,
    /// A response carried the legacy device marker.
    Connected,
    /// A response carried the new-unit marker.
    NewDeviceDetected,
    /// Every candidate was exhausted without an answer.
    DeviceNotFound,
}

/// Outcome of a single discovery attempt. Ephemeral, collected into the
/// scan report for diagnostics.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub endpoint: TransportEndpoint,
    pub success: bool,
    pub raw_response: String,
    pub error_detail: Option<String>,
}

impl ScanResult {
    pub fn success(endpoint: TransportEndpoint, raw_response: String) -> Self {
        Self {
            endpoint,
            success: true,
            raw_response,
            error_detail: None,
        }
    }

    pub fn failure(
        endpoint: TransportEndpoint,
        raw_response: String,
        error_detail: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            success: false,
            raw_response,
            error_detail: Some(error_detail.into()),
        }
    }
}
