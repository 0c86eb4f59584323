//! Settings provider seam.
//!
//! On-disk persistence belongs to the embedding application. The library
//! reads the last-known-good endpoint and the network-preference flag at
//! discovery start and writes the winner back on every success, all
//! through this trait.

use crate::constants::{DEFAULT_TUNNEL_HOST, DEFAULT_TUNNEL_PORT};
use crate::endpoint::TransportEndpoint;
use std::sync::Mutex;

pub trait SettingsStore: Send + Sync {
    /// Endpoint that worked last time, if any.
    fn last_endpoint(&self) -> Option<TransportEndpoint>;

    /// Persist a discovery winner (endpoint kind plus its address).
    fn store_endpoint(&self, endpoint: &TransportEndpoint);

    /// Whether the network candidate should be tried before anything else.
    fn prefer_network(&self) -> bool;

    fn set_prefer_network(&self, prefer: bool);

    /// Address of the fixed tunnel device. Defaults to the factory one.
    fn network_endpoint(&self) -> TransportEndpoint {
        TransportEndpoint::network(DEFAULT_TUNNEL_HOST, DEFAULT_TUNNEL_PORT)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    last_endpoint: Option<TransportEndpoint>,
    prefer_network: bool,
    network_endpoint: Option<TransportEndpoint>,
}

/// In-memory store for tests and embedders without persistence.
#[derive(Debug, Default)]
pub struct MemorySettings {
    state: Mutex<MemoryState>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_endpoint(self, endpoint: TransportEndpoint) -> Self {
        self.state.lock().unwrap().last_endpoint = Some(endpoint);
        self
    }

    pub fn with_prefer_network(self, prefer: bool) -> Self {
        self.state.lock().unwrap().prefer_network = prefer;
        self
    }

    pub fn with_network_endpoint(self, endpoint: TransportEndpoint) -> Self {
        self.state.lock().unwrap().network_endpoint = Some(endpoint);
        self
    }
}

impl SettingsStore for MemorySettings {
    fn last_endpoint(&self) -> Option<TransportEndpoint> {
        self.state.lock().unwrap().last_endpoint.clone()
    }

    fn store_endpoint(&self, endpoint: &TransportEndpoint) {
        self.state.lock().unwrap().last_endpoint = Some(endpoint.clone());
    }

    fn prefer_network(&self) -> bool {
        self.state.lock().unwrap().prefer_network
    }

    fn set_prefer_network(&self, prefer: bool) {
        self.state.lock().unwrap().prefer_network = prefer;
    }

    fn network_endpoint(&self) -> TransportEndpoint {
        self.state
            .lock()
            .unwrap()
            .network_endpoint
            .clone()
            .unwrap_or_else(|| TransportEndpoint::network(DEFAULT_TUNNEL_HOST, DEFAULT_TUNNEL_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_the_winner() {
        let store = MemorySettings::new();
        assert!(store.last_endpoint().is_none());
        let ep = TransportEndpoint::serial("COM4", 19_200);
        store.store_endpoint(&ep);
        assert_eq!(store.last_endpoint(), Some(ep));
    }

    #[test]
    fn preference_flag_toggles() {
        let store = MemorySettings::new().with_prefer_network(true);
        assert!(store.prefer_network());
        store.set_prefer_network(false);
        assert!(!store.prefer_network());
    }
}
