//! JSON-file settings store backing the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;
use weldlink_lib::constants::{DEFAULT_TUNNEL_HOST, DEFAULT_TUNNEL_PORT};
use weldlink_lib::endpoint::TransportEndpoint;
use weldlink_lib::settings::SettingsStore;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedSettings {
    last_endpoint: Option<TransportEndpoint>,
    prefer_network: bool,
    network_host: Option<String>,
    network_port: Option<u16>,
}

pub struct FileSettings {
    path: PathBuf,
    state: Mutex<PersistedSettings>,
}

impl FileSettings {
    pub fn load(path: PathBuf) -> Self {
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    fn save(&self, state: &PersistedSettings) {
        match serde_json::to_string_pretty(state) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("could not persist settings to {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!("could not serialize settings: {e}"),
        }
    }
}

impl SettingsStore for FileSettings {
    fn last_endpoint(&self) -> Option<TransportEndpoint> {
        self.state.lock().unwrap().last_endpoint.clone()
    }

    fn store_endpoint(&self, endpoint: &TransportEndpoint) {
        let mut state = self.state.lock().unwrap();
        state.last_endpoint = Some(endpoint.clone());
        self.save(&state);
    }

    fn prefer_network(&self) -> bool {
        self.state.lock().unwrap().prefer_network
    }

    fn set_prefer_network(&self, prefer: bool) {
        let mut state = self.state.lock().unwrap();
        state.prefer_network = prefer;
        self.save(&state);
    }

    fn network_endpoint(&self) -> TransportEndpoint {
        let state = self.state.lock().unwrap();
        TransportEndpoint::network(
            state
                .network_host
                .clone()
                .unwrap_or_else(|| DEFAULT_TUNNEL_HOST.to_string()),
            state.network_port.unwrap_or(DEFAULT_TUNNEL_PORT),
        )
    }
}
