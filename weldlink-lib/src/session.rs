//! Session and connection state.
//!
//! One `WelderSession` owns the connection bookkeeping: the state enum,
//! the endpoint that won discovery, and (for the network path only) the
//! retained open tunnel connection. Operations are single-flight: the
//! transport never serves two reads at once, and telemetry polling is
//! locked out while a configuration read is in flight.

use crate::command::Command;
use crate::config::SystemConfigurationRecord;
use crate::constants::{
    CONFIG_RECORD_SIZE, NETWORK_RETRY_ATTEMPTS, NETWORK_RETRY_DELAY, SILENCE_WINDOW,
};
use crate::diag::{DiagnosticSink, frame_dump};
use crate::endpoint::{ConnectionState, TransportEndpoint, TransportKind};
use crate::error::WeldError;
use crate::framer::read_response;
use crate::scanner::{DeviceGeneration, DeviceScanner, ScanOutcome};
use crate::settings::SettingsStore;
use crate::telemetry::{WeldTelemetry, parse_telemetry};
use crate::transport::{Transport, TransportFactory};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub struct WelderSession {
    factory: Arc<dyn TransportFactory>,
    settings: Arc<dyn SettingsStore>,
    sink: Arc<dyn DiagnosticSink>,
    state: ConnectionState,
    /// Transport kind of the last successful discovery. Dispatch keys off
    /// this, not off `is_connected()`: the tunnel can look momentarily
    /// disconnected mid-retry without changing which path we are on.
    active_kind: Option<TransportKind>,
    active_endpoint: Option<TransportEndpoint>,
    /// Retained tunnel connection; reconnecting per call is too slow.
    network: Option<Box<dyn Transport>>,
    generation: Option<DeviceGeneration>,
    encrypt: bool,
    busy: Arc<AtomicBool>,
    /// One scan-in-progress flag for every scanner this session mints.
    scan_flag: Arc<AtomicBool>,
    silence: Duration,
    retry_delay: Duration,
}

/// Clears the single-flight flag when an operation ends.
#[derive(Debug)]
struct Flight(Arc<AtomicBool>);

impl Drop for Flight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WelderSession {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        settings: Arc<dyn SettingsStore>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            factory,
            settings,
            sink,
            state: ConnectionState::NoConnection,
            active_kind: None,
            active_endpoint: None,
            network: None,
            generation: None,
            encrypt: true,
            busy: Arc::new(AtomicBool::new(false)),
            scan_flag: Arc::new(AtomicBool::new(false)),
            silence: SILENCE_WINDOW,
            retry_delay: NETWORK_RETRY_DELAY,
        }
    }

    /// Send frames in plaintext. The firmware accepts both variants.
    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn active_endpoint(&self) -> Option<&TransportEndpoint> {
        self.active_endpoint.as_ref()
    }

    pub fn generation(&self) -> Option<DeviceGeneration> {
        self.generation
    }

    /// A scanner wired to the same collaborators as this session. All
    /// scanners minted here share one in-progress flag, so two of them
    /// cannot race over the settings state.
    pub fn scanner(&self) -> DeviceScanner {
        DeviceScanner::new(
            Arc::clone(&self.factory),
            Arc::clone(&self.settings),
            Arc::clone(&self.sink),
            self.encrypt,
        )
        .with_shared_guard(Arc::clone(&self.scan_flag))
    }

    /// Take over the winner of a scan as the active link.
    pub fn adopt(&mut self, outcome: ScanOutcome) {
        self.state = outcome.state;
        self.generation = outcome.generation;
        if let (Some(endpoint), Some(transport)) = (outcome.endpoint, outcome.transport) {
            self.active_kind = Some(endpoint.kind());
            self.active_endpoint = Some(endpoint.clone());
            match endpoint.kind() {
                // The tunnel connection is kept open across calls.
                TransportKind::Network => self.network = Some(transport),
                // Serial ports reopen per call; dropping the probe's
                // handle closes the port.
                TransportKind::Serial => drop(transport),
            }
            self.sink
                .event(&format!("session now on {endpoint} ({})", self.state));
        }
    }

    /// Run discovery unless a usable endpoint is already in place.
    pub async fn ensure_connected(&mut self, reason: &str) -> Result<(), WeldError> {
        if self.active_kind.is_some() {
            return Ok(());
        }
        info!("discovery triggered: {reason}");
        let _flight = self.begin_flight()?;
        let outcome = self.scanner().scan_all().await?;
        let found = outcome.succeeded();
        drop(_flight);
        self.adopt(outcome);
        if found { Ok(()) } else { Err(WeldError::DeviceNotFound) }
    }

    /// Fetch and decode the 256-byte configuration record.
    pub async fn read_configuration(&mut self) -> Result<SystemConfigurationRecord, WeldError> {
        let raw = self.run_operation(Command::ReadConfiguration).await?;
        if raw.len() < CONFIG_RECORD_SIZE {
            return Err(WeldError::InsufficientData {
                expected: CONFIG_RECORD_SIZE,
                actual: raw.len(),
            });
        }
        let record = SystemConfigurationRecord::decode(&raw)?;
        if !record.checksum_ok() {
            // Observed on fielded units; reported, not enforced.
            warn!(
                "configuration checksum mismatch: stored {:#06x}, computed {:#06x}",
                record.stored_checksum, record.computed_checksum
            );
        }
        Ok(record)
    }

    /// Fetch the live telemetry line.
    pub async fn read_weld_parameters(&mut self) -> Result<WeldTelemetry, WeldError> {
        let raw = self.run_operation(Command::ReadWeldParameters).await?;
        let text = String::from_utf8_lossy(&raw).to_string();
        if text.trim().is_empty() {
            return Err(WeldError::MalformedResponse(
                "empty telemetry response".into(),
            ));
        }
        Ok(parse_telemetry(&text))
    }

    /// Fetch the lifetime weld counter.
    pub async fn read_weld_count(&mut self) -> Result<u32, WeldError> {
        let raw = self.run_operation(Command::ReadWeldCount).await?;
        let text = String::from_utf8_lossy(&raw);
        let digits = text
            .rsplit(':')
            .next()
            .unwrap_or(&text)
            .trim();
        digits.parse().map_err(|_| {
            WeldError::MalformedResponse(format!("unparsable weld count {text:?}"))
        })
    }

    /// Ask the unit for its type string.
    pub async fn query_type(&mut self) -> Result<String, WeldError> {
        let raw = self.run_operation(Command::TypeQuery).await?;
        let text = String::from_utf8_lossy(&raw).trim().to_string();
        if text.is_empty() {
            return Err(WeldError::MalformedResponse("empty type response".into()));
        }
        Ok(text)
    }

    fn begin_flight(&self) -> Result<Flight, WeldError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(WeldError::Busy);
        }
        Ok(Flight(Arc::clone(&self.busy)))
    }

    /// Single-flight wrapper around one command exchange.
    async fn run_operation(&mut self, command: Command) -> Result<Bytes, WeldError> {
        let _flight = self.begin_flight()?;
        match self.active_kind {
            None => Err(WeldError::NotConnected),
            Some(TransportKind::Serial) => self.exchange_serial(command).await,
            Some(TransportKind::Network) => self.exchange_network(command).await,
        }
    }

    /// Serial path: open the port fresh, exchange, close.
    async fn exchange_serial(&mut self, command: Command) -> Result<Bytes, WeldError> {
        let endpoint = self
            .active_endpoint
            .clone()
            .ok_or(WeldError::NotConnected)?;
        let mut transport = self.factory.open(&endpoint);
        transport.connect().await?;
        let result = self.exchange_on(transport.as_mut(), command).await;
        transport.disconnect().await;
        result
    }

    /// Network path: reuse the retained tunnel connection, reconnecting
    /// at most once per attempt, up to the configured attempt count.
    async fn exchange_network(&mut self, command: Command) -> Result<Bytes, WeldError> {
        for attempt in 1..=NETWORK_RETRY_ATTEMPTS {
            let transport = self.network.as_mut().ok_or(WeldError::NotConnected)?;

            if !transport.is_connected() {
                if let Err(e) = transport.connect().await {
                    self.sink.event(&format!(
                        "tunnel reconnect failed (attempt {attempt}/{NETWORK_RETRY_ATTEMPTS}): {e}"
                    ));
                    if attempt < NETWORK_RETRY_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    continue;
                }
            }

            match Self::exchange_once(
                transport.as_mut(),
                command,
                self.encrypt,
                self.silence,
                self.sink.as_ref(),
            )
            .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    self.sink.event(&format!(
                        "network exchange failed (attempt {attempt}/{NETWORK_RETRY_ATTEMPTS}): {e}"
                    ));
                    transport.disconnect().await;
                    if attempt < NETWORK_RETRY_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(WeldError::NetworkDeviceLost {
            attempts: NETWORK_RETRY_ATTEMPTS,
        })
    }

    async fn exchange_on(
        &self,
        transport: &mut dyn Transport,
        command: Command,
    ) -> Result<Bytes, WeldError> {
        Self::exchange_once(
            transport,
            command,
            self.encrypt,
            self.silence,
            self.sink.as_ref(),
        )
        .await
    }

    /// Build, send, and frame one command on an open transport.
    async fn exchange_once(
        transport: &mut dyn Transport,
        command: Command,
        encrypt: bool,
        silence: Duration,
        sink: &dyn DiagnosticSink,
    ) -> Result<Bytes, WeldError> {
        let frame = command.build(encrypt);
        sink.event(&frame_dump(&format!("{command} >"), &frame));
        transport.send(&frame).await?;
        let response = read_response(transport, silence).await?;
        sink.event(&frame_dump(
            &format!(
                "{command} < (delimiter: {}, {:?})",
                response.delimiter_found, response.elapsed
            ),
            &response.bytes,
        ));
        Ok(response.bytes)
    }
}
