//! Device discovery.
//!
//! Orders candidates from cheapest to most speculative and stops on the
//! first one that answers the Identify probe: preferred network endpoint,
//! network endpoint once more, last-known-good serial port, then the full
//! port x baud matrix. Winners are persisted through the settings store
//! so the next session skips the scan entirely.

use crate::command::Command;
use crate::constants::{
    ATTEMPTS_PER_CANDIDATE, BAUD_CANDIDATES, LEGACY_DEVICE_MARKER, NEW_DEVICE_MARKER,
    NEW_DEVICE_VERSION_OFFSET, SILENCE_WINDOW,
};
use crate::diag::{DiagnosticSink, frame_dump};
use crate::endpoint::{ConnectionState, ScanResult, TransportEndpoint, TransportKind};
use crate::error::WeldError;
use crate::framer::read_response;
use crate::settings::SettingsStore;
use crate::transport::{Transport, TransportFactory};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Which firmware generation answered the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceGeneration {
    Legacy,
    /// Current-generation unit; carries the one-character sub-version
    /// when the response was long enough to hold it.
    New { version: Option<char> },
}

/// Classify an Identify response by its marker substrings.
pub fn classify_identify(text: &str) -> Option<DeviceGeneration> {
    if text.contains(NEW_DEVICE_MARKER) {
        let version = text
            .as_bytes()
            .get(NEW_DEVICE_VERSION_OFFSET)
            .map(|&b| b as char)
            .filter(|c| c.is_ascii_graphic());
        return Some(DeviceGeneration::New { version });
    }
    if text.contains(LEGACY_DEVICE_MARKER) {
        return Some(DeviceGeneration::Legacy);
    }
    None
}

/// Everything a finished scan produced. On success the winning transport
/// rides along, still connected, ready to be adopted by the session.
pub struct ScanOutcome {
    pub state: ConnectionState,
    pub endpoint: Option<TransportEndpoint>,
    pub generation: Option<DeviceGeneration>,
    pub transport: Option<Box<dyn Transport>>,
    pub attempts: Vec<ScanResult>,
}

impl fmt::Debug for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOutcome")
            .field("state", &self.state)
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation)
            .field("transport", &self.transport.as_ref().map(|t| t.endpoint()))
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl ScanOutcome {
    fn not_found(attempts: Vec<ScanResult>) -> Self {
        Self {
            state: ConnectionState::DeviceNotFound,
            endpoint: None,
            generation: None,
            transport: None,
            attempts,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.transport.is_some()
    }
}

pub struct DeviceScanner {
    factory: Arc<dyn TransportFactory>,
    settings: Arc<dyn SettingsStore>,
    sink: Arc<dyn DiagnosticSink>,
    encrypt: bool,
    silence: Duration,
    in_progress: Arc<AtomicBool>,
}

/// Releases the scan-in-progress flag when a scan ends, however it ends.
struct ScanGuard(Arc<AtomicBool>);

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DeviceScanner {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        settings: Arc<dyn SettingsStore>,
        sink: Arc<dyn DiagnosticSink>,
        encrypt: bool,
    ) -> Self {
        Self {
            factory,
            settings,
            sink,
            encrypt,
            silence: SILENCE_WINDOW,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the response silence window (tests shorten it).
    pub fn with_silence_window(mut self, silence: Duration) -> Self {
        self.silence = silence;
        self
    }

    /// Share the scan-in-progress flag with other scanners over the same
    /// settings store, so at most one of them runs at a time.
    pub fn with_shared_guard(mut self, flag: Arc<AtomicBool>) -> Self {
        self.in_progress = flag;
        self
    }

    fn begin(&self) -> Result<ScanGuard, WeldError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(WeldError::ScanInProgress);
        }
        Ok(ScanGuard(Arc::clone(&self.in_progress)))
    }

    /// Full strategy: network first, then serial.
    pub async fn scan_all(&self) -> Result<ScanOutcome, WeldError> {
        let _guard = self.begin()?;
        let mut attempts = Vec::new();

        if let Some(outcome) = self.network_phase(&mut attempts).await {
            return Ok(outcome);
        }
        if let Some(outcome) = self.serial_phase(&mut attempts, None).await {
            return Ok(outcome);
        }

        info!("scan exhausted every candidate without an answer");
        Ok(ScanOutcome::not_found(attempts))
    }

    /// Network-only variant.
    pub async fn scan_network_only(&self) -> Result<ScanOutcome, WeldError> {
        let _guard = self.begin()?;
        let mut attempts = Vec::new();
        match self.network_phase(&mut attempts).await {
            Some(outcome) => Ok(outcome),
            None => Ok(ScanOutcome::not_found(attempts)),
        }
    }

    /// Serial-only variant, optionally pinned to one port/baud pair.
    pub async fn scan_serial_only(
        &self,
        pinned: Option<(String, u32)>,
    ) -> Result<ScanOutcome, WeldError> {
        let _guard = self.begin()?;
        let mut attempts = Vec::new();
        match self.serial_phase(&mut attempts, pinned).await {
            Some(outcome) => Ok(outcome),
            None => Ok(ScanOutcome::not_found(attempts)),
        }
    }

    /// Steps 1 and 2 of the strategy: the fixed network endpoint, first
    /// behind the preference flag, then once more unconditionally.
    async fn network_phase(&self, attempts: &mut Vec<ScanResult>) -> Option<ScanOutcome> {
        let endpoint = self.settings.network_endpoint();

        if self.settings.prefer_network() {
            if let Some(outcome) = self.attempt(&endpoint, attempts).await {
                return Some(outcome);
            }
            // A dead preferred endpoint stops being preferred.
            self.settings.set_prefer_network(false);
            self.sink
                .event("preferred network endpoint failed; preference cleared");
        }

        self.attempt(&endpoint, attempts).await
    }

    /// Steps 3 and 4: last-known-good serial port first, then the full
    /// port x baud matrix with two attempts per pair.
    async fn serial_phase(
        &self,
        attempts: &mut Vec<ScanResult>,
        pinned: Option<(String, u32)>,
    ) -> Option<ScanOutcome> {
        if let Some((port_name, baud_rate)) = pinned {
            let endpoint = TransportEndpoint::serial(port_name, baud_rate);
            return self.attempt(&endpoint, attempts).await;
        }

        let last = match self.settings.last_endpoint() {
            Some(ep @ TransportEndpoint::Serial { .. }) => {
                if let Some(outcome) = self.attempt(&ep, attempts).await {
                    return Some(outcome);
                }
                Some(ep)
            }
            _ => None,
        };
        let last_port = match &last {
            Some(TransportEndpoint::Serial { port_name, .. }) => Some(port_name.clone()),
            _ => None,
        };

        for port_name in self.factory.available_ports() {
            if last_port.as_deref() == Some(port_name.as_str()) {
                continue;
            }
            for baud_rate in BAUD_CANDIDATES {
                let endpoint = TransportEndpoint::serial(port_name.clone(), baud_rate);
                for _ in 0..ATTEMPTS_PER_CANDIDATE {
                    if let Some(outcome) = self.attempt(&endpoint, attempts).await {
                        return Some(outcome);
                    }
                }
            }
        }
        None
    }

    /// One probe of one candidate. Success persists the endpoint and
    /// wraps everything into the final outcome.
    async fn attempt(
        &self,
        endpoint: &TransportEndpoint,
        attempts: &mut Vec<ScanResult>,
    ) -> Option<ScanOutcome> {
        match self.probe(endpoint).await {
            Ok((mut transport, generation, raw_response)) => {
                attempts.push(ScanResult::success(endpoint.clone(), raw_response));
                self.settings.store_endpoint(endpoint);
                // The preference flag tracks the kind of the last winner,
                // so the next scan starts where this one ended.
                self.settings
                    .set_prefer_network(endpoint.kind() == TransportKind::Network);
                self.sink
                    .event(&format!("device answered on {endpoint}; endpoint persisted"));

                // Capability probing happens exactly once, on the scan
                // winner; the tunnel reports its firmware banner here.
                match transport.probe_capabilities().await {
                    Ok(Some(banner)) => self.sink.event(&format!("tunnel capability: {banner}")),
                    Ok(None) => {}
                    Err(e) => debug!("capability probe failed: {e}"),
                }

                let state = match generation {
                    DeviceGeneration::Legacy => ConnectionState::Connected,
                    DeviceGeneration::New { .. } => ConnectionState::NewDeviceDetected,
                };
                Some(ScanOutcome {
                    state,
                    endpoint: Some(endpoint.clone()),
                    generation: Some(generation),
                    transport: Some(transport),
                    attempts: std::mem::take(attempts),
                })
            }
            Err((raw_response, detail)) => {
                debug!("probe of {endpoint} failed: {detail}");
                attempts.push(ScanResult::failure(endpoint.clone(), raw_response, detail));
                None
            }
        }
    }

    /// Open, identify, classify. The error side carries whatever raw
    /// text arrived so the scan report can show it.
    async fn probe(
        &self,
        endpoint: &TransportEndpoint,
    ) -> Result<(Box<dyn Transport>, DeviceGeneration, String), (String, String)> {
        let mut transport = self.factory.open(endpoint);
        if let Err(e) = transport.connect().await {
            return Err((String::new(), format!("open failed: {e}")));
        }

        let frame = Command::Identify.build(self.encrypt);
        self.sink.event(&frame_dump(&format!("{endpoint} >"), &frame));
        if let Err(e) = transport.send(&frame).await {
            transport.disconnect().await;
            return Err((String::new(), format!("send failed: {e}")));
        }

        let response = match read_response(transport.as_mut(), self.silence).await {
            Ok(r) => r,
            Err(e) => {
                transport.disconnect().await;
                return Err((String::new(), format!("read failed: {e}")));
            }
        };
        let text = response.text();
        self.sink.event(&frame_dump(
            &format!(
                "{endpoint} < (delimiter: {}, {:?})",
                response.delimiter_found, response.elapsed
            ),
            &response.bytes,
        ));

        match classify_identify(&text) {
            Some(generation) => Ok((transport, generation, text)),
            None => {
                transport.disconnect().await;
                let detail = if text.is_empty() {
                    "no response before silence window".to_string()
                } else {
                    "response carried no device marker".to_string()
                };
                Err((text, detail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::TracingSink;
    use crate::settings::MemorySettings;
    use crate::testutil::{MockBehavior, MockFactory};

    const LEGACY_REPLY: &[u8] = b"WELD-CTRL V1.3\r\n";
    const NEW_REPLY: &[u8] = b"WELD-NG:B SN102\r\n";

    fn scanner(
        factory: MockFactory,
        settings: MemorySettings,
    ) -> (DeviceScanner, Arc<MockFactory>, Arc<MemorySettings>) {
        let factory = Arc::new(factory);
        let settings = Arc::new(settings);
        let scanner = DeviceScanner::new(
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
            Arc::clone(&settings) as Arc<dyn SettingsStore>,
            Arc::new(TracingSink),
            false,
        )
        .with_silence_window(Duration::from_millis(50));
        (scanner, factory, settings)
    }

    #[test]
    fn classify_finds_both_generations() {
        assert_eq!(
            classify_identify("hello WELD-CTRL V1"),
            Some(DeviceGeneration::Legacy)
        );
        assert_eq!(
            classify_identify("WELD-NG:B SN102"),
            Some(DeviceGeneration::New { version: Some('B') })
        );
        assert_eq!(classify_identify("MODEM READY"), None);
    }

    #[test]
    fn classify_new_marker_without_version_byte() {
        // Marker present but the response ends before the version offset.
        assert_eq!(
            classify_identify("WELD-NG:"),
            Some(DeviceGeneration::New { version: None })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_serial_success_is_a_single_attempt() {
        let pinned = TransportEndpoint::serial("COM7", 19_200);
        let factory = MockFactory::new(vec!["COM7", "COM8"])
            .behave(&pinned, MockBehavior::Reply(vec![LEGACY_REPLY.to_vec()]));
        let (scanner, factory, settings) = scanner(factory, MemorySettings::new());

        let outcome = scanner
            .scan_serial_only(Some(("COM7".into(), 19_200)))
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.state, ConnectionState::Connected);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(factory.opened_count(), 1, "no further ports or bauds tried");
        assert_eq!(settings.last_endpoint(), Some(pinned));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_preferred_network_clears_the_flag_and_falls_through() {
        let settings = MemorySettings::new().with_prefer_network(true);
        // Network endpoint unscripted: connect fails. No serial ports.
        let factory = MockFactory::new(vec![]);
        let (scanner, factory, settings) = scanner(factory, settings);

        let outcome = scanner.scan_all().await.unwrap();

        assert_eq!(outcome.state, ConnectionState::DeviceNotFound);
        assert!(!settings.prefer_network(), "flag cleared after failure");
        // Preferred try plus the unconditional retry.
        assert_eq!(factory.opened_count(), 2);
        assert!(outcome.attempts.iter().all(|a| !a.success));
    }

    #[tokio::test(start_paused = true)]
    async fn network_win_reports_new_device_and_persists() {
        let settings = MemorySettings::new();
        let network = settings.network_endpoint();
        let factory = MockFactory::new(vec![])
            .behave(&network, MockBehavior::Reply(vec![NEW_REPLY.to_vec()]));
        let (scanner, _, settings) = scanner(factory, settings);

        let outcome = scanner.scan_all().await.unwrap();

        assert_eq!(outcome.state, ConnectionState::NewDeviceDetected);
        assert_eq!(
            outcome.generation,
            Some(DeviceGeneration::New { version: Some('B') })
        );
        assert_eq!(settings.last_endpoint(), Some(network));
        assert!(settings.prefer_network(), "network winner sets the flag");
    }

    #[tokio::test(start_paused = true)]
    async fn serial_win_clears_the_network_preference() {
        let endpoint = TransportEndpoint::serial("COM4", 19_200);
        let settings = MemorySettings::new().with_prefer_network(true);
        let factory = MockFactory::new(vec!["COM4"])
            .behave(&endpoint, MockBehavior::Reply(vec![LEGACY_REPLY.to_vec()]));
        let (scanner, _, settings) = scanner(factory, settings);

        let outcome = scanner
            .scan_serial_only(Some(("COM4".into(), 19_200)))
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert!(!settings.prefer_network(), "serial winner rewrites the flag");
    }

    #[tokio::test(start_paused = true)]
    async fn matrix_scan_tries_last_known_port_first() {
        let last = TransportEndpoint::serial("COM9", 115_200);
        let settings = MemorySettings::new().with_last_endpoint(last.clone());
        let factory = MockFactory::new(vec!["COM1", "COM9"])
            .behave(&last, MockBehavior::Reply(vec![LEGACY_REPLY.to_vec()]));
        let (scanner, factory, _) = scanner(factory, settings);

        let outcome = scanner.scan_serial_only(None).await.unwrap();

        assert!(outcome.succeeded());
        assert_eq!(factory.opened_count(), 1);
        assert_eq!(factory.opened.lock().unwrap()[0], last);
    }

    #[tokio::test(start_paused = true)]
    async fn matrix_scan_records_every_failed_attempt() {
        // One silent port, two bauds, two attempts each: four results.
        let factory = MockFactory::new(vec!["COM2"])
            .behave(
                &TransportEndpoint::serial("COM2", 19_200),
                MockBehavior::Silent,
            )
            .behave(
                &TransportEndpoint::serial("COM2", 115_200),
                MockBehavior::Silent,
            );
        let (scanner, _, _) = scanner(factory, MemorySettings::new());

        let outcome = scanner.scan_serial_only(None).await.unwrap();

        assert_eq!(outcome.state, ConnectionState::DeviceNotFound);
        assert_eq!(outcome.attempts.len(), 4);
        assert!(
            outcome
                .attempts
                .iter()
                .all(|a| a.error_detail.as_deref()
                    == Some("no response before silence window"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_scans_are_refused() {
        let factory = MockFactory::new(vec![]);
        let (scanner, _, _) = scanner(factory, MemorySettings::new());
        let _guard = scanner.begin().unwrap();
        let err = scanner.scan_all().await.unwrap_err();
        assert!(matches!(err, WeldError::ScanInProgress));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_guard_serializes_separate_scanners() {
        let factory = Arc::new(MockFactory::new(vec![]));
        let settings = Arc::new(MemorySettings::new());
        let flag = Arc::new(AtomicBool::new(false));
        let build = || {
            DeviceScanner::new(
                Arc::clone(&factory) as Arc<dyn TransportFactory>,
                Arc::clone(&settings) as Arc<dyn SettingsStore>,
                Arc::new(TracingSink),
                false,
            )
            .with_shared_guard(Arc::clone(&flag))
        };
        let first = build();
        let second = build();

        let guard = first.begin().unwrap();
        let err = second.scan_all().await.unwrap_err();
        assert!(matches!(err, WeldError::ScanInProgress));

        drop(guard);
        assert!(second.scan_all().await.is_ok());
    }
}
