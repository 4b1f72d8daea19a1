//! Proximity observation producers.
//!
//! The caller chooses between a live radio scan and a simulated observation
//! with an explicit `test_mode` flag. Live scans are gated on adapter
//! readiness before the radio is touched.

use std::sync::Arc;
use std::time::Duration;

use domain::models::ProximityObservation;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, Advertisement, ProximityAdapter, ScanEvent};
use crate::config::ClientConfig;
use crate::readiness::{AdapterReadiness, AdapterReadinessState};

const SCAN_EVENT_BUFFER: usize = 64;

/// Why no observation could be produced. These are expected outcomes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObservationError {
    #[error("This device has no usable proximity radio")]
    Unsupported,

    #[error("Proximity permission has not been granted")]
    PermissionDenied,

    #[error("The proximity radio is switched off")]
    PoweredOff,

    #[error("Beacon {0} was not found nearby")]
    NoBeaconFound(String),

    #[error("Scan was cancelled")]
    ScanCancelled,

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl ObservationError {
    fn from_state(state: AdapterReadinessState) -> Option<Self> {
        match state {
            AdapterReadinessState::Unsupported => Some(ObservationError::Unsupported),
            AdapterReadinessState::PermissionDenied => Some(ObservationError::PermissionDenied),
            AdapterReadinessState::PoweredOff => Some(ObservationError::PoweredOff),
            AdapterReadinessState::Ready => None,
        }
    }
}

/// Observation from a simulated source. Always available.
pub fn simulated_observation(beacon_id: impl Into<String>) -> ProximityObservation {
    ProximityObservation::simulated(beacon_id)
}

/// Scans for `beacon_id` for up to `window` and returns the strongest
/// matching advertisement.
///
/// Does not consult readiness. Fails fast if the radio goes off mid-scan.
/// The scan is stopped on every exit path; stopping is bounded by `cancel_bound`.
pub async fn scan_strongest(
    adapter: &dyn ProximityAdapter,
    beacon_id: &str,
    window: Duration,
    cancel_bound: Duration,
    cancel: &CancellationToken,
) -> Result<ProximityObservation, ObservationError> {
    let (tx, mut rx) = mpsc::channel(SCAN_EVENT_BUFFER);
    let session = adapter.start_scan(tx)?;
    debug!(beacon_id, window_ms = window.as_millis() as u64, "Scan started");

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    let mut strongest: Option<Advertisement> = None;
    let result = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(ObservationError::ScanCancelled),
            _ = &mut deadline => {
                break strongest
                    .take()
                    .map(to_observation)
                    .ok_or_else(|| ObservationError::NoBeaconFound(beacon_id.to_string()));
            }
            event = rx.recv() => match event {
                Some(ScanEvent::Advertisement(adv)) if adv.beacon_id == beacon_id => {
                    if strongest
                        .as_ref()
                        .map_or(true, |best| adv.signal_strength > best.signal_strength)
                    {
                        strongest = Some(adv);
                    }
                }
                Some(ScanEvent::Advertisement(_)) => {}
                Some(ScanEvent::PoweredOff) => break Err(ObservationError::PoweredOff),
                // The adapter ended the scan early; use what was heard.
                None => {
                    break strongest
                        .take()
                        .map(to_observation)
                        .ok_or_else(|| ObservationError::NoBeaconFound(beacon_id.to_string()));
                }
            },
        }
    };

    if tokio::time::timeout(cancel_bound, session.stop()).await.is_err() {
        warn!(
            beacon_id,
            bound_ms = cancel_bound.as_millis() as u64,
            "Radio did not stop scanning within bound"
        );
    }

    match &result {
        Ok(obs) => info!(beacon_id, signal_strength = obs.signal_strength, "Beacon observed"),
        Err(e) => debug!(beacon_id, error = %e, "Scan ended without observation"),
    }
    result
}

fn to_observation(adv: Advertisement) -> ProximityObservation {
    let mut observation = ProximityObservation::live(adv.beacon_id, adv.signal_strength);
    observation.captured_at = adv.received_at;
    observation
}

/// Produces the proximity evidence sent with an unlock request.
pub struct ObservationProvider {
    adapter: Arc<dyn ProximityAdapter>,
    readiness: Arc<AdapterReadiness>,
    scan_window: Duration,
    cancel_bound: Duration,
}

impl ObservationProvider {
    pub fn new(
        adapter: Arc<dyn ProximityAdapter>,
        readiness: Arc<AdapterReadiness>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            adapter,
            readiness,
            scan_window: config.scan_window(),
            cancel_bound: config.cancel_bound(),
        }
    }

    pub fn readiness(&self) -> &AdapterReadiness {
        &self.readiness
    }

    /// Live observation if `test_mode` is false, simulated otherwise.
    pub async fn observe(
        &self,
        beacon_id: &str,
        test_mode: bool,
        cancel: &CancellationToken,
    ) -> Result<ProximityObservation, ObservationError> {
        if test_mode {
            return Ok(simulated_observation(beacon_id));
        }

        if let Some(err) = ObservationError::from_state(self.readiness.current_state()) {
            return Err(err);
        }

        scan_strongest(
            self.adapter.as_ref(),
            beacon_id,
            self.scan_window,
            self.cancel_bound,
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CapabilityReport;
    use crate::testing::FakeAdapter;
    use domain::models::ObservationSource;

    async fn provider(adapter: Arc<FakeAdapter>) -> ObservationProvider {
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        let config = ClientConfig {
            scan_window_ms: 2_000,
            ..ClientConfig::default()
        };
        ObservationProvider::new(adapter, Arc::new(readiness), &config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_strongest_matching_advertisement_wins() {
        let adapter = Arc::new(FakeAdapter::ready());
        adapter.script_scan(vec![
            (Duration::from_millis(100), FakeAdapter::advertisement("B1", -80)),
            (Duration::from_millis(100), FakeAdapter::advertisement("B2", -30)),
            (Duration::from_millis(100), FakeAdapter::advertisement("B1", -55)),
            (Duration::from_millis(100), FakeAdapter::advertisement("B1", -65)),
        ]);
        let provider = provider(adapter.clone()).await;

        let obs = provider
            .observe("B1", false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(obs.beacon_id, "B1");
        assert_eq!(obs.signal_strength, -55);
        assert_eq!(obs.source, ObservationSource::Live);
        assert_eq!(adapter.scans_active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapses_without_match() {
        let adapter = Arc::new(FakeAdapter::ready());
        adapter.script_scan(vec![(
            Duration::from_millis(100),
            FakeAdapter::advertisement("OTHER", -40),
        )]);
        let provider = provider(adapter.clone()).await;

        let err = provider
            .observe("B1", false, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ObservationError::NoBeaconFound("B1".to_string()));
        assert_eq!(adapter.scans_active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_power_off_mid_scan_fails_fast() {
        let adapter = Arc::new(FakeAdapter::ready());
        adapter.script_scan(vec![
            (Duration::from_millis(100), FakeAdapter::advertisement("B1", -50)),
            (Duration::from_millis(100), ScanEvent::PoweredOff),
        ]);
        let provider = provider(adapter.clone()).await;

        let started = tokio::time::Instant::now();
        let err = provider
            .observe("B1", false, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ObservationError::PoweredOff);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(adapter.scans_active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scan_releases_radio() {
        let adapter = Arc::new(FakeAdapter::ready());
        let provider = provider(adapter.clone()).await;
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                cancel.cancel();
            })
        };

        let err = provider.observe("B1", false, &cancel).await.unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err, ObservationError::ScanCancelled);
        assert_eq!(adapter.scans_started(), 1);
        assert_eq!(adapter.scans_active(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_never_touches_radio() {
        let adapter = Arc::new(FakeAdapter::new(CapabilityReport {
            supported: true,
            permission_granted: false,
            powered_on: true,
        }));
        let provider = provider(adapter.clone()).await;

        let err = provider
            .observe("B1", false, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ObservationError::PermissionDenied);
        assert_eq!(adapter.scans_started(), 0);
    }

    #[tokio::test]
    async fn test_not_ready_states_map_to_errors() {
        for (report, expected) in [
            (
                CapabilityReport {
                    supported: false,
                    permission_granted: false,
                    powered_on: false,
                },
                ObservationError::Unsupported,
            ),
            (
                CapabilityReport {
                    supported: true,
                    permission_granted: true,
                    powered_on: false,
                },
                ObservationError::PoweredOff,
            ),
        ] {
            let adapter = Arc::new(FakeAdapter::new(report));
            let provider = provider(adapter.clone()).await;
            let err = provider
                .observe("B1", false, &CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(err, expected);
            assert_eq!(adapter.scans_started(), 0);
        }
    }

    #[tokio::test]
    async fn test_test_mode_is_available_without_radio() {
        let adapter = Arc::new(FakeAdapter::new(CapabilityReport {
            supported: false,
            permission_granted: false,
            powered_on: false,
        }));
        let provider = provider(adapter.clone()).await;

        let obs = provider
            .observe("B1", true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(obs.is_simulated());
        assert_eq!(obs.beacon_id, "B1");
        assert_eq!(adapter.scans_started(), 0);
    }
}
