//! Scripted radio adapter for tests and demos.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{
    AdapterError, AdapterNotification, Advertisement, CapabilityReport, ListenerRegistration,
    ProximityAdapter, ScanEvent, ScanSession,
};
use crate::readiness::NotificationSink;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Counters {
    probes: AtomicUsize,
    permission_requests: AtomicUsize,
    listeners_registered: AtomicUsize,
    listeners_unregistered: AtomicUsize,
    scans_started: AtomicUsize,
    scans_active: AtomicUsize,
    settings_opened: AtomicUsize,
}

/// Adapter whose answers are set by the test.
pub struct FakeAdapter {
    report: Mutex<CapabilityReport>,
    grant_on_request: AtomicBool,
    hang_permission: AtomicBool,
    probe_delay: Mutex<Duration>,
    scan_script: Mutex<Vec<(Duration, ScanEvent)>>,
    sink: Mutex<Option<NotificationSink>>,
    counters: Arc<Counters>,
}

impl FakeAdapter {
    pub fn new(report: CapabilityReport) -> Self {
        Self {
            report: Mutex::new(report),
            grant_on_request: AtomicBool::new(true),
            hang_permission: AtomicBool::new(false),
            probe_delay: Mutex::new(Duration::ZERO),
            scan_script: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// A supported, permitted, powered-on radio.
    pub fn ready() -> Self {
        Self::new(CapabilityReport {
            supported: true,
            permission_granted: true,
            powered_on: true,
        })
    }

    pub fn set_report(&self, report: CapabilityReport) {
        *lock(&self.report) = report;
    }

    pub fn grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    pub fn hang_permission_prompt(&self) {
        self.hang_permission.store(true, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *lock(&self.probe_delay) = delay;
    }

    /// Events each scan will emit; each entry waits its delay after the previous one.
    pub fn script_scan(&self, events: Vec<(Duration, ScanEvent)>) {
        *lock(&self.scan_script) = events;
    }

    pub fn advertisement(beacon_id: &str, signal_strength: i32) -> ScanEvent {
        ScanEvent::Advertisement(Advertisement {
            beacon_id: beacon_id.to_string(),
            signal_strength,
            received_at: Utc::now(),
        })
    }

    /// Update the simulated radio and deliver the notification to the listener.
    pub fn notify(&self, notification: AdapterNotification) -> bool {
        {
            let mut report = lock(&self.report);
            match notification {
                AdapterNotification::PoweredOn => report.powered_on = true,
                AdapterNotification::PoweredOff => report.powered_on = false,
                AdapterNotification::PermissionGranted => report.permission_granted = true,
                AdapterNotification::PermissionRevoked => report.permission_granted = false,
            }
        }
        match lock(&self.sink).as_ref() {
            Some(sink) => sink.notify(notification),
            None => false,
        }
    }

    pub fn probes(&self) -> usize {
        self.counters.probes.load(Ordering::SeqCst)
    }

    pub fn permission_requests(&self) -> usize {
        self.counters.permission_requests.load(Ordering::SeqCst)
    }

    pub fn listeners_registered(&self) -> usize {
        self.counters.listeners_registered.load(Ordering::SeqCst)
    }

    pub fn listeners_unregistered(&self) -> usize {
        self.counters.listeners_unregistered.load(Ordering::SeqCst)
    }

    pub fn scans_started(&self) -> usize {
        self.counters.scans_started.load(Ordering::SeqCst)
    }

    /// Scans started and not yet stopped.
    pub fn scans_active(&self) -> usize {
        self.counters.scans_active.load(Ordering::SeqCst)
    }

    pub fn settings_opened(&self) -> usize {
        self.counters.settings_opened.load(Ordering::SeqCst)
    }
}

struct FakeListener {
    counters: Arc<Counters>,
}

impl ListenerRegistration for FakeListener {
    fn unregister(self: Box<Self>) {
        self.counters
            .listeners_unregistered
            .fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeScan {
    cancel: CancellationToken,
    counters: Arc<Counters>,
}

#[async_trait::async_trait]
impl ScanSession for FakeScan {
    async fn stop(self: Box<Self>) {
        self.cancel.cancel();
        self.counters.scans_active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ProximityAdapter for FakeAdapter {
    async fn probe_capability(&self) -> Result<CapabilityReport, AdapterError> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.probe_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(*lock(&self.report))
    }

    async fn request_permission(&self) -> Result<bool, AdapterError> {
        self.counters
            .permission_requests
            .fetch_add(1, Ordering::SeqCst);
        if self.hang_permission.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let granted = self.grant_on_request.load(Ordering::SeqCst);
        if granted {
            lock(&self.report).permission_granted = true;
        }
        Ok(granted)
    }

    fn subscribe_power_state(&self, sink: NotificationSink) -> Box<dyn ListenerRegistration> {
        self.counters
            .listeners_registered
            .fetch_add(1, Ordering::SeqCst);
        *lock(&self.sink) = Some(sink);
        Box::new(FakeListener {
            counters: Arc::clone(&self.counters),
        })
    }

    fn start_scan(
        &self,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<Box<dyn ScanSession>, AdapterError> {
        self.counters.scans_started.fetch_add(1, Ordering::SeqCst);
        self.counters.scans_active.fetch_add(1, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let script = lock(&self.scan_script).clone();
        let stopped = cancel.clone();
        tokio::spawn(async move {
            for (delay, event) in script {
                tokio::select! {
                    _ = stopped.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if events.send(event).await.is_err() {
                    return;
                }
            }
            stopped.cancelled().await;
        });

        Ok(Box::new(FakeScan {
            cancel,
            counters: Arc::clone(&self.counters),
        }))
    }

    fn open_settings(&self) {
        self.counters.settings_opened.fetch_add(1, Ordering::SeqCst);
    }
}
