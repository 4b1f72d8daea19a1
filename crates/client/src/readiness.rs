//! Adapter readiness state machine.
//!
//! A single task owns the current [`AdapterReadinessState`] and applies every
//! probe, permission request and platform notification in arrival order.
//! Readers see the state through a `watch` channel, so a read never observes
//! a half-applied transition. Notifications that arrive while a probe is in
//! flight wait in the queue and are applied after it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::adapter::{
    AdapterError, AdapterNotification, CapabilityReport, ListenerRegistration, ProximityAdapter,
};

/// Whether the radio can be used to prove proximity right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterReadinessState {
    /// No usable radio. Terminal.
    Unsupported,
    PermissionDenied,
    PoweredOff,
    Ready,
}

enum Transition {
    To(AdapterReadinessState),
    Reprobe,
}

impl AdapterReadinessState {
    /// Support, then permission, then power.
    pub fn from_report(report: CapabilityReport) -> Self {
        if !report.supported {
            AdapterReadinessState::Unsupported
        } else if !report.permission_granted {
            AdapterReadinessState::PermissionDenied
        } else if !report.powered_on {
            AdapterReadinessState::PoweredOff
        } else {
            AdapterReadinessState::Ready
        }
    }

    fn on_notification(self, notification: AdapterNotification) -> Transition {
        use AdapterNotification as N;
        use AdapterReadinessState as S;

        match (self, notification) {
            (S::Unsupported, _) => Transition::To(S::Unsupported),
            (S::PoweredOff, N::PoweredOn) => Transition::To(S::Ready),
            (S::Ready, N::PoweredOff) => Transition::To(S::PoweredOff),
            (S::PoweredOff | S::Ready, N::PermissionRevoked) => Transition::To(S::PermissionDenied),
            // Power state is unknown while permission was missing.
            (S::PermissionDenied, N::PermissionGranted) => Transition::Reprobe,
            (state, _) => Transition::To(state),
        }
    }
}

impl std::fmt::Display for AdapterReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterReadinessState::Unsupported => write!(f, "unsupported"),
            AdapterReadinessState::PermissionDenied => write!(f, "permission_denied"),
            AdapterReadinessState::PoweredOff => write!(f, "powered_off"),
            AdapterReadinessState::Ready => write!(f, "ready"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Adapter readiness has shut down")]
    Stopped,
}

enum Inbox {
    Probe(oneshot::Sender<Result<AdapterReadinessState, AdapterError>>),
    RequestPermission(oneshot::Sender<Result<bool, AdapterError>>),
    Notification(AdapterNotification),
    Shutdown,
}

/// Handed to the platform listener; forwards notifications into the
/// readiness queue.
#[derive(Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<Inbox>,
}

impl NotificationSink {
    /// Queue a notification. Returns `false` once readiness has shut down.
    pub fn notify(&self, notification: AdapterNotification) -> bool {
        self.tx.send(Inbox::Notification(notification)).is_ok()
    }
}

struct ReadinessActor {
    adapter: Arc<dyn ProximityAdapter>,
    state_tx: watch::Sender<AdapterReadinessState>,
    listener: Option<Box<dyn ListenerRegistration>>,
    permission_timeout: Duration,
}

impl ReadinessActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Inbox>, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                Inbox::Probe(reply) => {
                    let _ = reply.send(self.probe().await);
                }
                Inbox::RequestPermission(reply) => {
                    let _ = reply.send(self.request_permission().await);
                }
                Inbox::Notification(notification) => self.apply(notification).await,
                Inbox::Shutdown => break,
            }
        }

        if let Some(listener) = self.listener.take() {
            listener.unregister();
            info!("Adapter power listener unregistered");
        }
    }

    fn state(&self) -> AdapterReadinessState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: AdapterReadinessState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Adapter readiness changed");
        }
    }

    async fn probe(&self) -> Result<AdapterReadinessState, AdapterError> {
        if self.state() == AdapterReadinessState::Unsupported {
            return Ok(AdapterReadinessState::Unsupported);
        }

        let report = self.adapter.probe_capability().await?;
        let next = AdapterReadinessState::from_report(report);
        self.set_state(next);
        Ok(next)
    }

    async fn request_permission(&self) -> Result<bool, AdapterError> {
        match self.state() {
            AdapterReadinessState::Unsupported => return Ok(false),
            AdapterReadinessState::PoweredOff | AdapterReadinessState::Ready => return Ok(true),
            AdapterReadinessState::PermissionDenied => {}
        }

        let granted =
            match tokio::time::timeout(self.permission_timeout, self.adapter.request_permission())
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        timeout_ms = self.permission_timeout.as_millis() as u64,
                        "Permission prompt timed out"
                    );
                    false
                }
            };

        if granted {
            self.probe().await?;
        }
        Ok(granted)
    }

    async fn apply(&self, notification: AdapterNotification) {
        debug!(?notification, "Adapter notification");
        match self.state().on_notification(notification) {
            Transition::To(next) => self.set_state(next),
            Transition::Reprobe => {
                if let Err(e) = self.probe().await {
                    warn!(error = %e, "Re-probe after permission grant failed");
                }
            }
        }
    }
}

/// Process-wide handle to the readiness state machine.
pub struct AdapterReadiness {
    adapter: Arc<dyn ProximityAdapter>,
    inbox: mpsc::UnboundedSender<Inbox>,
    state_rx: watch::Receiver<AdapterReadinessState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AdapterReadiness {
    /// Probe the adapter, register the power listener and start processing.
    ///
    /// An unsupported device never registers a listener.
    pub async fn start(
        adapter: Arc<dyn ProximityAdapter>,
        permission_timeout: Duration,
    ) -> Result<Self, ReadinessError> {
        let report = adapter.probe_capability().await?;
        let initial = AdapterReadinessState::from_report(report);
        info!(state = %initial, "Adapter readiness initialized");

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(initial);

        let listener = if initial == AdapterReadinessState::Unsupported {
            None
        } else {
            Some(adapter.subscribe_power_state(NotificationSink {
                tx: inbox_tx.clone(),
            }))
        };

        let cancel = CancellationToken::new();
        let actor = ReadinessActor {
            adapter: Arc::clone(&adapter),
            state_tx,
            listener,
            permission_timeout,
        };
        let task = tokio::spawn(actor.run(inbox_rx, cancel.clone()));

        Ok(Self {
            adapter,
            inbox: inbox_tx,
            state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn current_state(&self) -> AdapterReadinessState {
        *self.state_rx.borrow()
    }

    /// Re-check support, permission and power.
    pub async fn probe(&self) -> Result<AdapterReadinessState, ReadinessError> {
        let (reply, rx) = oneshot::channel();
        self.send(Inbox::Probe(reply))?;
        Ok(rx.await.map_err(|_| ReadinessError::Stopped)??)
    }

    /// Ask the user for radio permission. `false` if refused or unanswered in time.
    pub async fn request_permission(&self) -> Result<bool, ReadinessError> {
        let (reply, rx) = oneshot::channel();
        self.send(Inbox::RequestPermission(reply))?;
        Ok(rx.await.map_err(|_| ReadinessError::Stopped)??)
    }

    /// Point the user at the system settings. Does not change state.
    pub fn open_settings_hint(&self) {
        debug!(state = %self.current_state(), "Opening radio settings");
        self.adapter.open_settings();
    }

    /// A receiver that always holds the latest state.
    pub fn watch(&self) -> watch::Receiver<AdapterReadinessState> {
        self.state_rx.clone()
    }

    /// Call `on_change` on every state change until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(AdapterReadinessState) + Send + 'static,
    {
        let token = self.cancel.child_token();
        let mut rx = self.state_rx.clone();
        rx.mark_unchanged();

        let stop = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *rx.borrow_and_update();
                        on_change(state);
                    }
                }
            }
        });

        Subscription {
            _guard: token.drop_guard(),
        }
    }

    /// Stop processing and unregister the platform listener.
    pub async fn shutdown(&self) {
        let _ = self.inbox.send(Inbox::Shutdown);
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
                warn!("Adapter readiness did not stop in time");
                self.cancel.cancel();
            }
        }
    }

    fn send(&self, message: Inbox) -> Result<(), ReadinessError> {
        self.inbox.send(message).map_err(|_| ReadinessError::Stopped)
    }
}

impl Drop for AdapterReadiness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Live state subscription. Cancelled when dropped.
pub struct Subscription {
    _guard: DropGuard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAdapter;

    fn report(supported: bool, permission_granted: bool, powered_on: bool) -> CapabilityReport {
        CapabilityReport {
            supported,
            permission_granted,
            powered_on,
        }
    }

    #[test]
    fn test_from_report_precedence() {
        use AdapterReadinessState as S;
        assert_eq!(S::from_report(report(false, true, true)), S::Unsupported);
        assert_eq!(S::from_report(report(true, false, true)), S::PermissionDenied);
        assert_eq!(S::from_report(report(true, true, false)), S::PoweredOff);
        assert_eq!(S::from_report(report(true, true, true)), S::Ready);
    }

    #[tokio::test]
    async fn test_unsupported_is_terminal() {
        let adapter = Arc::new(FakeAdapter::new(report(false, false, false)));
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(readiness.current_state(), AdapterReadinessState::Unsupported);
        assert!(!readiness.request_permission().await.unwrap());
        adapter.set_report(report(true, true, true));
        assert_eq!(
            readiness.probe().await.unwrap(),
            AdapterReadinessState::Unsupported
        );
        assert_eq!(adapter.listeners_registered(), 0);
        assert_eq!(adapter.permission_requests(), 0);
    }

    #[tokio::test]
    async fn test_permission_grant_reprobes_power() {
        let adapter = Arc::new(FakeAdapter::new(report(true, false, false)));
        adapter.grant_on_request(true);
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            readiness.current_state(),
            AdapterReadinessState::PermissionDenied
        );

        assert!(readiness.request_permission().await.unwrap());
        assert_eq!(readiness.current_state(), AdapterReadinessState::PoweredOff);
    }

    #[tokio::test]
    async fn test_permission_refused_stays_denied() {
        let adapter = Arc::new(FakeAdapter::new(report(true, false, true)));
        adapter.grant_on_request(false);
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!readiness.request_permission().await.unwrap());
        assert_eq!(
            readiness.current_state(),
            AdapterReadinessState::PermissionDenied
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_permission_prompt_times_out() {
        let adapter = Arc::new(FakeAdapter::new(report(true, false, true)));
        adapter.hang_permission_prompt();
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(30))
            .await
            .unwrap();

        assert!(!readiness.request_permission().await.unwrap());
        assert_eq!(
            readiness.current_state(),
            AdapterReadinessState::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_power_notifications_drive_transitions() {
        let adapter = Arc::new(FakeAdapter::new(report(true, true, false)));
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        let mut rx = readiness.watch();

        adapter.notify(AdapterNotification::PoweredOn);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AdapterReadinessState::Ready);

        adapter.notify(AdapterNotification::PermissionRevoked);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AdapterReadinessState::PermissionDenied);

        // Power changes do not matter without permission.
        adapter.notify(AdapterNotification::PoweredOff);
        adapter.notify(AdapterNotification::PoweredOn);
        assert_eq!(
            readiness.probe().await.unwrap(),
            AdapterReadinessState::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_permission_granted_notification_reprobes() {
        let adapter = Arc::new(FakeAdapter::new(report(true, false, true)));
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        let mut rx = readiness.watch();

        adapter.set_report(report(true, true, true));
        adapter.notify(AdapterNotification::PermissionGranted);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AdapterReadinessState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_during_probe_applies_after() {
        let adapter = Arc::new(FakeAdapter::new(report(true, true, true)));
        let readiness = Arc::new(
            AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
                .await
                .unwrap(),
        );
        adapter.set_probe_delay(Duration::from_millis(200));

        let probing = {
            let readiness = Arc::clone(&readiness);
            tokio::spawn(async move { readiness.probe().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        adapter.notify(AdapterNotification::PoweredOff);

        assert_eq!(
            probing.await.unwrap().unwrap(),
            AdapterReadinessState::Ready
        );
        // The queued notification is applied once the probe has finished.
        let mut rx = readiness.watch();
        if *rx.borrow_and_update() != AdapterReadinessState::PoweredOff {
            rx.changed().await.unwrap();
        }
        assert_eq!(readiness.current_state(), AdapterReadinessState::PoweredOff);
    }

    #[tokio::test]
    async fn test_subscribe_reports_changes_until_dropped() {
        let adapter = Arc::new(FakeAdapter::new(report(true, true, false)));
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();

        let (tx, mut seen) = mpsc::unbounded_channel();
        let subscription = readiness.subscribe(move |state| {
            let _ = tx.send(state);
        });

        adapter.notify(AdapterNotification::PoweredOn);
        assert_eq!(seen.recv().await, Some(AdapterReadinessState::Ready));

        drop(subscription);
        adapter.notify(AdapterNotification::PoweredOff);
        assert_eq!(seen.recv().await, None);
    }

    #[tokio::test]
    async fn test_open_settings_hint_does_not_change_state() {
        let adapter = Arc::new(FakeAdapter::new(report(true, true, false)));
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();

        readiness.open_settings_hint();
        assert_eq!(adapter.settings_opened(), 1);
        assert_eq!(readiness.current_state(), AdapterReadinessState::PoweredOff);
    }

    #[tokio::test]
    async fn test_single_listener_unregistered_on_shutdown() {
        let adapter = Arc::new(FakeAdapter::new(report(true, true, true)));
        let readiness = AdapterReadiness::start(adapter.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(adapter.listeners_registered(), 1);
        assert_eq!(adapter.listeners_unregistered(), 0);

        readiness.shutdown().await;
        assert_eq!(adapter.listeners_unregistered(), 1);
        assert!(matches!(
            readiness.probe().await,
            Err(ReadinessError::Stopped)
        ));
    }
}
