//! Polling session controller
//!
//! Polling itself runs on the backend. The controller only issues start and
//! stop requests and tracks the session state the backend last confirmed:
//! a session is running from a successful start until a successful stop, or
//! until a status check reports it gone.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::client::CockpitClient;
use crate::error::{OperationError, Result};
use crate::types::PollRequest;

const START_PATH: &str = "/api/polling/start";
const STOP_PATH: &str = "/api/polling/stop";

/// Session state as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A start request is in flight
    Starting,
    Running,
    /// A stop request is in flight
    Stopping,
}

/// Local validation applied before a transition is sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Run one transition at a time. A start while running is rejected and
    /// a stop while idle sends nothing.
    pub serialize_transitions: bool,
    /// Reject a start whose interval is zero or negative
    pub reject_non_positive_interval: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    Stop,
}

#[derive(Debug, Default)]
struct SessionSlot {
    running: bool,
    pending: Option<(Transition, u64)>,
    next_id: u64,
}

/// Starts and stops the backend polling session
pub struct PollingController {
    client: CockpitClient,
    policy: SessionPolicy,
    latest_wins: bool,
    slot: Mutex<SessionSlot>,
    writer: tokio::sync::Mutex<()>,
}

impl PollingController {
    pub fn new(client: CockpitClient, policy: SessionPolicy) -> Self {
        Self {
            client,
            policy,
            latest_wins: true,
            slot: Mutex::new(SessionSlot::default()),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    /// With `latest_wins` (the default) only the most recently issued
    /// transition may confirm the session state. An older transition that
    /// resolves later leaves the state alone. Without it the last
    /// transition to resolve wins.
    pub fn with_latest_wins(mut self, latest_wins: bool) -> Self {
        self.latest_wins = latest_wins;
        self
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Current state: the pending transition if one is in flight, else the
    /// last confirmed state
    pub fn state(&self) -> SessionState {
        let slot = self.slot.lock();
        match slot.pending {
            Some((Transition::Start, _)) => SessionState::Starting,
            Some((Transition::Stop, _)) => SessionState::Stopping,
            None if slot.running => SessionState::Running,
            None => SessionState::Idle,
        }
    }

    /// Whether the last confirmed transition left the session running
    pub fn is_running(&self) -> bool {
        self.slot.lock().running
    }

    /// Record the session state reported by a status check
    pub fn observe_remote(&self, active: bool) {
        let mut slot = self.slot.lock();
        if slot.running != active {
            info!(active, "Polling state updated from status");
        }
        slot.running = active;
    }

    /// Start a polling session.
    ///
    /// Returns the backend acknowledgment. `Ok(None)` is never returned for
    /// a start; it is reserved for a stop skipped locally.
    #[instrument(skip(self, request), fields(pids = request.pids.len(), interval = request.interval))]
    pub async fn start(&self, request: PollRequest) -> Result<Option<Value>> {
        let positive = request.interval > 0.0;
        if self.policy.reject_non_positive_interval && !positive {
            debug!("Start rejected: non-positive interval");
            return Err(OperationError::new("polling interval must be positive"));
        }

        let _writer = self.acquire_writer().await;
        if self.policy.serialize_transitions && self.is_running() {
            debug!("Start rejected: session already running");
            return Err(OperationError::new("polling session already running"));
        }

        let body = serde_json::to_value(&request)
            .map_err(|e| OperationError::new(format!("Failed to encode request: {}", e)))?;

        let pending = self.begin(Transition::Start);
        let result = self.client.post(START_PATH, Some(body)).await;
        if result.is_ok() {
            if pending.confirm(true) {
                info!("Polling session started");
            } else {
                debug!("Start confirmed after a newer transition, state unchanged");
            }
        }
        result.map(Some)
    }

    /// Stop the polling session.
    ///
    /// Without serialized transitions the request is always sent, whatever
    /// the local state.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<Option<Value>> {
        let _writer = self.acquire_writer().await;
        if self.policy.serialize_transitions && !self.is_running() {
            debug!("Stop skipped: session already idle");
            return Ok(None);
        }

        let pending = self.begin(Transition::Stop);
        let result = self
            .client
            .post(STOP_PATH, Some(Value::Object(Default::default())))
            .await;
        if result.is_ok() {
            if pending.confirm(false) {
                info!("Polling session stopped");
            } else {
                debug!("Stop confirmed after a newer transition, state unchanged");
            }
        }
        result.map(Some)
    }

    async fn acquire_writer(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if self.policy.serialize_transitions {
            Some(self.writer.lock().await)
        } else {
            None
        }
    }

    fn begin(&self, transition: Transition) -> PendingTransition<'_> {
        let mut slot = self.slot.lock();
        slot.next_id += 1;
        let id = slot.next_id;
        slot.pending = Some((transition, id));
        PendingTransition {
            slot: &self.slot,
            id,
            latest_wins: self.latest_wins,
        }
    }
}

/// Marks a transition as in flight until it resolves or is dropped
struct PendingTransition<'a> {
    slot: &'a Mutex<SessionSlot>,
    id: u64,
    latest_wins: bool,
}

impl PendingTransition<'_> {
    /// Record the backend's confirmation. Returns false when a newer
    /// transition has been issued and owns the state.
    fn confirm(self, running: bool) -> bool {
        let mut slot = self.slot.lock();
        if self.latest_wins && slot.next_id != self.id {
            return false;
        }
        slot.running = running;
        true
    }
}

impl Drop for PendingTransition<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        // A newer transition owns the marker
        if matches!(slot.pending, Some((_, id)) if id == self.id) {
            slot.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, MockReply, TestServer};
    use serde_json::json;

    async fn controller(
        backend: &MockBackend,
        policy: SessionPolicy,
    ) -> (TestServer, PollingController) {
        let server = TestServer::start(backend.router()).await.unwrap();
        let controller = PollingController::new(server.client().clone(), policy);
        (server, controller)
    }

    fn request() -> PollRequest {
        PollRequest::from_fields("", "010C", "1")
    }

    #[tokio::test]
    async fn test_start_then_stop_transitions() {
        let backend = MockBackend::new();
        let (_server, controller) = controller(&backend, SessionPolicy::default()).await;
        assert_eq!(controller.state(), SessionState::Idle);

        let ack = controller.start(request()).await.unwrap();
        assert_eq!(ack, Some(json!({"ok": true})));
        assert_eq!(controller.state(), SessionState::Running);

        controller.stop().await.unwrap();
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_failed_start_keeps_confirmed_state() {
        let backend = MockBackend::new();
        backend.reply(START_PATH, MockReply::text(500, "ELM327 not reachable"));
        let (_server, controller) = controller(&backend, SessionPolicy::default()).await;

        let err = controller.start(request()).await.unwrap_err();
        assert_eq!(err.message(), "ELM327 not reachable");
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_double_start_is_forwarded_by_default() {
        let backend = MockBackend::new();
        let (_server, controller) = controller(&backend, SessionPolicy::default()).await;

        controller.start(request()).await.unwrap();
        controller.start(request()).await.unwrap();
        assert_eq!(backend.requests_to(START_PATH).len(), 2);
    }

    #[tokio::test]
    async fn test_serialized_rejects_start_while_running() {
        let backend = MockBackend::new();
        let policy = SessionPolicy {
            serialize_transitions: true,
            ..Default::default()
        };
        let (_server, controller) = controller(&backend, policy).await;

        controller.start(request()).await.unwrap();
        let err = controller.start(request()).await.unwrap_err();
        assert_eq!(err.message(), "polling session already running");
        assert_eq!(backend.requests_to(START_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_serialized_stop_while_idle_is_local_noop() {
        let backend = MockBackend::new();
        let policy = SessionPolicy {
            serialize_transitions: true,
            ..Default::default()
        };
        let (_server, controller) = controller(&backend, policy).await;

        assert_eq!(controller.stop().await.unwrap(), None);
        assert!(backend.requests_to(STOP_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_interval_when_enabled() {
        let backend = MockBackend::new();
        let policy = SessionPolicy {
            reject_non_positive_interval: true,
            ..Default::default()
        };
        let (_server, controller) = controller(&backend, policy).await;

        let err = controller
            .start(PollRequest::from_fields("", "010C", "0"))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "polling interval must be positive");
        assert!(backend.requests_to(START_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_state_is_starting_while_in_flight() {
        let backend = MockBackend::new();
        backend.reply(
            START_PATH,
            MockReply::json(200, json!({"ok": true})).delayed(std::time::Duration::from_millis(300)),
        );
        let (_server, controller) = controller(&backend, SessionPolicy::default()).await;
        let controller = std::sync::Arc::new(controller);

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start(request()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(controller.state(), SessionState::Starting);

        task.await.unwrap().unwrap();
        assert_eq!(controller.state(), SessionState::Running);
    }

    async fn slow_start_then_stop(latest_wins: bool) -> SessionState {
        let backend = MockBackend::new();
        backend.reply(
            START_PATH,
            MockReply::json(200, json!({"ok": true})).delayed(std::time::Duration::from_millis(200)),
        );
        let (_server, controller) = controller(&backend, SessionPolicy::default()).await;
        let controller = std::sync::Arc::new(controller.with_latest_wins(latest_wins));

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start(request()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        controller.stop().await.unwrap();
        assert_eq!(controller.state(), SessionState::Idle);

        task.await.unwrap().unwrap();
        controller.state()
    }

    #[tokio::test]
    async fn test_older_start_resolving_late_leaves_stop_state() {
        assert_eq!(slow_start_then_stop(true).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_last_resolving_transition_wins_without_latest_wins() {
        assert_eq!(slow_start_then_stop(false).await, SessionState::Running);
    }

    #[tokio::test]
    async fn test_observe_remote() {
        let backend = MockBackend::new();
        let (_server, controller) = controller(&backend, SessionPolicy::default()).await;

        controller.start(request()).await.unwrap();
        controller.observe_remote(false);
        assert_eq!(controller.state(), SessionState::Idle);
        controller.observe_remote(true);
        assert_eq!(controller.state(), SessionState::Running);
    }
}
