//! Operation dispatchers and output regions
//!
//! Every user action maps to one [`Panel`] operation. An operation renders a
//! placeholder into the region it owns, calls the backend, then renders the
//! pretty-printed result or an `Error: <message>` line. Errors never leave
//! the operation; the returned [`Outcome`] only tells the caller what was
//! rendered.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::client::{CockpitClient, Request};
use crate::error::{OperationError, Result};
use crate::session::{PollingController, SessionPolicy, SessionState};
use crate::types::PollRequest;

const STATUS_PATH: &str = "/api/status";
const ELM_INIT_PATH: &str = "/api/elm/init";
const VIN_READ_PATH: &str = "/api/vin/read";
const PIDS_SCAN_PATH: &str = "/api/pids/scan";
const COMMAND_PATH: &str = "/api/command";

/// Rendered when a serialized stop finds no session to stop
const NOT_RUNNING: &str = "polling session not running";

/// An output area of the control panel. Each is written by one operation
/// only, except `Poll` which start and stop share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Status,
    AdapterLog,
    Vin,
    Pids,
    Poll,
    Command,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::Status,
        Region::AdapterLog,
        Region::Vin,
        Region::Pids,
        Region::Poll,
        Region::Command,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Region::Status => "status",
            Region::AdapterLog => "adapter",
            Region::Vin => "vin",
            Region::Pids => "pids",
            Region::Poll => "poll",
            Region::Command => "command",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Where rendered text goes
pub trait OutputSink: Send + Sync {
    /// Replace the content of `region` with `text`
    fn render(&self, region: Region, text: &str);

    /// Transient text shown while a call is in flight
    fn placeholder(&self, region: Region, text: &str) {
        self.render(region, text);
    }

    /// An `Error: <message>` line
    fn error(&self, region: Region, text: &str) {
        self.render(region, text);
    }
}

/// What an operation ended up rendering
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Success payload rendered
    Rendered(Value),
    /// `Error: <message>` rendered
    Failed(OperationError),
    /// A local guard fired; no request was sent
    Skipped,
    /// A newer call took over the region before this one resolved
    Superseded,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Rendered(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelConfig {
    pub session: SessionPolicy,
    /// Drop the result of a call once a newer call targets the same region
    pub supersede_stale: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            session: SessionPolicy::default(),
            supersede_stale: true,
        }
    }
}

/// Per-region generation counters
struct Regions {
    generations: Vec<watch::Sender<u64>>,
}

impl Regions {
    fn new() -> Self {
        Self {
            generations: Region::ALL.iter().map(|_| watch::channel(0).0).collect(),
        }
    }

    fn begin(&self, region: Region) -> Ticket {
        let sender = &self.generations[region.index()];
        let mut generation = 0;
        sender.send_modify(|current| {
            *current += 1;
            generation = *current;
        });
        Ticket {
            generation,
            rx: sender.subscribe(),
        }
    }
}

/// Claim on a region for one call
struct Ticket {
    generation: u64,
    rx: watch::Receiver<u64>,
}

impl Ticket {
    fn is_current(&self) -> bool {
        *self.rx.borrow() == self.generation
    }

    /// Resolves once a newer call claims the region
    async fn superseded(&mut self) {
        loop {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            let current = *self.rx.borrow_and_update();
            if current != self.generation {
                return;
            }
        }
    }
}

/// The control panel: one-shot operations plus the polling controller
pub struct Panel {
    client: CockpitClient,
    controller: PollingController,
    sink: Arc<dyn OutputSink>,
    config: PanelConfig,
    regions: Regions,
}

impl Panel {
    pub fn new(client: CockpitClient, sink: Arc<dyn OutputSink>, config: PanelConfig) -> Self {
        let controller = PollingController::new(client.clone(), config.session)
            .with_latest_wins(config.supersede_stale);
        Self {
            client,
            controller,
            sink,
            config,
            regions: Regions::new(),
        }
    }

    pub fn controller(&self) -> &PollingController {
        &self.controller
    }

    pub fn session_state(&self) -> SessionState {
        self.controller.state()
    }

    /// Establish the initial view once the shell is wired up
    pub async fn initialize(&self) -> Outcome {
        self.fetch_status().await
    }

    /// `GET /api/status`
    pub async fn fetch_status(&self) -> Outcome {
        let outcome = self
            .dispatch(
                Region::Status,
                "Loading...",
                async { self.client.get(STATUS_PATH).await.map(Reply::Json) },
                true,
                pretty,
            )
            .await;

        if let Some(active) = outcome
            .value()
            .and_then(|v| v.get("polling_active"))
            .and_then(Value::as_bool)
        {
            self.controller.observe_remote(active);
        }
        outcome
    }

    /// `POST /api/elm/init`, rendering the handshake log when present
    pub async fn init_adapter(&self) -> Outcome {
        self.dispatch(
            Region::AdapterLog,
            "Initializing adapter...",
            async { self.client.post(ELM_INIT_PATH, Some(empty_body())).await.map(Reply::Json) },
            true,
            adapter_log_or_pretty,
        )
        .await
    }

    /// `GET /api/vin/read`
    pub async fn read_vin(&self) -> Outcome {
        self.dispatch(
            Region::Vin,
            "Reading VIN...",
            async { self.client.get(VIN_READ_PATH).await.map(Reply::Json) },
            true,
            pretty,
        )
        .await
    }

    /// `POST /api/pids/scan`
    pub async fn scan_pids(&self) -> Outcome {
        self.dispatch(
            Region::Pids,
            "Scanning PIDs...",
            async { self.client.post(PIDS_SCAN_PATH, Some(empty_body())).await.map(Reply::Json) },
            true,
            pretty,
        )
        .await
    }

    /// `POST /api/command?command=<cmd>`
    ///
    /// A blank command does nothing at all, not even the placeholder.
    pub async fn send_command(&self, cmd: &str) -> Outcome {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return Outcome::Skipped;
        }

        let request = Request::post(COMMAND_PATH)
            .query("command", cmd)
            .json(empty_body());
        self.dispatch(
            Region::Command,
            "Sending command...",
            async { self.client.send(&request).await.map(Reply::Json) },
            true,
            pretty,
        )
        .await
    }

    /// Start a polling session from raw field values
    pub async fn start_polling(
        &self,
        raw_vin: &str,
        raw_pids: &str,
        raw_interval: &str,
    ) -> Outcome {
        let request = PollRequest::from_fields(raw_vin, raw_pids, raw_interval);
        self.dispatch(
            Region::Poll,
            "Starting polling...",
            async {
                self.controller
                    .start(request)
                    .await
                    .map(|ack| Reply::Json(ack.unwrap_or_else(empty_body)))
            },
            false,
            pretty,
        )
        .await
    }

    /// Stop the polling session
    pub async fn stop_polling(&self) -> Outcome {
        let idle = self.controller.state() == SessionState::Idle;
        if self.config.session.serialize_transitions && idle {
            debug!("Stop skipped: session idle");
            return Outcome::Skipped;
        }

        self.dispatch(
            Region::Poll,
            "Stopping polling...",
            async {
                self.controller
                    .stop()
                    .await
                    .map(|ack| ack.map_or(Reply::Note(NOT_RUNNING), Reply::Json))
            },
            false,
            pretty,
        )
        .await
    }

    /// Render a placeholder, run `work`, render its result.
    ///
    /// `cancellable` work is dropped as soon as it is superseded. Session
    /// transitions are not cancellable: they always run to completion and
    /// only their rendering is dropped.
    async fn dispatch<F>(
        &self,
        region: Region,
        placeholder: &str,
        work: F,
        cancellable: bool,
        format: fn(&Value) -> String,
    ) -> Outcome
    where
        F: Future<Output = Result<Reply>>,
    {
        let mut ticket = self.regions.begin(region);
        self.sink.placeholder(region, placeholder);

        let result = if cancellable && self.config.supersede_stale {
            tokio::select! {
                result = work => result,
                _ = ticket.superseded() => {
                    debug!(region = region.label(), "Superseded call cancelled");
                    return Outcome::Superseded;
                }
            }
        } else {
            work.await
        };

        if self.config.supersede_stale && !ticket.is_current() {
            debug!(region = region.label(), "Dropping stale result");
            return Outcome::Superseded;
        }

        match result {
            Ok(Reply::Json(value)) => {
                self.sink.render(region, &format(&value));
                Outcome::Rendered(value)
            }
            Ok(Reply::Note(text)) => {
                self.sink.render(region, text);
                Outcome::Skipped
            }
            Err(err) => {
                self.sink.error(region, &format!("Error: {}", err));
                Outcome::Failed(err)
            }
        }
    }
}

/// What a dispatched call resolved to
enum Reply {
    Json(Value),
    /// The call found nothing to do; the text replaces the placeholder
    Note(&'static str),
}

fn empty_body() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Two-space indented JSON
pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn adapter_log_or_pretty(value: &Value) -> String {
    match value.get("log").and_then(Value::as_str) {
        Some(log) if !log.is_empty() => log.to_string(),
        _ => pretty(value),
    }
}
