//! OBD Cockpit Client Library
//!
//! Typed control-panel client for an OBD cockpit backend: the HTTP service
//! fronting an ELM327-class OBD-II adapter.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cockpit_client::{CockpitClient, OutputSink, Panel, PanelConfig, Region};
//!
//! struct Stdout;
//!
//! impl OutputSink for Stdout {
//!     fn render(&self, region: Region, text: &str) {
//!         println!("[{}] {}", region.label(), text);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CockpitClient::new("http://localhost:8000")?;
//!     let panel = Panel::new(client, Arc::new(Stdout), PanelConfig::default());
//!
//!     // Initial status view
//!     panel.initialize().await;
//!
//!     // Start backend polling of RPM and coolant temperature every 2 s
//!     panel.start_polling("", "010C, 0105", "2").await;
//!
//!     // Raw adapter command
//!     panel.send_command("ATRV").await;
//!
//!     panel.stop_polling().await;
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a mock backend and server harness:
//!
//! ```rust,ignore
//! use cockpit_client::testing::{MockBackend, TestServer};
//!
//! let backend = MockBackend::new();
//! let server = TestServer::start(backend.router()).await?;
//! let status = server.client.get("/api/status").await?;
//! ```

mod client;
mod error;
mod panel;
mod session;
pub mod testing;
mod types;

pub use client::{ClientConfig, CockpitClient, Method, Request};
pub use client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
pub use error::{ClientError, OperationError, Result};
pub use panel::{pretty, Outcome, OutputSink, Panel, PanelConfig, Region};
pub use session::{PollingController, SessionPolicy, SessionState};
pub use types::*;
