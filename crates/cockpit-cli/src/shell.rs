//! Interactive shell - a line-oriented control panel
//!
//! Field commands edit the form, button commands fire an operation in its
//! own task. Operations run concurrently and their results are printed as
//! they arrive, prefixed with the region they belong to.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cockpit_client::{Outcome, Panel};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::debug;

/// How long `quit` waits for in-flight operations before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const HELP: &str = "\
Fields:
  vin <value>        VIN for polling (empty = none)
  pids <a,b,...>     comma-separated PIDs to poll
  interval <secs>    polling interval (empty = 1.0)
  cmd <text>         raw adapter command
  fields             show current field values
Buttons:
  status             refresh backend status
  init               initialize the adapter
  read-vin           read the vehicle VIN
  scan               scan supported PIDs
  start | stop       start or stop backend polling
  send               send the raw command
  help | quit";

/// A form field of the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Vin,
    Pids,
    Interval,
    Cmd,
}

/// One parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Set(Field, String),
    Status,
    Init,
    ReadVin,
    Scan,
    Start,
    Stop,
    Send,
    Fields,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Current form field values, kept as typed
#[derive(Debug, Clone, Default)]
pub struct Form {
    pub vin: String,
    pub pids: String,
    pub interval: String,
    pub cmd: String,
}

impl Form {
    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Vin => self.vin = value,
            Field::Pids => self.pids = value,
            Field::Interval => self.interval = value,
            Field::Cmd => self.cmd = value,
        }
    }
}

/// Parse a shell line. Field values keep everything after the keyword.
pub fn parse_line(line: &str) -> ShellCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (trimmed, ""),
    };

    let field = match word {
        "vin" => Some(Field::Vin),
        "pids" => Some(Field::Pids),
        "interval" => Some(Field::Interval),
        "cmd" => Some(Field::Cmd),
        _ => None,
    };
    if let Some(field) = field {
        return ShellCommand::Set(field, rest.to_string());
    }

    if !rest.trim().is_empty() {
        return ShellCommand::Unknown(trimmed.to_string());
    }

    match word {
        "" => ShellCommand::Empty,
        "status" => ShellCommand::Status,
        "init" => ShellCommand::Init,
        "read-vin" => ShellCommand::ReadVin,
        "scan" => ShellCommand::Scan,
        "start" => ShellCommand::Start,
        "stop" => ShellCommand::Stop,
        "send" => ShellCommand::Send,
        "fields" => ShellCommand::Fields,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => ShellCommand::Unknown(other.to_string()),
    }
}

/// Run the shell until `quit` or end of input
pub async fn run(panel: Arc<Panel>) -> Result<()> {
    println!("OBD cockpit shell. Type 'help' for commands.");
    panel.initialize().await;

    let mut form = Form::default();
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        while tasks.try_join_next().is_some() {}

        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        let command = parse_line(&line);
        debug!(?command, "Shell command");

        match command {
            ShellCommand::Set(field, value) => form.set(field, value),
            ShellCommand::Fields => {
                println!("vin      = {:?}", form.vin);
                println!("pids     = {:?}", form.pids);
                println!("interval = {:?}", form.interval);
                println!("cmd      = {:?}", form.cmd);
            }
            ShellCommand::Status => {
                let panel = panel.clone();
                tasks.spawn(async move { panel.fetch_status().await });
            }
            ShellCommand::Init => {
                let panel = panel.clone();
                tasks.spawn(async move { panel.init_adapter().await });
            }
            ShellCommand::ReadVin => {
                let panel = panel.clone();
                tasks.spawn(async move { panel.read_vin().await });
            }
            ShellCommand::Scan => {
                let panel = panel.clone();
                tasks.spawn(async move { panel.scan_pids().await });
            }
            ShellCommand::Start => {
                let panel = panel.clone();
                let form = form.clone();
                tasks.spawn(async move {
                    panel
                        .start_polling(&form.vin, &form.pids, &form.interval)
                        .await
                });
            }
            ShellCommand::Stop => {
                let panel = panel.clone();
                tasks.spawn(async move { panel.stop_polling().await });
            }
            ShellCommand::Send => {
                let panel = panel.clone();
                let cmd = form.cmd.clone();
                tasks.spawn(async move { panel.send_command(&cmd).await });
            }
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Quit => break,
            ShellCommand::Empty => {}
            ShellCommand::Unknown(input) => {
                eprintln!("Unknown command: {} (type 'help')", input);
            }
        }
    }

    let aborted = drain(&mut tasks, SHUTDOWN_GRACE).await;
    if aborted > 0 {
        eprintln!("Aborted {} unfinished operation(s)", aborted);
    }
    Ok(())
}

/// Let running operations finish within `grace`, then abort the rest.
/// Returns how many were aborted.
async fn drain(tasks: &mut JoinSet<Outcome>, grace: Duration) -> usize {
    if tasks.is_empty() {
        return 0;
    }

    debug!(pending = tasks.len(), "Waiting for in-flight operations");
    let finished = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_ok();
    if finished {
        return 0;
    }

    let aborted = tasks.len();
    debug!(aborted, "Aborting in-flight operations");
    tasks.shutdown().await;
    aborted
}
