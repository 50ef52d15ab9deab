//! Console rendering of panel regions

use cockpit_client::{OutputSink, Region};
use colored::Colorize;

/// Writes region updates to the terminal
pub struct ConsoleSink {
    quiet: bool,
    labelled: bool,
}

impl ConsoleSink {
    /// `labelled` prefixes every update with its region, for the shell
    /// where several regions interleave.
    pub fn new(no_color: bool, quiet: bool, labelled: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { quiet, labelled }
    }

    fn line(&self, region: Region, text: &str) -> String {
        if self.labelled {
            format!("[{}] {}", region.label(), text)
        } else {
            text.to_string()
        }
    }
}

impl OutputSink for ConsoleSink {
    fn render(&self, region: Region, text: &str) {
        println!("{}", self.line(region, text));
    }

    fn placeholder(&self, region: Region, text: &str) {
        if !self.quiet {
            println!("{}", self.line(region, text).dimmed());
        }
    }

    fn error(&self, region: Region, text: &str) {
        eprintln!("{}", self.line(region, text).red());
    }
}
