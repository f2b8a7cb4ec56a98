//! Terminal rendering for the CLI.
//!
//! Everything routes through [`Output`]; in `--json` mode only the final
//! document (and errors) reach the terminal.

use std::time::Duration;

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use stack_core::{DeployPhase, DeployTimeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn glyph(self) -> StyledObject<&'static str> {
        match self {
            Self::Info => style("ℹ").blue(),
            Self::Success => style("✓").green(),
            Self::Warn => style("⚠").yellow(),
            Self::Error => style("✗").red(),
            Self::Debug => style("→").dim(),
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Self::Warn | Self::Error | Self::Debug)
    }
}

/// Output handler for CLI messages.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
}

impl Output {
    pub fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    fn emit(&self, level: Level, msg: &str) {
        if self.json || (level == Level::Debug && !self.verbose) {
            return;
        }
        let line = match level {
            Level::Error => format!("{} {}", level.glyph(), style(msg).red()),
            Level::Debug => format!("{} {}", level.glyph(), style(msg).dim()),
            _ => format!("{} {}", level.glyph(), msg),
        };
        if level.to_stderr() {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    pub fn info(&self, msg: &str) {
        self.emit(Level::Info, msg);
    }

    pub fn success(&self, msg: &str) {
        self.emit(Level::Success, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.emit(Level::Warn, msg);
    }

    /// Errors are still reported in JSON mode, as `{"error": ...}` on stderr.
    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
            return;
        }
        self.emit(Level::Error, msg);
    }

    /// Only shown with `--verbose`.
    pub fn debug(&self, msg: &str) {
        self.emit(Level::Debug, msg);
    }

    pub fn header(&self, msg: &str) {
        if !self.json {
            println!("\n{}", style(msg).bold().underlined());
        }
    }

    pub fn step(&self, num: usize, total: usize, msg: &str) {
        if !self.json {
            println!("{} {}", style(format!("[{}/{}]", num, total)).dim(), msg);
        }
    }

    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            println!("{}", json);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if !self.json {
            println!("  {}: {}", style(key).dim(), value);
        }
    }

    pub fn list_item(&self, item: &str) {
        if !self.json {
            println!("  {} {}", style("•").dim(), item);
        }
    }

    pub fn table_row(&self, cols: &[&str], widths: &[usize]) {
        if self.json {
            return;
        }
        let formatted: Vec<String> = cols
            .iter()
            .zip(widths.iter())
            .map(|(col, width)| format!("{:width$}", col, width = width))
            .collect();
        println!("  {}", formatted.join("  "));
    }

    /// Phases a deployment or teardown went through, with the time each
    /// was reached and how long it lasted.
    pub fn timeline(&self, timeline: &DeployTimeline) {
        if self.json {
            return;
        }
        for line in timeline_lines(timeline) {
            println!("  {}", line);
        }
    }

    pub fn spinner(&self, msg: &str) -> ProgressBar {
        if self.json {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
        {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// Human label of a lifecycle phase.
pub fn phase_label(phase: &DeployPhase) -> String {
    match phase {
        DeployPhase::Synthesize => "Synthesized templates".to_string(),
        DeployPhase::Package => "Packaged function code".to_string(),
        DeployPhase::Provision(stack) => format!("Provisioned {}", stack),
        DeployPhase::Publish => "Published site".to_string(),
        DeployPhase::Teardown(stack) => format!("Deleted {}", stack),
        DeployPhase::Complete => "Complete".to_string(),
        DeployPhase::Failed(reason) => format!("Failed: {}", reason),
    }
}

fn phase_glyph(phase: &DeployPhase) -> StyledObject<&'static str> {
    match phase {
        DeployPhase::Failed(_) => style("✗").red(),
        DeployPhase::Complete => style("✓").green(),
        _ => style("•").dim(),
    }
}

/// One line per mark. A phase lasts until the next mark is reached.
fn timeline_lines(timeline: &DeployTimeline) -> Vec<String> {
    let marks: Vec<(&DeployPhase, Duration)> = timeline.marks().collect();
    marks
        .iter()
        .enumerate()
        .map(|(i, (phase, at))| {
            let offset = format!("+{}", format_elapsed(at.as_millis()));
            let took = marks
                .get(i + 1)
                .map(|(_, next)| format!(" ({})", format_elapsed(next.saturating_sub(*at).as_millis())))
                .unwrap_or_default();
            format!(
                "{} {:>8} {}{}",
                phase_glyph(phase),
                style(offset).dim(),
                phase_label(phase),
                style(took).dim()
            )
        })
        .collect()
}

/// Status badge for deployment records.
pub fn status_badge(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "deployed" => style(status).green().to_string(),
        "dry-run" => style(status).yellow().to_string(),
        "failed" => style(status).red().to_string(),
        _ => status.to_string(),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

pub fn format_elapsed(millis: u128) -> String {
    let secs = (millis / 1000) as u64;
    match secs {
        0 => format!("{}ms", millis),
        1..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}
