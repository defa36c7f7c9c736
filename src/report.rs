//! User-facing sync messages.
//!
//! The sync pipeline emits one [`SyncEvent`] per step (`Fetching`,
//! `Pushing changes`, `Updated`, ...). A [`SyncReporter`] decides how they
//! are shown: plain lines on stderr, JSON lines, or recorded in memory.
//! Remote console output goes to stdout so it can be piped.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// The remote field a code block maps to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldTarget {
    pub doctype: String,
    pub docname: String,
    pub docfield: String,
}

impl std::fmt::Display for FieldTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.doctype, self.docname, self.docfield)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    Fetching(FieldTarget),
    FetchFailed { target: FieldTarget, error: String },
    Pushing(FieldTarget),
    Updated(FieldTarget),
    UpdateFailed { target: FieldTarget, error: String },
    Unchanged(FieldTarget),
    /// `clear` was set on a console block.
    ConsoleClear,
    ConsoleStarted,
    ConsoleOutput(String),
    ConsoleNoOutput,
    ConsoleFailed(String),
    ConsoleFinished(Duration),
    FileChanged(String),
    Pulled { path: String, created: bool },
}

pub trait SyncReporter: Send + Sync {
    fn report(&self, event: SyncEvent);
}

/// Human-friendly lines: status on stderr, console output on stdout.
pub struct HumanReporter;

impl HumanReporter {
    fn status(line: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", line);
        let _ = err.flush();
    }
}

impl SyncReporter for HumanReporter {
    fn report(&self, event: SyncEvent) {
        match event {
            SyncEvent::Fetching(t) => Self::status(&format!("{} - Fetching", t)),
            SyncEvent::FetchFailed { target, error } => {
                Self::status(&format!("{} - Failed to fetch: {}", target, error))
            }
            SyncEvent::Pushing(t) => Self::status(&format!("{} - Pushing changes", t)),
            SyncEvent::Updated(t) => Self::status(&format!("{} - Updated", t)),
            SyncEvent::UpdateFailed { target, error } => {
                Self::status(&format!("{} - Failed to update: {}", target, error))
            }
            SyncEvent::Unchanged(t) => Self::status(&format!("{} - No changes detected", t)),
            SyncEvent::ConsoleClear => {
                if atty::is(atty::Stream::Stdout) {
                    let mut out = std::io::stdout().lock();
                    let _ = write!(out, "\x1B[2J\x1B[1;1H");
                    let _ = out.flush();
                }
            }
            SyncEvent::ConsoleStarted => Self::status("Running console block...\n"),
            SyncEvent::ConsoleOutput(line) => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{}", line);
                let _ = out.flush();
            }
            SyncEvent::ConsoleNoOutput => {
                let _ = writeln!(std::io::stdout().lock(), "No output");
            }
            SyncEvent::ConsoleFailed(error) => Self::status(&format!("Console block failed: {}", error)),
            SyncEvent::ConsoleFinished(elapsed) => Self::status(&format!(
                "\nConsole block run: {:.3}ms",
                elapsed.as_secs_f64() * 1000.0
            )),
            SyncEvent::FileChanged(path) => Self::status(&format!("File changed: {}", path)),
            SyncEvent::Pulled { path, created } => Self::status(&format!(
                "{} {}",
                if created { "Created" } else { "Updated" },
                path
            )),
        }
    }
}

/// Machine-readable: one JSON object per line on stdout.
pub struct JsonReporter;

fn target_json(event: &str, t: &FieldTarget) -> serde_json::Value {
    serde_json::json!({
        "event": event,
        "doctype": t.doctype,
        "docname": t.docname,
        "docfield": t.docfield,
    })
}

impl SyncReporter for JsonReporter {
    fn report(&self, event: SyncEvent) {
        let obj = match &event {
            SyncEvent::Fetching(t) => target_json("fetching", t),
            SyncEvent::FetchFailed { target, error } => {
                let mut v = target_json("fetch_failed", target);
                v["error"] = error.clone().into();
                v
            }
            SyncEvent::Pushing(t) => target_json("pushing", t),
            SyncEvent::Updated(t) => target_json("updated", t),
            SyncEvent::UpdateFailed { target, error } => {
                let mut v = target_json("update_failed", target);
                v["error"] = error.clone().into();
                v
            }
            SyncEvent::Unchanged(t) => target_json("unchanged", t),
            SyncEvent::ConsoleClear => return,
            SyncEvent::ConsoleStarted => serde_json::json!({ "event": "console_started" }),
            SyncEvent::ConsoleOutput(line) => {
                serde_json::json!({ "event": "console_output", "line": line })
            }
            SyncEvent::ConsoleNoOutput => serde_json::json!({ "event": "console_no_output" }),
            SyncEvent::ConsoleFailed(error) => {
                serde_json::json!({ "event": "console_failed", "error": error })
            }
            SyncEvent::ConsoleFinished(elapsed) => serde_json::json!({
                "event": "console_finished",
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
            SyncEvent::FileChanged(path) => {
                serde_json::json!({ "event": "file_changed", "path": path })
            }
            SyncEvent::Pulled { path, created } => {
                serde_json::json!({ "event": "pulled", "path": path, "created": created })
            }
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stdout().lock(), "{}", line);
            let _ = std::io::stdout().lock().flush();
        }
    }
}

/// Keeps every event; used by tests and embedding callers.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl SyncReporter for RecordingReporter {
    fn report(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Output format selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn reporter(&self) -> Box<dyn SyncReporter> {
        match self {
            OutputFormat::Human => Box::new(HumanReporter),
            OutputFormat::Json => Box::new(JsonReporter),
        }
    }
}
