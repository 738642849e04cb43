use regex::Regex;
use std::error::Error;
use std::fmt::Display;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Destination for relay output.
///
/// Templates use named placeholders (`{Timestamp}`) that are filled
/// positionally from `args`; the names are documentation only.
pub trait LogSink: Send + Sync {
    /// Write an informational event
    fn information(&self, template: &str, args: &[&dyn Display]);

    /// Write an error event carrying the captured failure
    fn error(&self, failure: &(dyn Error + 'static), template: &str, args: &[&dyn Display]);
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{|\}\}|\{[A-Za-z_][A-Za-z0-9_]*\}").ok())
        .as_ref()
}

/// Substitute `args` into `template` in placeholder order.
///
/// `{{` and `}}` are literal braces. Placeholders without a matching argument
/// are left untouched.
pub fn render_template(template: &str, args: &[&dyn Display]) -> String {
    let Some(pattern) = placeholder_pattern() else {
        return template.to_string();
    };

    let mut out = String::with_capacity(template.len() + 16);
    let mut last = 0;
    let mut next_arg = 0;

    for m in pattern.find_iter(template) {
        out.push_str(&template[last..m.start()]);
        match m.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            placeholder => match args.get(next_arg) {
                Some(arg) => {
                    out.push_str(&arg.to_string());
                    next_arg += 1;
                }
                None => out.push_str(placeholder),
            },
        }
        last = m.end();
    }

    out.push_str(&template[last..]);
    out
}

/// Default sink: forwards every line to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn information(&self, template: &str, args: &[&dyn Display]) {
        let message = render_template(template, args);
        tracing::info!(target: "dbrelay", template, "{}", message);
    }

    fn error(&self, failure: &(dyn Error + 'static), template: &str, args: &[&dyn Display]) {
        let message = render_template(template, args);
        tracing::error!(target: "dbrelay", template, error = %failure, "{}", message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLevel {
    Information,
    Error,
}

/// One captured sink write
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: RecordLevel,
    pub template: String,
    pub message: String,
    /// Display form of the failure, for error records
    pub failure: Option<String>,
}

/// Sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rendered messages in write order
    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn information(&self, template: &str, args: &[&dyn Display]) {
        self.push(LogRecord {
            level: RecordLevel::Information,
            template: template.to_string(),
            message: render_template(template, args),
            failure: None,
        });
    }

    fn error(&self, failure: &(dyn Error + 'static), template: &str, args: &[&dyn Display]) {
        self.push(LogRecord {
            level: RecordLevel::Error,
            template: template.to_string(),
            message: render_template(template, args),
            failure: Some(failure.to_string()),
        });
    }
}
