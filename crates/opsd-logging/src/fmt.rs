//! Render `tracing` events into concise logfmt strings and into the
//! [`opsd_protocol::LogRecord`] shape the Facade fans out to clients (spec
//! §6 "Logging": "structured entries `(timestamp, log_name, level,
//! message)`").
//!
//! Grounded on the teacher's `logfmt` crate: the same message/fields
//! extraction via a `Visit` implementation, generalized to also produce a
//! typed record instead of only a string.

use std::fmt::{Debug, Write};

use chrono::Utc;
use opsd_protocol::LogRecord;
use tracing::{
    Event, Metadata,
    field::{Field, Visit},
};

/// Rendered fields extracted from a tracing event.
#[derive(Debug, Clone)]
pub struct RenderedLog {
    /// Severity level (e.g. `INFO`, `WARN`).
    pub level: String,
    /// Event target (module path or explicit `log_name` field).
    pub target: String,
    /// Human-readable message, or rendered `key=value` pairs if there was no
    /// `message` field.
    pub message: String,
}

struct MsgVisitor {
    msg: Option<String>,
    log_name: Option<String>,
    fields: String,
}

impl Visit for MsgVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.msg = Some(value.to_string());
        } else if field.name() == "log_name" {
            self.log_name = Some(value.to_string());
        } else {
            let _ignored = write!(&mut self.fields, "{}=\"{}\" ", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.msg = Some(format!("{value:?}"));
        } else if field.name() == "log_name" {
            self.log_name = Some(format!("{value:?}").trim_matches('"').to_string());
        } else {
            let _ignored = write!(&mut self.fields, "{}={:?} ", field.name(), value);
        }
    }
}

/// Extract a concise triple (level, target, message) from a tracing event.
///
/// If the event carries a `message` field, it is used verbatim; otherwise
/// the remaining fields are rendered as `key=value` pairs, matching the
/// teacher's `logfmt::render_event`.
pub fn render_event(event: &Event<'_>) -> RenderedLog {
    let meta: &Metadata<'_> = event.metadata();
    let mut visitor = MsgVisitor {
        msg: None,
        log_name: None,
        fields: String::new(),
    };
    event.record(&mut visitor);
    let message = visitor
        .msg
        .unwrap_or_else(|| visitor.fields.trim_end().to_string());
    RenderedLog {
        level: meta.level().to_string(),
        target: visitor.log_name.unwrap_or_else(|| meta.target().to_string()),
        message,
    }
}

/// Render a tracing event into the wire [`LogRecord`] shape (spec §6).
pub fn to_log_record(event: &Event<'_>) -> LogRecord {
    let rendered = render_event(event);
    LogRecord {
        timestamp: Utc::now(),
        log_name: rendered.target,
        level: rendered.level.to_lowercase(),
        message: rendered.message,
    }
}
