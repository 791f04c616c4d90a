//! Ambient logging stack for the kernel (`SPEC_FULL.md` §10.1), generalized
//! from `tandem-observability`'s single-process-kind design to an arbitrary
//! `component` label, since the kernel has no notion of desktop/TUI
//! processes — only the components of `spec.md` §2 (C1..C10).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub component: String,
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// A structured log record for a kernel event. All fields beyond `event`
/// and `component` are optional context — most call sites only fill the
/// handful relevant to the component emitting it.
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub trace_id: Option<&'a str>,
    pub task_id: Option<&'a str>,
    pub agent_id: Option<&'a str>,
    pub provider_id: Option<&'a str>,
    pub model_id: Option<&'a str>,
    pub tool_name: Option<&'a str>,
    pub status: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub detail: Option<&'a str>,
}

impl<'a> ObservabilityEvent<'a> {
    pub fn new(event: &'a str, component: &'a str) -> Self {
        Self {
            event,
            component,
            trace_id: None,
            task_id: None,
            agent_id: None,
            provider_id: None,
            model_id: None,
            tool_name: None,
            status: None,
            error_code: None,
            detail: None,
        }
    }

    pub fn with_trace_id(mut self, v: &'a str) -> Self {
        self.trace_id = Some(v);
        self
    }
    pub fn with_task_id(mut self, v: &'a str) -> Self {
        self.task_id = Some(v);
        self
    }
    pub fn with_agent_id(mut self, v: &'a str) -> Self {
        self.agent_id = Some(v);
        self
    }
    pub fn with_provider_id(mut self, v: &'a str) -> Self {
        self.provider_id = Some(v);
        self
    }
    pub fn with_model_id(mut self, v: &'a str) -> Self {
        self.model_id = Some(v);
        self
    }
    pub fn with_tool_name(mut self, v: &'a str) -> Self {
        self.tool_name = Some(v);
        self
    }
    pub fn with_status(mut self, v: &'a str) -> Self {
        self.status = Some(v);
        self
    }
    pub fn with_error_code(mut self, v: &'a str) -> Self {
        self.error_code = Some(v);
        self
    }
    pub fn with_detail(mut self, v: &'a str) -> Self {
        self.detail = Some(v);
        self
    }
}

/// Redacts a large payload before it lands in a trace event's `detail`
/// field: the field still proves the payload existed and how big it was
/// without echoing its content into logs.
pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("[redacted len={} hash={}]", trimmed.len(), short_hash(trimmed))
}

pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn emit_event(level: Level, event: ObservabilityEvent<'_>) {
    match level {
        Level::ERROR => tracing::error!(
            target: "vantage.obs",
            component = event.component,
            event = event.event,
            trace_id = event.trace_id.unwrap_or(""),
            task_id = event.task_id.unwrap_or(""),
            agent_id = event.agent_id.unwrap_or(""),
            provider_id = event.provider_id.unwrap_or(""),
            model_id = event.model_id.unwrap_or(""),
            tool_name = event.tool_name.unwrap_or(""),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        Level::WARN => tracing::warn!(
            target: "vantage.obs",
            component = event.component,
            event = event.event,
            trace_id = event.trace_id.unwrap_or(""),
            task_id = event.task_id.unwrap_or(""),
            agent_id = event.agent_id.unwrap_or(""),
            provider_id = event.provider_id.unwrap_or(""),
            model_id = event.model_id.unwrap_or(""),
            tool_name = event.tool_name.unwrap_or(""),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        _ => tracing::info!(
            target: "vantage.obs",
            component = event.component,
            event = event.event,
            trace_id = event.trace_id.unwrap_or(""),
            task_id = event.task_id.unwrap_or(""),
            agent_id = event.agent_id.unwrap_or(""),
            provider_id = event.provider_id.unwrap_or(""),
            model_id = event.model_id.unwrap_or(""),
            tool_name = event.tool_name.unwrap_or(""),
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
    }
}

/// Initializes daily-rolling JSON file logs plus a compact console layer,
/// filtered by `RUST_LOG` (falling back to `info`).
pub fn init_logging(
    component: &str,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    cleanup_old_jsonl(logs_dir, component, retention_days)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(format!("vantage.{component}"))
        .filename_suffix("jsonl")
        .build(logs_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_ansi(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        component: component.to_string(),
        logs_dir: logs_dir.display().to_string(),
        prefix: format!("vantage.{component}"),
        retention_days,
        initialized_at: Utc::now(),
    };

    Ok((guard, info))
}

fn cleanup_old_jsonl(logs_dir: &Path, component: &str, retention_days: u64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
    let prefix = format!("vantage.{component}.");

    for entry in fs::read_dir(logs_dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if !name.starts_with(&prefix) || !name.ends_with(".jsonl") {
            continue;
        }

        let date_part = name.trim_start_matches(&prefix).trim_end_matches(".jsonl");

        let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };

        let Some(dt) = date.and_hms_opt(0, 0, 0) else {
            continue;
        };

        if DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc) < cutoff {
            let _ = fs::remove_file(path);
        }
    }

    Ok(())
}

pub fn canonical_logs_dir_from_root(root: &Path) -> PathBuf {
    root.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_text_masks_content() {
        let raw = "super-secret-argument-value";
        let redacted = redact_text(raw);
        assert!(redacted.contains("[redacted len="));
        assert!(!redacted.contains("super-secret-argument-value"));
    }

    #[test]
    fn canonical_logs_dir_joins_logs_folder() {
        let root = PathBuf::from("/tmp/vantage");
        let logs = canonical_logs_dir_from_root(&root);
        assert_eq!(logs, PathBuf::from("/tmp/vantage").join("logs"));
    }

    #[test]
    fn init_logging_creates_directory_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let logs_dir = dir.path().join("logs");
        let (_guard, info) = init_logging("test-component", &logs_dir, 7).unwrap();
        assert!(logs_dir.exists());
        assert_eq!(info.component, "test-component");
        assert_eq!(info.retention_days, 7);
    }
}
