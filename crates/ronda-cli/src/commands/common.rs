use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ronda_core::config::SyncSettings;
use ronda_core::models::{AuditEntry, AuditEvent, OutboxEntry};
use ronda_core::remote::HttpIncidentStore;
use ronda_core::services::LocalOutbox;
use ronda_core::sync::{ConnectivityStatus, LocalAuditLog, SyncEngine, SyncSummary};
use ronda_core::IncidentId;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub id: String,
    pub code: String,
    pub created_at_local: i64,
    pub relative_time: String,
    pub is_edit: bool,
    pub rejection_reason: Option<String>,
    pub rejection_count: u32,
}

#[derive(Debug, Serialize)]
pub struct AuditItem {
    pub id: i64,
    pub kind: &'static str,
    pub recorded_at: i64,
    pub recorded_at_iso: String,
    pub event: AuditEvent,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("RONDA_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ronda")
        .join("outbox.db")
}

pub async fn open_outbox(path: &Path) -> Result<LocalOutbox, CliError> {
    Ok(LocalOutbox::open_path(path.to_path_buf()).await?)
}

/// Sync engine against the configured remote, `None` when no remote is set.
pub fn build_engine(
    outbox: &LocalOutbox,
    settings: &SyncSettings,
    connectivity: Arc<dyn ConnectivityStatus>,
) -> Result<Option<SyncEngine>, CliError> {
    let Some(remote_url) = settings.remote_url.clone() else {
        return Ok(None);
    };

    let remote = HttpIncidentStore::new(
        remote_url,
        settings.remote_token.clone(),
        settings.request_timeout,
    )?;
    tracing::debug!("Using remote incident store at {}", remote.base_url());

    Ok(Some(SyncEngine::new(
        outbox.clone(),
        Arc::new(remote),
        connectivity,
        Arc::new(LocalAuditLog::new(outbox.clone())),
        settings,
    )))
}

pub fn require_engine(engine: Option<SyncEngine>) -> Result<SyncEngine, CliError> {
    engine.ok_or(CliError::SyncNotConfigured)
}

/// Parse the payload argument, reading stdin for `-` or when piped.
pub fn resolve_payload(raw: Option<&str>) -> Result<serde_json::Value, CliError> {
    let text = match raw.map(str::trim) {
        Some("-") => read_stdin()?,
        Some(text) if !text.is_empty() => Some(text.to_string()),
        _ => read_piped_stdin()?,
    };
    let text = text.ok_or(CliError::EmptyPayload)?;
    parse_payload(&text)
}

pub fn parse_payload(text: &str) -> Result<serde_json::Value, CliError> {
    let value: serde_json::Value = serde_json::from_str(text.trim())?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CliError::PayloadNotObject)
    }
}

pub fn parse_incident_id(raw: &str) -> Result<IncidentId, CliError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<IncidentId>()
        .map_err(|_| CliError::InvalidIncidentId(trimmed.to_string()))
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    read_stdin()
}

fn read_stdin() -> Result<Option<String>, CliError> {
    let mut buffer = String::new();
    io::stdin().lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub fn pending_to_item(entry: &OutboxEntry, now_ms: i64) -> PendingItem {
    PendingItem {
        id: entry.record.id.to_string(),
        code: entry.record.code.to_string(),
        created_at_local: entry.record.created_at_local,
        relative_time: format_relative_time(entry.record.created_at_local, now_ms),
        is_edit: entry.record.is_edit,
        rejection_reason: entry.rejection.as_ref().map(|r| r.reason.clone()),
        rejection_count: entry.rejection.as_ref().map_or(0, |r| r.count),
    }
}

pub fn format_pending_lines(entries: &[OutboxEntry], now_ms: i64) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let id = entry.record.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let code = entry.record.code.to_string();
            let relative_time = format_relative_time(entry.record.created_at_local, now_ms);
            let mut line = format!("{code:<10}  {short_id:<13}  {relative_time:<10}");
            if entry.record.is_edit {
                line.push_str("  edit");
            }
            if let Some(rejection) = &entry.rejection {
                line.push_str(&format!(
                    "  rejected x{}: {}",
                    rejection.count, rejection.reason
                ));
            }
            line
        })
        .collect()
}

pub fn audit_to_item(entry: &AuditEntry) -> AuditItem {
    AuditItem {
        id: entry.id,
        kind: entry.event.kind(),
        recorded_at: entry.recorded_at,
        recorded_at_iso: format_timestamp(entry.recorded_at),
        event: entry.event.clone(),
    }
}

pub fn format_audit_lines(entries: &[AuditEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let when = format_timestamp(entry.recorded_at);
            match &entry.event {
                AuditEvent::CodeReallocated {
                    record_id,
                    old_code,
                    new_code,
                    cause,
                } => format!(
                    "{when}  reallocated  {old_code} -> {new_code}  incident={record_id}  ({cause})"
                ),
                AuditEvent::BatchCompleted {
                    trigger,
                    synced,
                    rejected,
                    reallocated,
                    pending,
                    stopped,
                } => {
                    let mut line = format!(
                        "{when}  batch        trigger={trigger} synced={synced} rejected={rejected} reallocated={reallocated} pending={pending}"
                    );
                    if let Some(reason) = stopped {
                        line.push_str(&format!(" stopped={reason}"));
                    }
                    line
                }
            }
        })
        .collect()
}

pub fn format_summary(summary: &SyncSummary) -> String {
    let mut line = format!(
        "Synced {}, rejected {}, reallocated {}, pending {}",
        summary.synced, summary.rejected, summary.reallocated, summary.pending
    );
    if summary.deferred > 0 {
        line.push_str(&format!(" ({} waiting out a rejection)", summary.deferred));
    }
    if let Some(reason) = summary.stopped {
        line.push_str(&format!("; stopped early: {}", reason.as_str()));
    }
    line
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |value| value.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff_seconds = (now_ms - timestamp_ms).max(0) / 1000;

    if diff_seconds < 60 {
        return "just now".to_string();
    }

    let diff_minutes = diff_seconds / 60;
    if diff_minutes < 60 {
        return format!("{diff_minutes}m ago");
    }

    let diff_hours = diff_minutes / 60;
    if diff_hours < 24 {
        return format!("{diff_hours}h ago");
    }

    format!("{}d ago", diff_hours / 24)
}
