//! Structured audit events for the observability collaborator
//!
//! Every externally meaningful decision (proposal lifecycle, stress and
//! governance outcomes) is emitted as a structured event. Sink failures are
//! logged and swallowed: a broken audit trail must never take down the
//! decision path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditSeverity::Info => write!(f, "info"),
            AuditSeverity::Warning => write!(f, "warning"),
            AuditSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// One audit event with a JSON-serializable payload
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub event_type: String,
    pub severity: AuditSeverity,
    pub message: String,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        component: impl Into<String>,
        event_type: impl Into<String>,
        severity: AuditSeverity,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.into(),
            event_type: event_type.into(),
            severity,
            message: message.into(),
            payload,
        }
    }
}

/// Audit event destination
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Sink that forwards events to the tracing subscriber
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: AuditEvent) {
        match event.severity {
            AuditSeverity::Info => tracing::info!(
                component = %event.component,
                event_type = %event.event_type,
                payload = %event.payload,
                "{}",
                event.message
            ),
            AuditSeverity::Warning => tracing::warn!(
                component = %event.component,
                event_type = %event.event_type,
                payload = %event.payload,
                "{}",
                event.message
            ),
            AuditSeverity::Critical => tracing::error!(
                component = %event.component,
                event_type = %event.event_type,
                payload = %event.payload,
                "{}",
                event.message
            ),
        }
    }
}

/// Append-only JSONL audit trail
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: AuditEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let result = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(format!("{}\n", line).as_bytes()).await
        }
        .await;

        match result {
            Ok(()) => debug!(
                "Logged audit event: {} {}",
                event.component, event.event_type
            ),
            Err(e) => warn!("Failed to write audit event: {}", e),
        }
    }
}
