//! Structured status reporting, mirroring the original `PRINT|LOGFILE|DATABASE`
//! bitmask (`SPEC_FULL.md` §6, "Logging stack").
//!
//! `tracing` (configured with a JSON formatter in `main`) always handles the
//! `PRINT`/`LOGFILE` half of the original bitmask: every event recorded here
//! goes through `tracing` regardless of mode. `DATABASE` additionally
//! forwards the event to Logstash, mirroring
//! `original_source/tarxiv/utils.py`'s `AsynchronousLogstashHandler` (the
//! original ships status events to Logstash, not a database row, despite the
//! flag's name).

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReportMode: u8 {
        const PRINT = 0b001;
        const LOGFILE = 0b010;
        const DATABASE = 0b100;
    }
}

impl Default for ReportMode {
    fn default() -> Self {
        Self::PRINT | Self::LOGFILE
    }
}

impl ReportMode {
    /// Parse a comma-separated `TARXIV_REPORT_MODE` value (`"print,logfile"`,
    /// `"print,logfile,database"`), case-insensitively. Unrecognized tokens
    /// are ignored rather than rejected, since this only gates where an
    /// already-emitted log line additionally goes.
    #[must_use]
    pub fn parse_list(raw: &str) -> Self {
        let mut mode = Self::empty();
        for token in raw.split(',') {
            match token.trim().to_ascii_lowercase().as_str() {
                "print" => mode |= Self::PRINT,
                "logfile" => mode |= Self::LOGFILE,
                "database" => mode |= Self::DATABASE,
                _ => {}
            }
        }
        mode
    }
}

/// A structured pipeline status event, matching the logging event shape in
/// `SPEC_FULL.md` §6: a top-level `status` key plus contextual fields.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub status: String,
    pub obj_name: Option<String>,
    pub xmatch_id: Option<String>,
    pub error_message: Option<String>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            obj_name: None,
            xmatch_id: None,
            error_message: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn obj_name(mut self, v: impl Into<String>) -> Self {
        self.obj_name = Some(v.into());
        self
    }

    #[must_use]
    pub fn xmatch_id(mut self, v: impl Into<String>) -> Self {
        self.xmatch_id = Some(v.into());
        self
    }

    #[must_use]
    pub fn error(mut self, v: impl Into<String>) -> Self {
        self.error_message = Some(v.into());
        self
    }

    #[must_use]
    pub fn details(mut self, v: impl Into<String>) -> Self {
        self.details = Some(v.into());
        self
    }

    /// Emit this event through `tracing` at the given severity, and forward
    /// it to `sink` when `mode` requests `DATABASE` and a sink was wired up.
    pub fn emit_error(&self, mode: ReportMode, sink: Option<&LogstashSink>) {
        if mode.contains(ReportMode::PRINT) || mode.contains(ReportMode::LOGFILE) {
            tracing::error!(
                status = %self.status,
                obj_name = ?self.obj_name,
                xmatch_id = ?self.xmatch_id,
                error_message = ?self.error_message,
                details = ?self.details,
                "pipeline event"
            );
        }
        self.maybe_forward(mode, sink);
    }

    pub fn emit_warn(&self, mode: ReportMode, sink: Option<&LogstashSink>) {
        if mode.contains(ReportMode::PRINT) || mode.contains(ReportMode::LOGFILE) {
            tracing::warn!(
                status = %self.status,
                obj_name = ?self.obj_name,
                xmatch_id = ?self.xmatch_id,
                error_message = ?self.error_message,
                details = ?self.details,
                "pipeline event"
            );
        }
        self.maybe_forward(mode, sink);
    }

    pub fn emit_info(&self, mode: ReportMode, sink: Option<&LogstashSink>) {
        if mode.contains(ReportMode::PRINT) || mode.contains(ReportMode::LOGFILE) {
            tracing::info!(
                status = %self.status,
                obj_name = ?self.obj_name,
                xmatch_id = ?self.xmatch_id,
                "pipeline event"
            );
        }
        self.maybe_forward(mode, sink);
    }

    fn maybe_forward(&self, mode: ReportMode, sink: Option<&LogstashSink>) {
        if mode.contains(ReportMode::DATABASE) {
            if let Some(sink) = sink {
                sink.send(self);
            }
        }
    }
}

/// Queues `StatusEvent`s for the `DATABASE` reporting mode. Handed out to
/// every component that emits pipeline events; backed by
/// [`run_logstash_forwarder`], which owns the actual connection.
#[derive(Clone)]
pub struct LogstashSink {
    tx: mpsc::Sender<serde_json::Value>,
}

impl LogstashSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<serde_json::Value>) -> Self {
        Self { tx }
    }

    /// Queue `event`. Never blocks and never surfaces a failure to the
    /// caller: a backlogged or disconnected forwarder should not slow down
    /// or fail the pipeline stage that produced the event.
    fn send(&self, event: &StatusEvent) {
        if let Ok(value) = serde_json::to_value(event) {
            let _ = self.tx.try_send(value);
        }
    }
}

/// Drain queued pipeline events and forward each as one JSON line over a
/// persistent TCP connection to Logstash, mirroring
/// `original_source/tarxiv/utils.py`'s `AsynchronousLogstashHandler`.
/// Reconnects lazily on the next event after a write failure rather than
/// retrying eagerly, since a gap in Logstash delivery is not fatal to the
/// pipeline itself.
pub async fn run_logstash_forwarder(
    host: String,
    port: u16,
    mut events: mpsc::Receiver<serde_json::Value>,
    token: CancellationToken,
) {
    let addr = format!("{host}:{port}");
    let mut stream: Option<TcpStream> = None;
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                if stream.is_none() {
                    match TcpStream::connect(&addr).await {
                        Ok(s) => stream = Some(s),
                        Err(e) => {
                            warn!(status = "logstash_connect_failed", addr, error = %e, "failed to connect to logstash, dropping event");
                            continue;
                        }
                    }
                }
                let Some(s) = stream.as_mut() else { continue };
                let mut line = event.to_string();
                line.push('\n');
                if let Err(e) = s.write_all(line.as_bytes()).await {
                    warn!(status = "logstash_write_failed", addr, error = %e, "logstash write failed, will reconnect on next event");
                    stream = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_excludes_database() {
        assert!(!ReportMode::default().contains(ReportMode::DATABASE));
        assert!(ReportMode::default().contains(ReportMode::PRINT));
    }

    #[test]
    fn parse_list_combines_recognized_tokens() {
        let mode = ReportMode::parse_list("print, DATABASE ,logfile");
        assert_eq!(mode, ReportMode::PRINT | ReportMode::LOGFILE | ReportMode::DATABASE);
    }

    #[test]
    fn parse_list_ignores_unknown_tokens() {
        assert_eq!(ReportMode::parse_list("print,bogus"), ReportMode::PRINT);
    }
}
