use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use colored::Colorize;
use serde::Serialize;
use thiserror::Error;

use crate::classify::{Classification, ResponseKind};
use crate::executor::ResponseSummary;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("sink serialization failed: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
}

/// The single externally observable unit: one kept finding. Records with
/// `keep = false` never reach a sink.
#[derive(Clone, Debug, Serialize)]
pub struct ResultRecord {
    pub timestamp: u64,
    pub target: String,
    pub path: String,
    pub url: String,
    pub status: u16,
    pub body_size: usize,
    pub elapsed_ms: u64,
    pub depth: usize,
    pub kind: ResponseKind,
    pub label: String,
    pub signature: String,
    pub redirect: Option<String>,
}

impl ResultRecord {
    pub fn new(
        target: &str,
        path: &str,
        summary: &ResponseSummary,
        classification: &Classification,
        depth: usize,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            timestamp,
            target: target.to_string(),
            path: path.to_string(),
            url: summary.final_url.clone(),
            status: summary.status,
            body_size: summary.body_size,
            elapsed_ms: summary.elapsed_ms,
            depth,
            kind: classification.kind,
            label: classification.source_label.clone(),
            signature: classification.signature.clone(),
            redirect: summary.redirect_target().map(|s| s.to_string()),
        }
    }
}

/// Destination for result records. Implementations must be safe for
/// concurrent writes; the coordinator serializes delivery through one
/// channel, but sinks may also be shared.
pub trait Sink: Send + Sync {
    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: Sink> Sink for std::sync::Arc<S> {
    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError> {
        (**self).deliver(record)
    }

    fn flush(&self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Terminal sink: one colored line per finding.
pub struct PlainSink {
    progress: Option<indicatif::ProgressBar>,
}

impl PlainSink {
    pub fn new() -> Self {
        Self { progress: None }
    }

    /// Routes lines through a progress bar so findings do not tear the
    /// spinner.
    pub fn with_progress(progress: indicatif::ProgressBar) -> Self {
        Self {
            progress: Some(progress),
        }
    }

    fn format_line(record: &ResultRecord) -> String {
        let status = match record.status {
            200..=299 => record.status.to_string().green().bold(),
            300..=399 => record.status.to_string().cyan().bold(),
            400..=499 => record.status.to_string().yellow().bold(),
            _ => record.status.to_string().red().bold(),
        };
        let tag = match record.kind {
            ResponseKind::Waf => format!(" [{}]", record.label).red().to_string(),
            ResponseKind::Sys => format!(" [{}]", record.label).magenta().to_string(),
            ResponseKind::App if !record.label.is_empty() => {
                format!(" [{}]", record.label).blue().to_string()
            }
            _ => String::new(),
        };
        let redirect = record
            .redirect
            .as_deref()
            .map(|target| format!(" -> {}", target.cyan()))
            .unwrap_or_default();
        format!(
            "[{}] {:>9} - {}{}{}",
            status,
            record.body_size,
            record.url.bold().white(),
            redirect,
            tag,
        )
    }
}

impl Default for PlainSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for PlainSink {
    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError> {
        let line = Self::format_line(record);
        match self.progress.as_ref() {
            Some(pb) => pb.println(line),
            None => println!("{line}"),
        }
        Ok(())
    }
}

/// Appends one JSON document per finding to a file.
pub struct JsonLinesSink {
    file: Mutex<std::fs::File>,
}

impl JsonLinesSink {
    pub fn create(path: &std::path::Path) -> Result<Self, SinkError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Sink for JsonLinesSink {
    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.flush()?;
        Ok(())
    }
}

/// Collects records in memory; test support.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ResultRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Sink for MemorySink {
    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}
