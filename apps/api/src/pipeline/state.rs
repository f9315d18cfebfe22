//! Per-job state threaded through the stages, and the job's own log trail.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::job::{ItemResult, Job, SignalSource, ValidationFlag};
use crate::models::signals::SignalSet;
use crate::normalize::NormalizedItem;

/// Pipeline stages, in the only order they can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Ingest,
    ExtractSignals,
    Process,
    Validate,
    Output,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "INGEST",
            Stage::ExtractSignals => "EXTRACT_SIGNALS",
            Stage::Process => "PROCESS",
            Stage::Validate => "VALIDATE",
            Stage::Output => "OUTPUT",
            Stage::Completed => "COMPLETED",
            Stage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One entry in a job's log trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: Stage,
    pub msg: String,
    pub job_id: String,
}

/// Everything a job accumulates on its way through the stages. Owned by exactly
/// one run; stages take it by value and hand it back.
#[derive(Debug, Clone)]
pub struct JobState {
    pub job_id: String,
    pub stage: Stage,
    /// Raw request, as received.
    pub job: Job,

    // Filled by INGEST.
    pub role: String,
    pub extra_context: Option<String>,
    pub reference_text: String,
    pub reference_hash: String,
    pub signal_key: String,
    pub items: Vec<NormalizedItem>,
    pub idempotency_key: String,

    // Filled by EXTRACT_SIGNALS.
    pub signals: Option<SignalSet>,
    pub signal_source: Option<SignalSource>,

    // Filled by PROCESS, amended by VALIDATE.
    pub results: Vec<ItemResult>,
    pub job_flags: Vec<ValidationFlag>,

    pub logs: Vec<LogEntry>,
}

impl JobState {
    pub fn new(job_id: String, job: Job) -> Self {
        Self {
            job_id,
            stage: Stage::Ingest,
            job,
            role: String::new(),
            extra_context: None,
            reference_text: String::new(),
            reference_hash: String::new(),
            signal_key: String::new(),
            items: Vec::new(),
            idempotency_key: String::new(),
            signals: None,
            signal_source: None,
            results: Vec::new(),
            job_flags: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Appends to the trail and mirrors the entry to tracing.
    pub fn log(&mut self, level: LogLevel, msg: impl Into<String>) {
        let entry = LogEntry::record(&self.job_id, self.stage, level, msg);
        self.logs.push(entry);
    }

    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.log(LogLevel::Info, format!("entering {stage}"));
    }

    pub fn leave(&mut self) {
        let stage = self.stage;
        self.log(LogLevel::Info, format!("leaving {stage}"));
    }
}

impl LogEntry {
    /// Builds an entry stamped now and emits it through tracing.
    pub fn record(job_id: &str, stage: Stage, level: LogLevel, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match level {
            LogLevel::Info => info!(job_id = %job_id, stage = %stage, "{}", msg),
            LogLevel::Warn => warn!(job_id = %job_id, stage = %stage, "{}", msg),
            LogLevel::Error => error!(job_id = %job_id, stage = %stage, "{}", msg),
        }
        Self {
            ts: Utc::now(),
            level,
            stage,
            msg,
            job_id: job_id.to_string(),
        }
    }
}
