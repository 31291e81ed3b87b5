//! Async Task Dispatcher
//!
//! Runs parsing and schema validation off the caller's task:
//! - **Isolation**: each dispatch is a `tokio::spawn` task; the CPU-bound parse and rule
//!   evaluation run under `spawn_blocking` so the orchestration task never stalls
//! - **Minimum latency**: a valid verdict is reported only after `min_latency` has elapsed
//!   since the verdict; failures are reported as soon as they are known
//! - **Fault containment**: parse errors, invalid verdicts, panics and cancellations all
//!   surface as a [`DispatchOutcome::Failure`], never as an error or panic in the caller
//!
//! The dispatcher never touches upload state. Callers relay outcomes themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::UploadError;
use crate::parser::SourceFile;
use crate::record::Record;
use crate::validator::{self, Verdict};

/// Default delay before a successful outcome is reported
pub const DEFAULT_MIN_LATENCY: Duration = Duration::from_secs(3);

/// Records plus file metadata handed to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub records: Vec<Record>,
    pub schema_id: String,
    pub file_name: String,
    pub file_size: u64,
}

/// Marker serialized as `"processed"` in a success payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedState {
    #[default]
    Processed,
}

/// Success payload of a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    pub name: String,
    pub size: u64,
    pub rows: usize,
    pub data: Vec<Record>,
    pub processed_at: DateTime<Utc>,
    pub status: ProcessedState,
    /// Schema identifier the file was validated against
    pub field_name: String,
}

/// Outcome of one dispatch, exactly one per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WorkerMessage", try_from = "WorkerMessage")]
pub enum DispatchOutcome {
    Success(ProcessedFile),
    Failure { reason: String },
}

impl DispatchOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        DispatchOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }
}

/// Wire form of a [`DispatchOutcome`]:
/// `{ success: true, data }` or `{ success: false, error }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMessage {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ProcessedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<DispatchOutcome> for WorkerMessage {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Success(file) => WorkerMessage {
                success: true,
                data: Some(file),
                error: None,
            },
            DispatchOutcome::Failure { reason } => WorkerMessage {
                success: false,
                data: None,
                error: Some(reason),
            },
        }
    }
}

impl TryFrom<WorkerMessage> for DispatchOutcome {
    type Error = String;

    fn try_from(message: WorkerMessage) -> Result<Self, Self::Error> {
        match (message.success, message.data, message.error) {
            (true, Some(file), _) => Ok(DispatchOutcome::Success(file)),
            (true, None, _) => Err("success message without data".to_string()),
            (false, _, error) => Ok(DispatchOutcome::Failure {
                reason: error.unwrap_or_else(|| "Error processing file".to_string()),
            }),
        }
    }
}

/// Lifecycle of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Running,
    /// Finished with a verdict (or a parse failure, reported as invalid)
    Completed { valid: bool },
    /// Panicked or was cancelled
    Faulted,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Faulted)
    }
}

/// Handle to an in-flight dispatch
#[derive(Debug)]
pub struct TaskHandle {
    id: Uuid,
    state: watch::Receiver<TaskState>,
    state_tx: watch::Sender<TaskState>,
    join: JoinHandle<DispatchOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// A receiver that observes lifecycle changes, usable after the handle is consumed
    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.clone()
    }

    /// Cancel the run. A later [`join`](Self::join) reports a failure.
    pub fn abort(&self) {
        self.join.abort();
    }

    /// Cancels the run without owning the handle
    pub fn abort_handle(&self) -> AbortHandle {
        self.join.abort_handle()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the outcome. Never fails: faults become [`DispatchOutcome::Failure`].
    pub async fn join(self) -> DispatchOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state_tx.send_replace(TaskState::Faulted);
                let details = if e.is_cancelled() {
                    "validation cancelled".to_string()
                } else {
                    format!("worker task failed: {}", e)
                };
                warn!(task = %self.id, %details, "dispatch did not complete");
                DispatchOutcome::failure(UploadError::UnexpectedFault { details }.to_string())
            }
        }
    }
}

/// Input for one worker run
enum Job {
    Parsed(DispatchRequest),
    Source {
        schema_id: String,
        source: SourceFile,
    },
}

impl Job {
    fn schema_id(&self) -> &str {
        match self {
            Job::Parsed(request) => &request.schema_id,
            Job::Source { schema_id, .. } => schema_id,
        }
    }

    fn file_name(&self) -> &str {
        match self {
            Job::Parsed(request) => &request.file_name,
            Job::Source { source, .. } => &source.name,
        }
    }
}

/// Result of the blocking part of a run
enum Evaluation {
    Checked {
        records: Vec<Record>,
        verdict: Verdict,
        file_name: String,
        file_size: u64,
    },
    Unparseable(UploadError),
}

/// Spawns isolated validation runs
#[derive(Debug, Clone)]
pub struct Dispatcher {
    min_latency: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LATENCY)
    }
}

impl Dispatcher {
    pub fn new(min_latency: Duration) -> Self {
        Self { min_latency }
    }

    pub fn min_latency(&self) -> Duration {
        self.min_latency
    }

    /// Validate already-parsed records
    pub fn dispatch(&self, request: DispatchRequest) -> TaskHandle {
        self.spawn(Job::Parsed(request))
    }

    /// Parse `source` and validate it, both on the worker
    pub fn dispatch_source(&self, schema_id: impl Into<String>, source: SourceFile) -> TaskHandle {
        self.spawn(Job::Source {
            schema_id: schema_id.into(),
            source,
        })
    }

    fn spawn(&self, job: Job) -> TaskHandle {
        let id = Uuid::new_v4();
        let (state_tx, state) = watch::channel(TaskState::Queued);
        let span = info_span!(
            "validation",
            task = %id,
            schema = %job.schema_id(),
            file = %job.file_name()
        );

        let join = tokio::spawn(
            Self::run(job, self.min_latency, state_tx.clone()).instrument(span),
        );

        TaskHandle {
            id,
            state,
            state_tx,
            join,
        }
    }

    async fn run(
        job: Job,
        min_latency: Duration,
        state_tx: watch::Sender<TaskState>,
    ) -> DispatchOutcome {
        state_tx.send_replace(TaskState::Running);
        let schema_id = job.schema_id().to_string();
        debug!("validation started");

        let blocking_schema = schema_id.clone();
        let evaluation =
            tokio::task::spawn_blocking(move || Self::evaluate(job, &blocking_schema)).await;

        match evaluation {
            Ok(Evaluation::Checked {
                records,
                verdict,
                file_name,
                file_size,
            }) => {
                if !verdict.is_valid {
                    state_tx.send_replace(TaskState::Completed { valid: false });
                    warn!(errors = ?verdict.errors, "validation failed");
                    return DispatchOutcome::failure(verdict.reason());
                }

                tokio::time::sleep(min_latency).await;
                state_tx.send_replace(TaskState::Completed { valid: true });
                info!(rows = records.len(), "validation succeeded");

                DispatchOutcome::Success(ProcessedFile {
                    name: file_name,
                    size: file_size,
                    rows: records.len(),
                    data: records,
                    processed_at: Utc::now(),
                    status: ProcessedState::Processed,
                    field_name: schema_id,
                })
            }
            Ok(Evaluation::Unparseable(error)) => {
                state_tx.send_replace(TaskState::Completed { valid: false });
                warn!(%error, "file could not be parsed");
                DispatchOutcome::failure(error.to_string())
            }
            Err(e) => {
                state_tx.send_replace(TaskState::Faulted);
                let fault = UploadError::UnexpectedFault {
                    details: e.to_string(),
                };
                warn!(%fault, "validation worker faulted");
                DispatchOutcome::failure(fault.to_string())
            }
        }
    }

    fn evaluate(job: Job, schema_id: &str) -> Evaluation {
        let (records, file_name, file_size) = match job {
            Job::Parsed(request) => (request.records, request.file_name, request.file_size),
            Job::Source { source, .. } => match source.parse() {
                Ok(records) => (records, source.name, source.size),
                Err(e) => return Evaluation::Unparseable(e.into()),
            },
        };

        let verdict = validator::validate(schema_id, &records);
        Evaluation::Checked {
            records,
            verdict,
            file_name,
            file_size,
        }
    }
}
