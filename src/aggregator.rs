//! Upload State Aggregator
//!
//! Owns one dataset slot per schema and derives the readiness signals from them.
//!
//! Invariants held after every mutation:
//! - a slot's status is `Success` exactly when its records are present
//! - `clear_all` swaps in four fresh slots in a single assignment
//! - every slot carries a generation; completions carrying an older generation are dropped
//!
//! The aggregator never fails. Invalid requests are ignored and logged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchOutcome, ProcessedFile};
use crate::schema::SchemaId;
use crate::snapshot::SessionSnapshot;

/// Lifecycle of a slot once a file has been chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }
}

/// Name and byte size of a chosen file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub size: u64,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Visual marker for a slot status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusIndicator {
    pub symbol: &'static str,
    pub label: &'static str,
    /// ANSI color code
    pub color: &'static str,
}

impl StatusIndicator {
    pub fn for_status(status: Option<UploadStatus>) -> Self {
        match status {
            None => StatusIndicator {
                symbol: "-",
                label: "EMPTY",
                color: "37",
            },
            Some(UploadStatus::Pending) => StatusIndicator {
                symbol: "…",
                label: "PENDING",
                color: "36",
            },
            Some(UploadStatus::Processing) => StatusIndicator {
                symbol: "⟳",
                label: "PROCESSING",
                color: "33",
            },
            Some(UploadStatus::Success) => StatusIndicator {
                symbol: "✓",
                label: "SUCCESS",
                color: "32",
            },
            Some(UploadStatus::Error) => StatusIndicator {
                symbol: "✗",
                label: "ERROR",
                color: "31",
            },
        }
    }
}

/// Per-schema state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slot {
    pub file: Option<FileRef>,
    pub status: Option<UploadStatus>,
    pub records: Option<ProcessedFile>,
    /// Failure reason of the last run, kept in memory only
    pub last_error: Option<String>,
    generation: u64,
}

impl Slot {
    fn fresh(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn indicator(&self) -> StatusIndicator {
        StatusIndicator::for_status(self.status)
    }
}

/// Proof of which run a completion belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub schema: SchemaId,
    pub generation: u64,
}

/// What `apply` did with an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Succeeded,
    Failed,
    /// The slot moved on since the ticket was issued
    Stale,
}

/// The four dataset slots plus a revision counter
#[derive(Debug, Clone, Default)]
pub struct UploadState {
    slots: [Slot; 4],
    revision: u64,
}

impl UploadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremented by every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn slot(&self, schema: SchemaId) -> &Slot {
        &self.slots[schema.index()]
    }

    /// All slots in display order
    pub fn slots(&self) -> impl Iterator<Item = (SchemaId, &Slot)> {
        SchemaId::ALL.into_iter().map(|id| (id, self.slot(id)))
    }

    fn slot_mut(&mut self, schema: SchemaId) -> &mut Slot {
        self.revision += 1;
        &mut self.slots[schema.index()]
    }

    pub fn set_file(&mut self, schema: SchemaId, file: Option<FileRef>) {
        self.slot_mut(schema).file = file;
    }

    /// Set a non-success status. Records are dropped so that only `set_records` can reach
    /// `Success`; a bare `Success` on a slot without records is ignored.
    pub fn set_status(&mut self, schema: SchemaId, status: Option<UploadStatus>) {
        if status == Some(UploadStatus::Success) {
            if self.slot(schema).records.is_none() {
                warn!(%schema, "Ignoring success status for a slot without records");
            }
            return;
        }

        let slot = self.slot_mut(schema);
        slot.status = status;
        slot.records = None;
        if status != Some(UploadStatus::Error) {
            slot.last_error = None;
        }
    }

    /// Store validated records; the slot becomes `Success`
    pub fn set_records(&mut self, schema: SchemaId, records: ProcessedFile) {
        let slot = self.slot_mut(schema);
        slot.records = Some(records);
        slot.status = Some(UploadStatus::Success);
        slot.last_error = None;
    }

    /// Reset every slot and invalidate all in-flight runs
    pub fn clear_all(&mut self) {
        let slots = &self.slots;
        let cleared = SchemaId::ALL.map(|id| Slot::fresh(slots[id.index()].generation + 1));
        self.slots = cleared;
        self.revision += 1;
        info!("Cleared all upload slots");
    }

    /// Every slot has some status
    pub fn all_submitted(&self) -> bool {
        self.slots.iter().all(|slot| slot.status.is_some())
    }

    /// Every slot validated successfully
    pub fn all_succeeded(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.status == Some(UploadStatus::Success))
    }

    /// Validated records of every schema, available only once all slots succeeded
    pub fn uploaded_data(&self) -> Option<BTreeMap<SchemaId, &ProcessedFile>> {
        if !self.all_succeeded() {
            return None;
        }
        self.slots()
            .map(|(id, slot)| slot.records.as_ref().map(|records| (id, records)))
            .collect()
    }

    /// Start a run for `schema`. Earlier tickets for the slot become stale.
    pub fn begin(&mut self, schema: SchemaId, file: FileRef) -> Ticket {
        let slot = self.slot_mut(schema);
        slot.generation += 1;
        slot.file = Some(file);
        slot.status = Some(UploadStatus::Pending);
        slot.records = None;
        slot.last_error = None;

        Ticket {
            schema,
            generation: slot.generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.slot(ticket.schema).generation == ticket.generation
    }

    /// Move a current run from `Pending` to `Processing`
    pub fn mark_processing(&mut self, ticket: &Ticket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.set_status(ticket.schema, Some(UploadStatus::Processing));
        true
    }

    /// Record the outcome of a run unless the slot has moved on
    pub fn apply(&mut self, ticket: &Ticket, outcome: DispatchOutcome) -> Applied {
        if !self.is_current(ticket) {
            debug!(
                schema = %ticket.schema,
                ticket = ticket.generation,
                current = self.slot(ticket.schema).generation,
                "Discarding stale outcome"
            );
            return Applied::Stale;
        }

        match outcome {
            DispatchOutcome::Success(records) => {
                self.set_records(ticket.schema, records);
                Applied::Succeeded
            }
            DispatchOutcome::Failure { reason } => {
                self.set_status(ticket.schema, Some(UploadStatus::Error));
                self.slot_mut(ticket.schema).last_error = Some(reason);
                Applied::Failed
            }
        }
    }

    /// Serialized view of the current slots
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            files: self.slots().map(|(id, slot)| (id, slot.file.clone())).collect(),
            upload_status: self.slots().map(|(id, slot)| (id, slot.status)).collect(),
            uploaded_data: self
                .slots()
                .map(|(id, slot)| (id, slot.records.clone()))
                .collect(),
        }
    }

    /// Replace all slots with a stored snapshot.
    ///
    /// Statuses are taken as stored. Only entries that would break the success/records
    /// pairing are normalized: success without records becomes no status, and records
    /// without success are dropped.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) {
        let slots = &self.slots;
        let restored = SchemaId::ALL.map(|id| {
            let mut slot = Slot::fresh(slots[id.index()].generation + 1);
            slot.file = snapshot.file(id).cloned();

            match (snapshot.status(id), snapshot.data(id)) {
                (Some(UploadStatus::Success), Some(records)) => {
                    slot.status = Some(UploadStatus::Success);
                    slot.records = Some(records.clone());
                }
                (Some(UploadStatus::Success), None) => {
                    warn!(schema = %id, "Snapshot marks success without records, resetting");
                }
                (status, records) => {
                    if records.is_some() {
                        debug!(schema = %id, "Dropping records of a slot that did not succeed");
                    }
                    slot.status = status;
                }
            }
            slot
        });

        self.slots = restored;
        self.revision += 1;
    }
}
