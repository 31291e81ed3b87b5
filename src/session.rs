//! Upload Session
//!
//! The orchestration layer. It is the single writer of [`UploadState`]:
//! - submissions start a run through the [`Dispatcher`] and record a [`Ticket`]
//! - worker outcomes come back over an `mpsc` channel as [`Completion`]s and are applied
//!   in arrival order
//! - replacing a file aborts the prior run, and its late completion is dropped by ticket
//! - every applied mutation is handed to the attached [`SnapshotStore`]

use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::aggregator::{Applied, FileRef, Ticket, UploadState, UploadStatus};
use crate::dispatcher::{DispatchOutcome, DispatchRequest, Dispatcher, TaskHandle};
use crate::error::UploadError;
use crate::parser::SourceFile;
use crate::record::Record;
use crate::schema::SchemaId;
use crate::snapshot::SnapshotStore;

const COMPLETION_BUFFER: usize = 16;

/// Failure reason for runs a previous session left pending or processing
pub const INTERRUPTED_REASON: &str = "Validation was interrupted before it finished";

/// A worker outcome tagged with the run it belongs to
#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub outcome: DispatchOutcome,
}

/// A completion that changed the session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub schema: SchemaId,
    pub applied: Applied,
}

pub struct UploadSession {
    state: UploadState,
    dispatcher: Dispatcher,
    store: Option<Arc<dyn SnapshotStore>>,
    in_flight: HashMap<SchemaId, (Ticket, AbortHandle)>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
}

impl UploadSession {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_BUFFER);
        Self {
            state: UploadState::new(),
            dispatcher,
            store: None,
            in_flight: HashMap::new(),
            completion_tx,
            completion_rx,
        }
    }

    /// Save a snapshot after every mutation
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Schemas with a run still in flight
    pub fn in_flight(&self) -> impl Iterator<Item = SchemaId> + '_ {
        self.in_flight.keys().copied()
    }

    /// Load the stored snapshot into the session. Returns whether one was found.
    ///
    /// A failing store leaves the session empty. Slots the snapshot shows as pending or
    /// processing have no worker behind them any more, so they are failed with
    /// [`INTERRUPTED_REASON`].
    pub async fn restore(&mut self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        match store.load().await {
            Ok(Some(snapshot)) => {
                for (_, (ticket, abort)) in self.in_flight.drain() {
                    debug!(schema = %ticket.schema, "Cancelling run on restore");
                    abort.abort();
                }
                self.state.restore(&snapshot);
                info!(revision = self.state.revision(), "Restored session snapshot");

                if self.fail_interrupted() {
                    self.persist().await;
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Could not load session snapshot, starting empty");
                false
            }
        }
    }

    /// Read a file and validate it against `schema`.
    ///
    /// An unreadable path fails the slot right away instead of returning an error.
    pub async fn submit_file(&mut self, schema: SchemaId, path: PathBuf) -> Ticket {
        match SourceFile::read(&path).await {
            Ok(source) => self.submit_source(schema, source).await,
            Err(e) => self.fail_unread(schema, &path, e.into()).await,
        }
    }

    /// Read several files concurrently, then submit each one
    pub async fn submit_files(&mut self, uploads: Vec<(SchemaId, PathBuf)>) -> Vec<Ticket> {
        let reads = join_all(uploads.iter().map(|(_, path)| SourceFile::read(path))).await;

        let mut tickets = Vec::with_capacity(uploads.len());
        for ((schema, path), read) in uploads.into_iter().zip(reads) {
            let ticket = match read {
                Ok(source) => self.submit_source(schema, source).await,
                Err(e) => self.fail_unread(schema, &path, e.into()).await,
            };
            tickets.push(ticket);
        }
        tickets
    }

    /// Validate in-memory file contents against `schema`
    pub async fn submit_source(&mut self, schema: SchemaId, source: SourceFile) -> Ticket {
        let file = FileRef::new(source.name.clone(), source.size);
        info!(%schema, file = %file.name, size = file.size, "Submitting upload");

        let ticket = self.state.begin(schema, file);
        self.state.mark_processing(&ticket);
        let handle = self.dispatcher.dispatch_source(schema.as_str(), source);
        self.track(ticket, handle);

        self.persist().await;
        ticket
    }

    /// Validate already-parsed records against `schema`
    pub async fn submit_records(
        &mut self,
        schema: SchemaId,
        file: FileRef,
        records: Vec<Record>,
    ) -> Ticket {
        let request = DispatchRequest {
            records,
            schema_id: schema.to_string(),
            file_name: file.name.clone(),
            file_size: file.size,
        };

        let ticket = self.state.begin(schema, file);
        self.state.mark_processing(&ticket);
        let handle = self.dispatcher.dispatch(request);
        self.track(ticket, handle);

        self.persist().await;
        ticket
    }

    /// Reset every slot and cancel all running validations
    pub async fn clear_all(&mut self) {
        for (_, (ticket, abort)) in self.in_flight.drain() {
            debug!(schema = %ticket.schema, "Cancelling run on clear");
            abort.abort();
        }
        self.state.clear_all();
        self.persist().await;
    }

    /// Apply the next current completion. `None` once nothing is in flight.
    ///
    /// Stale completions are applied (and therefore discarded) without being returned.
    pub async fn next_outcome(&mut self) -> Option<SessionEvent> {
        while !self.in_flight.is_empty() {
            let completion = self.completion_rx.recv().await?;
            let ticket = completion.ticket;

            let applied = self.state.apply(&ticket, completion.outcome);
            if applied == Applied::Stale {
                continue;
            }

            if self
                .in_flight
                .get(&ticket.schema)
                .is_some_and(|(current, _)| *current == ticket)
            {
                self.in_flight.remove(&ticket.schema);
            }
            self.persist().await;

            info!(schema = %ticket.schema, ?applied, "Upload finished");
            return Some(SessionEvent {
                schema: ticket.schema,
                applied,
            });
        }
        None
    }

    /// Apply completions until no run is in flight
    pub async fn wait_all(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_outcome().await {
            events.push(event);
        }
        events
    }

    fn track(&mut self, ticket: Ticket, handle: TaskHandle) {
        if let Some((previous, abort)) = self
            .in_flight
            .insert(ticket.schema, (ticket, handle.abort_handle()))
        {
            debug!(
                schema = %ticket.schema,
                superseded = previous.generation,
                "Aborting superseded run"
            );
            abort.abort();
        }

        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = handle.join().await;
            // The session may be gone already
            let _ = completion_tx.send(Completion { ticket, outcome }).await;
        });
    }

    fn fail_interrupted(&mut self) -> bool {
        let interrupted: Vec<SchemaId> = self
            .state
            .slots()
            .filter(|(_, slot)| {
                matches!(
                    slot.status,
                    Some(UploadStatus::Pending | UploadStatus::Processing)
                )
            })
            .map(|(schema, _)| schema)
            .collect();

        for &schema in &interrupted {
            warn!(%schema, "Run from a previous session never finished");
            let ticket = Ticket {
                schema,
                generation: self.state.slot(schema).generation(),
            };
            self.state
                .apply(&ticket, DispatchOutcome::failure(INTERRUPTED_REASON));
        }
        !interrupted.is_empty()
    }

    async fn fail_unread(
        &mut self,
        schema: SchemaId,
        path: &std::path::Path,
        error: UploadError,
    ) -> Ticket {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        warn!(%schema, path = %path.display(), %error, "Could not read upload");

        if let Some((_, abort)) = self.in_flight.remove(&schema) {
            abort.abort();
        }
        let ticket = self.state.begin(schema, FileRef::new(name, 0));
        self.state
            .apply(&ticket, DispatchOutcome::failure(error.to_string()));

        self.persist().await;
        ticket
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.state.snapshot()).await {
            warn!(error = %e, "Failed to save session snapshot");
        }
    }
}
