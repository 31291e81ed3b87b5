//! # validate-tabular Library
//!
//! Validates tabular uploads (CSV and spreadsheet workbooks) for four fixed record schemas,
//! RTIS, SNT, FSD and CMS, before the data is handed downstream.
//!
//! - [`parser`] turns raw bytes into ordered [`Record`]s
//! - [`catalog`] and [`validator`] decide whether records conform to a schema
//! - [`dispatcher`] runs validations on isolated tokio tasks
//! - [`aggregator`] and [`session`] track the four dataset slots and their readiness

pub mod aggregator;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod output;
pub mod parser;
pub mod record;
pub mod schema;
pub mod session;
pub mod snapshot;
pub mod validator;

pub use aggregator::{
    Applied, FileRef, Slot, StatusIndicator, Ticket, UploadState, UploadStatus,
};
pub use catalog::{FieldCheck, FieldRule, MessageStyle, SAMPLE_ROWS, SchemaRules};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use dispatcher::{
    DispatchOutcome, DispatchRequest, Dispatcher, ProcessedFile, TaskHandle, TaskState,
    WorkerMessage,
};
pub use error::{ParseError, UploadError};
pub use output::{Output, SessionReport};
pub use parser::{SourceFile, SourceFormat, parse, parse_file};
pub use record::{CellValue, Record};
pub use schema::SchemaId;
pub use session::{Completion, SessionEvent, UploadSession};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SessionSnapshot, SnapshotStore};
pub use validator::{Verdict, validate, validate_schema};
