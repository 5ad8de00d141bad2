//! Userflow Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! An event-driven pipeline that moves user records from uploaded CSV files
//! into a keyed store and announces every change.
//!
//! # Overview
//!
//! - **Ingest** (`stages::ingest`): object-created notification → raw file text on a topic
//! - **Transform** (`stages::transform`): tabular text → normalized JSON record batches
//! - **Persist** (`stages::persist`): record batches → idempotent upserts by `id`
//! - **Fanout** (`stages::fanout`): store change feed → one notification per change
//! - **Upload** (`upload`): put a file into the upload bucket to start the chain
//!
//! Stages depend only on the [`storage::ObjectSource`], [`messaging::MessagePublisher`]
//! and [`store::KeyedStore`] traits. AWS implementations back deployed runs;
//! in-memory implementations back [`simulate`] and the tests.

pub mod aws;
pub mod config;
pub mod events;
pub mod messaging;
pub mod parser;
pub mod runner;
pub mod simulate;
pub mod stages;
pub mod storage;
pub mod store;
pub mod upload;

// Re-export commonly used types
pub use config::{ConfigError, ConfigSource, MalformedRowPolicy};
pub use events::{PipelineEvent, StageKind};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Userflow - move uploaded user files into the user store
#[derive(Parser, Debug)]
#[command(name = "userflow")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one stage against a trigger event
    Run {
        /// Stage to run
        #[arg(value_enum)]
        stage: StageKind,

        /// Event JSON file (reads stdin when omitted)
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Upload a user file to the upload bucket
    Upload {
        /// File to upload
        file: PathBuf,

        /// Target bucket (defaults to S3_BUCKET / aws.s3.bucket)
        #[arg(short, long)]
        bucket: Option<String>,

        /// Content type of the stored object
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Run a file through every stage locally, without AWS
    Simulate {
        /// CSV file to process
        file: PathBuf,

        /// Malformed row handling: fail-batch or skip-row
        /// (defaults to TRANSFORM_MALFORMED_ROWS / transform.malformed-rows)
        #[arg(long)]
        malformed_rows: Option<MalformedRowPolicy>,
    },
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
