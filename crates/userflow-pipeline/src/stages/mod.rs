//! The four event-driven pipeline stages
//!
//! ```text
//! object created ─▶ ingest ─▶ topic ─▶ transform ─▶ topic ─▶ persist ─▶ store
//!                                                                       │
//!                                        fanout topic ◀─ fanout ◀─ change feed
//! ```
//!
//! Each stage is built once from its resolved config and a set of adapters,
//! then handles any number of trigger events. Ingest, persist and fanout
//! isolate failures per item and report them in their summary; transform
//! fails the whole invocation.

pub mod fanout;
pub mod ingest;
pub mod persist;
pub mod transform;

pub use fanout::{FanoutFailure, FanoutStage, FanoutSummary};
pub use ingest::{IngestOutcome, IngestStage, IngestSummary};
pub use persist::{PersistStage, PersistenceOutcome, RecordFailure};
pub use transform::{TransformError, TransformStage, TransformSummary};
