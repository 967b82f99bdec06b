//! Adaptive streaming packaging worker.
//!
//! Consumes packaging jobs from the queue, encodes the rendition ladder
//! under a process-wide concurrency cap, segments the result into DASH/HLS
//! and publishes everything to object storage.

pub mod config;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod lock;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod workspace;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use fanout::{plan_items, run_items, FanOutReport, ItemOutcome, WorkItem};
pub use lock::{LockManager, OwnershipLock};
pub use logging::JobLogger;
pub use metadata::{AssetRecord, MetadataClient};
pub use pipeline::{run_job, JobOutcome, PipelineContext};
pub use workspace::JobWorkspace;
