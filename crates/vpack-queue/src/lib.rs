//! Redis Streams job queue with a dead letter queue and progress pub/sub.

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{PackageVideoJob, QueueJob};
pub use progress::{ProgressChannel, ProgressEvent, ProgressUpdate};
pub use queue::{JobQueue, QueueConfig, QueueDepth};
