//! S3-compatible object storage for source inputs and published outputs.

pub mod client;
pub mod error;
pub mod publish;

pub use client::{ObjectStore, ObjectStoreConfig};
pub use error::{StorageError, StorageResult};
pub use publish::{content_type_for, object_key, upload_dir};
