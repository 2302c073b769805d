//! Publishing aggregated records to the document store.

use thiserror::Error;

pub mod notify;
pub mod publisher;
pub mod store;
pub mod wire;

pub use notify::{notify_best_effort, Notifier, TopicNotifier, UpdateNotice, UPDATES_TOPIC};
pub use publisher::{PartitionOutcome, PublishedRecord, Publisher};
pub use store::{DocumentStore, DocumentWrite, MemoryDocumentStore, RestDocumentStore, WriteMode};
pub use wire::{FieldKind, FieldSchema, Fields, WireValue};

pub const CRATE_NAME: &str = "pacscope-publish";

pub const ORGANIZATIONS_COLLECTION: &str = "companies";
pub const CANDIDATES_COLLECTION: &str = "candidates";
pub const METADATA_COLLECTION: &str = "metadata";
pub const ORGANIZATION_METADATA_ID: &str = "lastUpdate";
pub const CANDIDATE_METADATA_ID: &str = "candidateLastUpdate";

/// Field every published record carries; stale cleanup filters on it.
pub const PARTITION_FIELD: &str = "partition";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("record could not be encoded: {0}")]
    Encode(String),
    #[error("document store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("document store rejected {operation} with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("unexpected document store response: {0}")]
    Decode(String),
}
