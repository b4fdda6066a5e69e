//! Evidence intake: storage backends, ingestion and validation requests

pub mod backends;
pub mod ingest;
pub mod queue;

pub use backends::{
    HttpImageStore, HttpObjectStore, ImageStore, ImageUpload, MemoryImageStore,
    MemoryObjectStore, ObjectStore, ObjectUpload, UploadMeta,
};
pub use ingest::{EvidenceIngestor, EvidenceMeta, UploadedFile, ValidationOutcome};
pub use queue::{NatsValidationQueue, ValidationQueue, ValidationRequest, DEFAULT_VALIDATION_SUBJECT};
