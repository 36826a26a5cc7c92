pub mod batcher;
pub mod idempotency;

pub use batcher::{AuditBatcher, AuditBatcherConfig};
pub use idempotency::idempotency_key;
