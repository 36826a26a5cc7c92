pub mod dequeue;
pub mod enqueue;
pub mod envelope;
pub mod metrics;
pub mod progress;
pub mod queues;
pub mod retry;
pub mod sse;

pub use dequeue::PriorityPuller;
pub use enqueue::{dead_letter, enqueue, requeue_for_retry};
pub use envelope::{build_envelope, NewJob, ENVELOPE_SCHEMA_VERSION};
pub use progress::{current_snapshot, write_snapshot};
pub use queues::Queues;
pub use retry::retry_delay;
pub use sse::{stream_events, SseEvent};
