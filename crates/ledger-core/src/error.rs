use std::time::Duration;

/// The error taxonomy shared by every component in the job fabric (spec §7).
///
/// Leaf clients (object store, relational gateway, OCR providers) surface
/// concrete kinds; the dispatcher translates `is_retriable()` errors into
/// rescheduling and everything else into dead-letter routing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("circuit open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Option<Duration> },

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("budget exceeded: estimate {estimate_cents} cents > ceiling {ceiling_cents} cents")]
    BudgetExceeded {
        estimate_cents: i64,
        ceiling_cents: i64,
    },

    #[error("queue halted by emergency stop")]
    QueueHalted,

    #[error("job cancelled")]
    JobCancelled,

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Short symbol surfaced to callers alongside a message and request id (spec §7).
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Error::Throttled(_) => "THROTTLED",
            Error::Transient(_) => "TRANSIENT",
            Error::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Error::QueueHalted => "QUEUE_HALTED",
            Error::JobCancelled => "JOB_CANCELLED",
            Error::Fatal(_) => "FATAL",
        }
    }

    /// Whether the dispatcher should reschedule the envelope on this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Throttled(_) | Error::Transient(_))
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Error::Fatal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
