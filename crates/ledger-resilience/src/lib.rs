pub mod backoff;
pub mod circuit_breaker;
pub mod token_bucket;

pub use backoff::{backoff_with_jitter, retry_with_jitter};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use token_bucket::{Clock, MonotonicClock, RateLimiter, Sleeper, StdSleeper, TokenBucket};
