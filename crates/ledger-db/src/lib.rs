pub mod health;
pub mod pool;
pub mod retry;
pub mod session;

pub use health::{HealthProbe, HealthStatus};
pub use pool::{build_pool, PoolConfig};
pub use retry::execute_with_retry;
pub use session::Session;
