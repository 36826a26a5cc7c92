pub mod cancellation;
pub mod driver;
pub mod extract;
pub mod gdpr;
pub mod render;
pub mod repository;
pub mod state_machine;
pub mod timeout;

pub use cancellation::checkpoint;
pub use driver::{run, JobContext};
pub use extract::{extract_tables, ExtractedTable};
pub use gdpr::{execute_deletion, initiate_deletion, sweep_stale_deletions};
pub use render::render_previews;
pub use repository::DocumentRepository;
pub use state_machine::{transition, Effect, JobEvent};
pub use timeout::TimeoutManager;
