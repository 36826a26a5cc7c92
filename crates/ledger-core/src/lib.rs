pub mod config;
pub mod error;
pub mod model;

pub use config::Settings;
pub use error::{Error, Result};
