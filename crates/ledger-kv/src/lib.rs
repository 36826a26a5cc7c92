pub mod client;
pub mod durations;
pub mod emergency_stop;
pub mod keys;

pub use client::KvClient;
