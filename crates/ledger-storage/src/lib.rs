pub mod client;
pub mod validation;

pub use client::{ListPage, ObjectMetadata, ObjectStoreClient};
pub use validation::ObjectValidation;
