pub mod ledger;

pub use ledger::{estimate, CostLedger, StaleRecord};
