//! Batch execution: strategies, result slots, reports, and the runner itself

pub mod executor;
pub mod report;
pub mod slot;
pub mod types;

pub use executor::*;
pub use report::*;
pub use slot::ResultSlot;
pub use types::*;
