//! Batch execution over a fixed item list
//!
//! Items are cut into chunks of `batch_size`; up to `concurrency` chunks run
//! per wave and results keep input order.

pub mod executor;
pub mod types;

pub use executor::*;
pub use types::*;
