//! Queue execution over a mutable FIFO backlog

pub mod executor;
pub mod work_queue;

pub use executor::*;
pub use work_queue::*;
