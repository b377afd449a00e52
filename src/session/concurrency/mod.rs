//! Execution and write-concurrency primitives shared by sessions.

pub mod lane;
pub mod semaphore;

pub use lane::{LaneError, SerialLane};
pub use semaphore::BinarySemaphore;
