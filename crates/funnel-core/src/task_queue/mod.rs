//! Bounded-concurrency task execution.
//!
//! `CapacityLimiter` caps how many tasks run at once, `OrderedTaskQueue`
//! starts tasks as they are enqueued and hands results back in enqueue order,
//! and `limiter` maps a payload list through both.

mod batch;
mod capacity;
mod ordered;

pub use batch::limiter;
pub use capacity::CapacityLimiter;
pub use ordered::OrderedTaskQueue;

#[cfg(test)]
mod tests;
