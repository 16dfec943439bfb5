//! Render scheduler runner -- owns the unit pools and hands out tasks.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, locking, and accessor methods
//! - `scheduling`: the decision tree and task construction
//! - `completion`: retiring the resources of finished tasks

mod completion;
mod core;
mod scheduling;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
