pub mod config;
pub mod error;

pub use config::{Config, ImageConfig, SchedulerConfig, WorkerConfig};
pub use error::*;
