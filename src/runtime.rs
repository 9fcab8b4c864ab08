//! RX/TX worker threads and their runtime configuration.

pub mod manager;
pub mod rt;

pub use manager::{ManagerError, RxCallback, ThreadManager, TrafficCounts, WorkerConfig};
