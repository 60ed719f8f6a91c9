//! In-process collaborator implementations.
//!
//! Complete enough to run views over purely local collections and to drive
//! deterministic interleavings in tests: loads, confirmations, and remote
//! acknowledgements all stay pending until settled by hand.

mod log;
mod remote;
mod store;
mod tracker;

pub use log::{LogEntry, MemoryLog};
pub use remote::{ManualRemote, RemoteCall};
pub use store::{MemoryEntity, MemoryRecordStore};
pub use tracker::ManualTracker;
