//! Local persistence for annotation records.
//!
//! The local files are the durability guarantee of the service: a save is
//! successful exactly when [`PartitionStore::put`] returns `Ok`. Everything
//! here is synchronous; async callers should run it on a blocking thread.

pub mod assignments;
pub mod atomic;
mod document;
pub mod error;
pub mod partition;
pub mod registry;
pub mod sweep;

pub use assignments::AssignmentBook;
pub use error::StoreError;
pub use partition::{PartitionPaths, PartitionStore, PutOutcome, SweepReport};
pub use registry::WorkerRegistry;
