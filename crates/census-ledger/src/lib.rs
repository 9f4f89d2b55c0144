//! zk-Census Ledger: store abstractions behind the registration core.
//!
//! The [`NullifierLedger`] is the single arbiter of "already registered";
//! every other store is a projection that can be rebuilt from its entries.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use fs::FsSnapshotStore;
pub use memory::{
    MemoryCensusStore, MemoryNullifierLedger, MemoryRegistrationStore, MemorySnapshotStore,
};
pub use traits::{CensusStore, InsertOutcome, NullifierLedger, RegistrationStore, SnapshotStore};
