//! zk-Census Core: fundamental types, errors, and configuration for the
//! zk-Census registration protocol.

pub mod census_state;
pub mod config;
pub mod error;
pub mod types;

pub use census_state::{CensusEvent, CensusState, CensusStateMachine};
pub use config::{PipelineConfig, PublicationPolicy};
pub use error::CensusError;
pub use types::{
    AgeRange, Census, CensusConfig, CensusId, CensusStatistics, Continent, GlobalStats,
    NullifierEntry, NullifierHash, RegistrationRecord, RegistrationStatus, BUCKET_COUNT,
    ZERO_ROOT,
};
