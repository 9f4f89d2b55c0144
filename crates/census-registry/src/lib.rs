//! zk-Census Registry: census lifecycle and the registration pipeline.
//!
//! The nullifier ledger is the only source of truth for registrations.
//! Accumulator trees, census counters, registration records and the
//! statistics projection are all derived from it, and the [`Reconciler`]
//! replays whatever a crash left behind.
//!
//! Lock order, everywhere: census commit lock (the tree), then the
//! per-census registry write lock.

pub mod accumulators;
pub mod pipeline;
pub mod projection;
pub mod publisher;
pub mod reconciler;
pub mod registry;
pub mod service;

pub use accumulators::{AccumulatorSet, CensusTree};
pub use pipeline::{CompletionReport, RegistrationPipeline, SubmissionReceipt};
pub use projection::StatsProjection;
pub use publisher::{LeafSnapshot, RootPublisher};
pub use reconciler::{ReconcileReport, Reconciler, WorkerHandle};
pub use registry::CensusRegistry;
pub use service::{AuditReport, CensusService, HealthReport, ServiceConfig, Stores};
