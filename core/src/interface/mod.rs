//! Data exchanged with ingest and output collaborators.

pub mod airport;
pub mod report;
pub mod state_vector;

pub use airport::{Airport, AirportLookup, AirportTable};
pub use report::TrajectoryReport;
pub use state_vector::{Identity, LoadedSamples, RawStateVectorSample, StateVectorTable};
