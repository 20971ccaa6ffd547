pub mod aggregator;
pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod harness;
pub mod judge0;
pub mod languages;
pub mod recorder;
pub mod sandbox;
pub mod service;
pub mod splitter;
pub mod store;

#[cfg(test)]
mod stub;

pub use error::{GradingError, StoreError};
pub use service::{AssignmentSpec, GradingService};
