//! Application services
//!
//! Stateless orchestrators over the overlay: publishing files into the
//! index and resolving searches against it.

pub mod indexing;
pub mod query;

pub use indexing::{IndexingService, PublishOutcome, WriteOutcome};
pub use query::QueryService;
