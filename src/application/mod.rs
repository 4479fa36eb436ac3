//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod diagnosis;
mod recommendation;

pub use diagnosis::{DiagnosisContext, DiagnosisService};
pub use recommendation::RecommendationService;
