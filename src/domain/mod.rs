//! Domain types for deployment profiles and classification results.
//!
//! A deployment is one of two enumerated variants. Everything that differs
//! between them (validation rules, input size, threshold, labels, landing
//! page) lives in a [`DeploymentProfile`] rather than in separate handlers.

pub mod classification;
pub mod profile;

pub use classification::{Classification, Confidence, LabelPair};
pub use profile::{ColorPolicy, DeploymentProfile, Variant};
