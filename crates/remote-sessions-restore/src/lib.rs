//! Bulk restore of archived remote agent sessions.
//!
//! Provides:
//! - `RestoreController` - Batched, cancellable, timeout-bounded restore runs
//! - `resume_request` - Pre-flight eligibility checks

pub mod eligibility;
pub mod engine;

pub use eligibility::{Ineligible, resume_request};
pub use engine::{RestoreController, RestoreError};
