//! Spawn orchestration for remote agent sessions.
//!
//! Provides:
//! - `SpawnOrchestrator` - Spawn or resume one session and pin down its id
//! - `resolve` - Bounded polling for a newly created session
//! - In-memory store and machine registry (feature: memory)

pub mod orchestrator;
pub mod resolve;
pub mod storage;

pub use orchestrator::{ErrorCategory, SpawnError, SpawnOrchestrator};
pub use resolve::{AttemptCallback, resolve};
