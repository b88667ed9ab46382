//! Core types for remote agent session lifecycle control.
//!
//! This crate provides the shared building blocks:
//! - `Session` / `SessionMetadata` - The slice of the session model this core touches
//! - `SpawnRequest` / `SpawnOutcome` - Remote spawn/resume procedure types
//! - `is_provisional` - Provisional identifier classifier
//! - `RestoreResult` / `BulkProgress` - Bulk restore results and aggregate
//! - `LifecycleConfig` - Tunable budgets and limits
//! - Gateway, store, registry and notifier traits

pub mod config;
pub mod ids;
pub mod restore;
pub mod session;
pub mod spawn;
pub mod traits;

pub use config::{ConfigError, LifecycleConfig, ResolveBudget, RestoreSettings};
pub use ids::{is_provisional, provisional_pid};
pub use restore::{BulkProgress, RestoreOutcome, RestoreResult};
pub use session::{AgentFlavor, Machine, MachineId, Session, SessionId, SessionMetadata, now_millis};
pub use spawn::{SpawnOutcome, SpawnRequest};
pub use traits::{
    GatewayError, MachineRegistry, NoopNotifier, RestoreNotifier, SessionStore, SpawnGateway,
    StoreError,
};
