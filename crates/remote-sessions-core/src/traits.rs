//! Traits for the external collaborators: remote gateway, session store,
//! machine registry and presentation notifications.

use async_trait::async_trait;
use thiserror::Error;

use crate::restore::RestoreResult;
use crate::session::{Session, SessionId};
use crate::spawn::{SpawnOutcome, SpawnRequest};

/// Transport-level failure reaching the remote procedure.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Not authenticated: {0}")]
    Unauthorized(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Remote spawn/resume procedure, reached over the authenticated channel.
#[async_trait]
pub trait SpawnGateway: Send + Sync {
    /// Ask the machine's daemon to spawn or resume an agent session.
    async fn spawn_or_resume(&self, request: &SpawnRequest) -> Result<SpawnOutcome, GatewayError>;
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session {id} is already superseded by {successor}")]
    AlreadySuperseded { id: SessionId, successor: SessionId },
    #[error("Storage error: {0}")]
    Internal(String),
}

/// The slice of the local session store this core depends on.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Sessions on `machine_id` created at or after `since_ms`.
    async fn sessions_created_since(
        &self,
        machine_id: &str,
        since_ms: i64,
    ) -> Result<Vec<Session>, StoreError>;

    /// Record that `new_id` continues `old_id`.
    ///
    /// Implementations write `old.superseded_by` and `new.supersedes`
    /// atomically.
    async fn mark_superseded(&self, old_id: &str, new_id: &str) -> Result<(), StoreError>;
}

/// Machine liveness, derived from daemon heartbeats.
#[async_trait]
pub trait MachineRegistry: Send + Sync {
    /// Whether the machine is currently online.
    async fn is_online(&self, machine_id: &str) -> bool;
}

/// Hook for the presentation layer to surface bulk-restore events.
pub trait RestoreNotifier: Send + Sync {
    /// Called once per restore run with every unit whose agent could not
    /// be revived.
    fn revival_failed(&self, results: &[RestoreResult]);
}

/// Notifier that drops every notification.
#[derive(Debug, Default, Clone)]
pub struct NoopNotifier;

impl RestoreNotifier for NoopNotifier {
    fn revival_failed(&self, _results: &[RestoreResult]) {}
}
