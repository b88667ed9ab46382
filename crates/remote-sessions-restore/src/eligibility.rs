//! Pre-flight checks run before any remote call.

use remote_sessions_core::{AgentFlavor, MachineRegistry, Session, SessionId, SpawnRequest};
use thiserror::Error;

/// Why an archived session cannot be restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("{} sessions cannot be resumed", .0.as_str())]
    UnsupportedFlavor(AgentFlavor),
    #[error("Session has no machine")]
    MissingMachine,
    #[error("Session has no working directory")]
    MissingPath,
    #[error("Session has no agent session to resume")]
    MissingAgentSession,
    #[error("Session is already active")]
    AlreadyActive,
    #[error("Session was already continued in {0}")]
    AlreadySuperseded(SessionId),
    #[error("Machine {0} is offline")]
    MachineOffline(String),
}

/// Build the resume request for `session`, or explain why it is ineligible.
///
/// Only the machine check touches the registry; nothing here reaches the
/// remote side.
///
/// # Errors
/// Returns the first failed check.
pub async fn resume_request<M>(session: &Session, registry: &M) -> Result<SpawnRequest, Ineligible>
where
    M: MachineRegistry + ?Sized,
{
    let meta = &session.metadata;
    if !meta.flavor.supports_resume() {
        return Err(Ineligible::UnsupportedFlavor(meta.flavor));
    }
    if session.active {
        return Err(Ineligible::AlreadyActive);
    }
    if let Some(successor) = &session.superseded_by {
        return Err(Ineligible::AlreadySuperseded(successor.clone()));
    }
    let machine_id = nonempty(meta.machine_id.as_deref()).ok_or(Ineligible::MissingMachine)?;
    let path = nonempty(meta.path.as_deref()).ok_or(Ineligible::MissingPath)?;
    let agent_session =
        nonempty(meta.prior_agent_session_id.as_deref()).ok_or(Ineligible::MissingAgentSession)?;

    if !registry.is_online(machine_id).await {
        return Err(Ineligible::MachineOffline(machine_id.to_string()));
    }

    Ok(SpawnRequest::new(machine_id, path, meta.flavor.as_str()).resume(agent_session))
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
