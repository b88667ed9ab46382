//! Bulk restore against a simulated daemon.
//!
//! Run with: cargo run -p restore-demo [config.json]
//!
//! Set `RUST_LOG=debug` to watch individual resolution rounds.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use remote_sessions_core::{
    AgentFlavor, GatewayError, LifecycleConfig, RestoreNotifier, RestoreResult, Session,
    SessionMetadata, SpawnGateway, SpawnOutcome, SpawnRequest, now_millis,
    spawn::REVIVAL_FAILED_CODE,
};
use remote_sessions_restore::RestoreController;
use remote_sessions_spawn::{
    SpawnError, SpawnOrchestrator,
    storage::{MemoryStore, StaticMachineRegistry},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Daemon stand-in. The last path component of the requested directory
/// picks the behavior.
struct SimulatedDaemon {
    store: Arc<MemoryStore>,
}

impl SimulatedDaemon {
    fn register(&self, request: &SpawnRequest) -> Result<String, GatewayError> {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(
            id.clone(),
            SessionMetadata {
                machine_id: Some(request.machine_id.clone()),
                path: Some(request.directory.clone()),
                prior_agent_session_id: request.resume_session_id.clone(),
                flavor: AgentFlavor::Claude,
                name: None,
            },
            now_millis(),
        );
        self.store
            .insert(session)
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(id)
    }

    /// Archived session being resumed, looked up by its agent handle.
    fn resumed_from(&self, request: &SpawnRequest) -> Option<String> {
        request
            .resume_session_id
            .as_deref()
            .and_then(|agent| agent.strip_prefix("agent-"))
            .map(str::to_string)
    }
}

#[async_trait]
impl SpawnGateway for SimulatedDaemon {
    async fn spawn_or_resume(&self, request: &SpawnRequest) -> Result<SpawnOutcome, GatewayError> {
        let behavior = request.directory.rsplit('/').next().unwrap_or_default();
        match behavior {
            "new-project" if !request.approved_directory_creation => {
                Ok(SpawnOutcome::ApprovalRequired {
                    directory: request.directory.clone(),
                })
            }
            "exited" => Ok(SpawnOutcome::Error {
                message: "agent process exited".into(),
                code: Some(REVIVAL_FAILED_CODE.into()),
            }),
            "broken" => Err(GatewayError::Network("connection reset".into())),
            "slow-registration" => {
                // Registration lands after the daemon's own deadline.
                let pid = 4000 + request.directory.len();
                tokio::time::sleep(Duration::from_secs(2)).await;
                self.register(request)?;
                Ok(SpawnOutcome::Success {
                    session_id: Some(format!("pid-{pid}")),
                    resumed_from: self.resumed_from(request),
                })
            }
            _ => {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let id = self.register(request)?;
                Ok(SpawnOutcome::Success {
                    session_id: Some(id),
                    resumed_from: self.resumed_from(request),
                })
            }
        }
    }
}

struct LogNotifier;

impl RestoreNotifier for LogNotifier {
    fn revival_failed(&self, results: &[RestoreResult]) {
        let names: Vec<&str> = results.iter().map(|r| r.display_name.as_str()).collect();
        tracing::warn!(
            "{} session(s) could not be revived and should be archived: {}",
            results.len(),
            names.join(", ")
        );
    }
}

fn archived(id: &str, machine: &str, dir: &str) -> Session {
    Session::new(
        id,
        SessionMetadata {
            machine_id: Some(machine.into()),
            path: Some(format!("/home/demo/{dir}")),
            prior_agent_session_id: Some(format!("agent-{id}")),
            flavor: AgentFlavor::Claude,
            name: None,
        },
        0,
    )
}

fn load_config() -> anyhow::Result<LifecycleConfig> {
    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        return Ok(LifecycleConfig::default());
    };
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    LifecycleConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let store = Arc::new(MemoryStore::new());
    let daemon = Arc::new(SimulatedDaemon {
        store: Arc::clone(&store),
    });
    let orchestrator = SpawnOrchestrator::with_config(daemon, Arc::clone(&store), &config);

    // Single spawn: the directory must be approved first.
    let request = SpawnRequest::new("laptop", "/home/demo/new-project", "claude");
    let session_id = match orchestrator.spawn(request.clone()).await {
        Err(SpawnError::ApprovalRequired { directory }) => {
            tracing::info!("Approving creation of {directory}");
            orchestrator
                .spawn(request.approve_directory_creation())
                .await?
        }
        other => other?,
    };
    tracing::info!(session_id = %session_id, "Spawned new session");

    // Bulk restore across three machines, one of them offline. Resolution
    // matches on machine and time only, so the slow registration gets a
    // machine of its own.
    let sessions = vec![
        archived("s1", "laptop", "api"),
        archived("s2", "workstation", "slow-registration"),
        archived("s3", "laptop", "exited"),
        archived("s4", "desktop", "frontend"),
        archived("s5", "laptop", "broken"),
        archived("s6", "laptop", "docs"),
    ];
    for session in &sessions {
        store.insert(session.clone())?;
    }

    let controller = RestoreController::new(
        orchestrator,
        Arc::new(StaticMachineRegistry::new(["laptop", "workstation"])),
        config.restore,
    )
    .with_notifier(Arc::new(LogNotifier));

    let mut updates = controller.progress_stream();
    let watcher = tokio::spawn(async move {
        while let Some(p) = updates.next().await {
            tracing::info!(
                "progress {}/{} ok={} failed={} timed_out={} revival_failed={} current={}",
                p.completed,
                p.total,
                p.succeeded,
                p.failed,
                p.timed_out,
                p.revival_failed,
                p.current_item.as_deref().unwrap_or("-")
            );
            if p.total > 0 && p.is_settled() && p.current_item.is_none() {
                break;
            }
        }
    });

    let results = controller.restore(sessions).await?;
    watcher.await?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
