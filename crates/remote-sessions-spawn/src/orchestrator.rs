//! Single spawn-or-resume orchestration.

use std::sync::Arc;

use remote_sessions_core::{
    LifecycleConfig, ResolveBudget, SessionId, SessionStore, SpawnGateway, SpawnOutcome,
    SpawnRequest, is_provisional, now_millis, provisional_pid,
};

use crate::resolve::{AttemptCallback, resolve};

/// Broad failure category, for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Something went wrong on the way or on the other side; may be retried.
    Internal,
    /// The user must consent before the request can succeed.
    NeedsApproval,
    /// Retrying will not help.
    Terminal,
}

/// Spawn error.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Remote spawn failed: {message}")]
    Remote { message: String },
    #[error("Session could not be revived: {message}")]
    RevivalFailed { message: String },
    #[error("Directory {directory} does not exist and needs approval to be created")]
    ApprovalRequired { directory: String },
    #[error("Spawned session on machine {machine_id} did not appear after {attempts} attempts")]
    ResolutionExhausted { machine_id: String, attempts: u32 },
}

impl SpawnError {
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Remote { .. } => ErrorCategory::Internal,
            Self::ApprovalRequired { .. } => ErrorCategory::NeedsApproval,
            Self::RevivalFailed { .. } | Self::ResolutionExhausted { .. } => {
                ErrorCategory::Terminal
            }
        }
    }

    /// Whether re-sending the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Spawns or resumes one session and turns whatever the daemon answered
/// into a permanent session id.
pub struct SpawnOrchestrator<G, S>
where
    G: SpawnGateway,
    S: SessionStore,
{
    gateway: Arc<G>,
    store: Arc<S>,
    confirmed: ResolveBudget,
    optimistic: ResolveBudget,
}

impl<G, S> Clone for SpawnOrchestrator<G, S>
where
    G: SpawnGateway,
    S: SessionStore,
{
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            store: Arc::clone(&self.store),
            confirmed: self.confirmed,
            optimistic: self.optimistic,
        }
    }
}

impl<G, S> SpawnOrchestrator<G, S>
where
    G: SpawnGateway,
    S: SessionStore,
{
    /// Create an orchestrator with the default resolution budgets.
    #[must_use]
    pub fn new(gateway: Arc<G>, store: Arc<S>) -> Self {
        Self::with_config(gateway, store, &LifecycleConfig::default())
    }

    /// Create an orchestrator with budgets taken from `config`.
    #[must_use]
    pub fn with_config(gateway: Arc<G>, store: Arc<S>, config: &LifecycleConfig) -> Self {
        Self {
            gateway,
            store,
            confirmed: config.confirmed_resolution,
            optimistic: config.optimistic_resolution,
        }
    }

    /// Spawn or resume a session.
    ///
    /// # Errors
    /// Returns error if the daemon refused, needs approval, could not revive
    /// the agent, or the new session never became visible.
    pub async fn spawn(&self, request: SpawnRequest) -> Result<SessionId, SpawnError> {
        self.spawn_with_progress(request, None).await
    }

    /// Spawn or resume a session, reporting resolution rounds to `on_attempt`.
    ///
    /// # Errors
    /// See [`Self::spawn`].
    pub async fn spawn_with_progress(
        &self,
        request: SpawnRequest,
        on_attempt: Option<&AttemptCallback>,
    ) -> Result<SessionId, SpawnError> {
        let since_ms = now_millis();

        let outcome = match self.gateway.spawn_or_resume(&request).await {
            Ok(outcome) => outcome,
            Err(e) => SpawnOutcome::Error {
                message: e.to_string(),
                code: None,
            },
        };

        let revival_failed = outcome.is_revival_failure();
        let (session_id, resumed_from) = match outcome {
            SpawnOutcome::Success {
                session_id,
                resumed_from,
            } => (session_id, resumed_from),
            SpawnOutcome::Error { message, .. } if revival_failed => {
                return Err(SpawnError::RevivalFailed { message });
            }
            SpawnOutcome::Error { message, .. } => {
                return Err(SpawnError::Remote { message });
            }
            SpawnOutcome::ApprovalRequired { directory } => {
                return Err(SpawnError::ApprovalRequired { directory });
            }
        };

        let session_id = match session_id {
            Some(id) if !is_provisional(&id) => id,
            provisional => {
                let budget = match &provisional {
                    Some(id) => {
                        tracing::info!(
                            machine_id = %request.machine_id,
                            pid = ?provisional_pid(id),
                            "Daemon returned a provisional id, resolving"
                        );
                        self.confirmed
                    }
                    None => {
                        tracing::info!(
                            machine_id = %request.machine_id,
                            "Spawn acknowledged without a session id, resolving"
                        );
                        self.optimistic
                    }
                };
                resolve(
                    self.store.as_ref(),
                    &request.machine_id,
                    since_ms,
                    budget,
                    on_attempt,
                )
                .await
                .ok_or_else(|| SpawnError::ResolutionExhausted {
                    machine_id: request.machine_id.clone(),
                    attempts: budget.max_attempts,
                })?
            }
        };

        if let Some(old_id) = resumed_from {
            if let Err(e) = self.store.mark_superseded(&old_id, &session_id).await {
                tracing::warn!(
                    old_session_id = %old_id,
                    session_id = %session_id,
                    "Failed to record supersession: {e}"
                );
            }
        }

        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use remote_sessions_core::{GatewayError, Session, SessionMetadata, StoreError};
    use tokio::time::Instant;
    use tokio_test::assert_ok;

    use super::*;
    use crate::storage::MemoryStore;

    struct FixedGateway {
        reply: Mutex<Option<Result<SpawnOutcome, GatewayError>>>,
        calls: AtomicU32,
    }

    impl FixedGateway {
        fn replying(reply: Result<SpawnOutcome, GatewayError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SpawnGateway for FixedGateway {
        async fn spawn_or_resume(
            &self,
            _request: &SpawnRequest,
        ) -> Result<SpawnOutcome, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(GatewayError::Network("no reply scripted".into())))
        }
    }

    /// Memory store whose session appears on the nth query.
    struct AppearsOnQuery {
        inner: MemoryStore,
        session: Mutex<Option<Session>>,
        appear_on: u32,
        queries: AtomicU32,
        fail_supersede: bool,
    }

    impl AppearsOnQuery {
        fn new(session: Option<Session>, appear_on: u32) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new(),
                session: Mutex::new(session),
                appear_on,
                queries: AtomicU32::new(0),
                fail_supersede: false,
            })
        }
    }

    #[async_trait]
    impl SessionStore for AppearsOnQuery {
        async fn sessions_created_since(
            &self,
            machine_id: &str,
            since_ms: i64,
        ) -> Result<Vec<Session>, StoreError> {
            let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.appear_on {
                if let Some(mut session) = self.session.lock().unwrap().take() {
                    session.created_at = now_millis();
                    self.inner.insert(session)?;
                }
            }
            self.inner.sessions_created_since(machine_id, since_ms).await
        }

        async fn mark_superseded(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
            if self.fail_supersede {
                return Err(StoreError::Internal("write rejected".into()));
            }
            self.inner.mark_superseded(old_id, new_id).await
        }
    }

    fn remote_session(id: &str, machine: &str) -> Session {
        Session::new(
            id,
            SessionMetadata {
                machine_id: Some(machine.into()),
                path: Some("/home/x".into()),
                ..SessionMetadata::default()
            },
            0,
        )
    }

    fn success(session_id: Option<&str>, resumed_from: Option<&str>) -> SpawnOutcome {
        SpawnOutcome::Success {
            session_id: session_id.map(Into::into),
            resumed_from: resumed_from.map(Into::into),
        }
    }

    fn request() -> SpawnRequest {
        SpawnRequest::new("m1", "/home/x", "claude")
    }

    #[tokio::test]
    async fn test_permanent_id_returned_directly() {
        let gateway = FixedGateway::replying(Ok(success(Some("sess-1"), None)));
        let store = AppearsOnQuery::new(None, 1);
        let orchestrator = SpawnOrchestrator::new(gateway, Arc::clone(&store));

        let id = assert_ok!(orchestrator.spawn(request()).await);

        assert_eq!(id, "sess-1");
        assert_eq!(store.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisional_id_resolved_on_third_attempt() {
        let gateway = FixedGateway::replying(Ok(success(Some("pid-1234"), None)));
        let store = AppearsOnQuery::new(Some(remote_session("sess-abc", "m1")), 3);
        let orchestrator = SpawnOrchestrator::new(gateway, Arc::clone(&store));
        let rounds = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&rounds);
        let cb = move |n: u32, max: u32| seen.lock().unwrap().push((n, max));
        let started = Instant::now();

        let id = orchestrator
            .spawn_with_progress(request(), Some(&cb))
            .await
            .unwrap();

        assert_eq!(id, "sess-abc");
        assert_eq!(store.queries.load(Ordering::SeqCst), 3);
        assert_eq!(*rounds.lock().unwrap(), [(1, 24), (2, 24), (3, 24)]);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_id_uses_optimistic_budget() {
        let gateway = FixedGateway::replying(Ok(success(None, None)));
        let store = AppearsOnQuery::new(None, 1);
        let orchestrator = SpawnOrchestrator::new(gateway, Arc::clone(&store));
        let started = Instant::now();

        let err = orchestrator.spawn(request()).await.unwrap_err();

        assert!(matches!(
            err,
            SpawnError::ResolutionExhausted { attempts: 10, .. }
        ));
        assert!(!err.is_retryable());
        assert_eq!(store.queries.load(Ordering::SeqCst), 10);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisional_exhaustion_uses_confirmed_budget() {
        let gateway = FixedGateway::replying(Ok(success(Some("pid-7"), None)));
        let store = AppearsOnQuery::new(None, 1);
        let orchestrator = SpawnOrchestrator::new(gateway, Arc::clone(&store));

        let err = orchestrator.spawn(request()).await.unwrap_err();

        assert!(matches!(
            err,
            SpawnError::ResolutionExhausted { attempts: 24, .. }
        ));
        assert_eq!(store.queries.load(Ordering::SeqCst), 24);
    }

    #[tokio::test]
    async fn test_remote_error_is_retryable() {
        let gateway = FixedGateway::replying(Ok(SpawnOutcome::Error {
            message: "daemon busy".into(),
            code: None,
        }));
        let orchestrator = SpawnOrchestrator::new(gateway, AppearsOnQuery::new(None, 1));

        let err = orchestrator.spawn(request()).await.unwrap_err();

        assert!(matches!(&err, SpawnError::Remote { message } if message == "daemon busy"));
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_failure_is_remote_error() {
        let gateway = FixedGateway::replying(Err(GatewayError::Network("socket closed".into())));
        let orchestrator = SpawnOrchestrator::new(gateway, AppearsOnQuery::new(None, 1));

        let err = orchestrator.spawn(request()).await.unwrap_err();

        assert!(matches!(&err, SpawnError::Remote { message } if message.contains("socket closed")));
    }

    #[tokio::test]
    async fn test_revival_failure_is_terminal() {
        let gateway = FixedGateway::replying(Ok(SpawnOutcome::Error {
            message: "agent exited".into(),
            code: Some("session_revival_failed".into()),
        }));
        let orchestrator = SpawnOrchestrator::new(gateway, AppearsOnQuery::new(None, 1));

        let err = orchestrator.spawn(request().resume("agent-1")).await.unwrap_err();

        assert!(matches!(err, SpawnError::RevivalFailed { .. }));
        assert_eq!(err.category(), ErrorCategory::Terminal);
    }

    #[tokio::test]
    async fn test_approval_required_is_not_auto_approved() {
        let gateway = FixedGateway::replying(Ok(SpawnOutcome::ApprovalRequired {
            directory: "/home/x/new".into(),
        }));
        let orchestrator = SpawnOrchestrator::new(Arc::clone(&gateway), AppearsOnQuery::new(None, 1));

        let err = orchestrator.spawn(request()).await.unwrap_err();

        assert!(matches!(&err, SpawnError::ApprovalRequired { directory } if directory == "/home/x/new"));
        assert_eq!(err.category(), ErrorCategory::NeedsApproval);
        assert!(!err.is_retryable());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resumed_from_writes_supersession() {
        let gateway = FixedGateway::replying(Ok(success(Some("sess-new"), Some("sess-old"))));
        let store = AppearsOnQuery::new(None, 1);
        store.inner.insert(remote_session("sess-old", "m1")).unwrap();
        store.inner.insert(remote_session("sess-new", "m1")).unwrap();
        let orchestrator = SpawnOrchestrator::new(gateway, Arc::clone(&store));

        let id = orchestrator.spawn(request().resume("agent-1")).await.unwrap();

        assert_eq!(id, "sess-new");
        let old = store.inner.get("sess-old").unwrap().unwrap();
        let new = store.inner.get("sess-new").unwrap().unwrap();
        assert_eq!(old.superseded_by.as_deref(), Some("sess-new"));
        assert_eq!(new.supersedes.as_deref(), Some("sess-old"));
    }

    #[tokio::test]
    async fn test_supersession_failure_does_not_fail_spawn() {
        let gateway = FixedGateway::replying(Ok(success(Some("sess-new"), Some("sess-old"))));
        let store = Arc::new(AppearsOnQuery {
            inner: MemoryStore::new(),
            session: Mutex::new(None),
            appear_on: 1,
            queries: AtomicU32::new(0),
            fail_supersede: true,
        });
        let orchestrator = SpawnOrchestrator::new(gateway, store);

        let id = orchestrator.spawn(request().resume("agent-1")).await.unwrap();

        assert_eq!(id, "sess-new");
    }

    #[tokio::test]
    async fn test_custom_budgets_from_config() {
        let config = LifecycleConfig::from_json(
            r#"{"optimisticResolution":{"intervalMs":1,"maxAttempts":2}}"#,
        )
        .unwrap();
        let gateway = FixedGateway::replying(Ok(success(None, None)));
        let store = AppearsOnQuery::new(None, 1);
        let orchestrator = SpawnOrchestrator::with_config(gateway, Arc::clone(&store), &config);

        let err = orchestrator.spawn(request()).await.unwrap_err();

        assert!(matches!(err, SpawnError::ResolutionExhausted { attempts: 2, .. }));
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }
}
