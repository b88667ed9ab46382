//! Bulk restore controller.
//!
//! Restores many archived sessions by resuming their agents on the remote
//! machines. Work runs in sequential batches of at most
//! `RestoreSettings::concurrency` units; a batch starts only after every
//! unit of the previous one has settled. Each unit is isolated: its failure,
//! timeout or panic is recorded against that unit alone.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::{
    FutureExt,
    future::BoxFuture,
    stream::{FuturesUnordered, StreamExt},
};
use remote_sessions_core::{
    BulkProgress, MachineRegistry, NoopNotifier, RestoreNotifier, RestoreOutcome, RestoreResult,
    RestoreSettings, Session, SessionId, SessionStore, SpawnGateway, SpawnRequest,
};
use remote_sessions_spawn::{SpawnError, SpawnOrchestrator};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::eligibility::resume_request;

/// Restore controller error.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("A restore run is already in progress")]
    AlreadyRunning,
}

/// Cancellation flag and progress aggregate.
///
/// The run loop in [`RestoreController::restore`] is the only writer of
/// `progress`; callers get snapshots or watch receivers.
struct RunState {
    running: AtomicBool,
    cancelled: AtomicBool,
    progress: watch::Sender<BulkProgress>,
}

/// Clears the running flag when a run ends or its future is dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// An eligible session waiting for its batch.
struct Unit {
    index: usize,
    session_id: SessionId,
    display_name: String,
    request: SpawnRequest,
}

impl Unit {
    fn result(&self, outcome: RestoreOutcome) -> RestoreResult {
        RestoreResult::new(self.session_id.clone(), self.display_name.clone(), outcome)
    }
}

/// Drives bulk restoration of archived sessions.
pub struct RestoreController<G, S, M>
where
    G: SpawnGateway + 'static,
    S: SessionStore + 'static,
    M: MachineRegistry,
{
    orchestrator: SpawnOrchestrator<G, S>,
    registry: Arc<M>,
    settings: RestoreSettings,
    notifier: Arc<dyn RestoreNotifier>,
    state: RunState,
}

impl<G, S, M> RestoreController<G, S, M>
where
    G: SpawnGateway + 'static,
    S: SessionStore + 'static,
    M: MachineRegistry,
{
    /// Create a controller. Revival failures are only logged until a
    /// notifier is attached with [`Self::with_notifier`].
    #[must_use]
    pub fn new(
        orchestrator: SpawnOrchestrator<G, S>,
        registry: Arc<M>,
        settings: RestoreSettings,
    ) -> Self {
        let (progress, _) = watch::channel(BulkProgress::default());
        Self {
            orchestrator,
            registry,
            settings,
            notifier: Arc::new(NoopNotifier),
            state: RunState {
                running: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                progress,
            },
        }
    }

    /// Attach the presentation-layer notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn RestoreNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Snapshot of the current run's progress.
    #[must_use]
    pub fn progress(&self) -> BulkProgress {
        self.state.progress.borrow().clone()
    }

    /// Receiver notified after every published progress update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BulkProgress> {
        self.state.progress.subscribe()
    }

    /// Stream of progress snapshots, starting with the current one.
    #[must_use]
    pub fn progress_stream(&self) -> WatchStream<BulkProgress> {
        WatchStream::new(self.state.progress.subscribe())
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Whether the current run has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Stop starting new units. Units already in flight run to completion.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("Bulk restore cancellation requested");
        }
    }

    /// Clear progress and the cancellation flag for the next run.
    ///
    /// # Errors
    /// Returns error if a run is in progress.
    pub fn reset(&self) -> Result<(), RestoreError> {
        if self.is_running() {
            return Err(RestoreError::AlreadyRunning);
        }
        self.state.cancelled.store(false, Ordering::SeqCst);
        self.state.progress.send_replace(BulkProgress::default());
        Ok(())
    }

    /// Restore `sessions`, returning one result per input in input order.
    ///
    /// Ineligible sessions fail without a remote call. Cancellation is
    /// checked before each unit starts.
    ///
    /// # Errors
    /// Returns error if another run is in progress.
    pub async fn restore(&self, sessions: Vec<Session>) -> Result<Vec<RestoreResult>, RestoreError> {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return Err(RestoreError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.state.running);
        self.state.cancelled.store(false, Ordering::SeqCst);
        self.state
            .progress
            .send_replace(BulkProgress::started(sessions.len()));

        tracing::info!(
            total = sessions.len(),
            concurrency = self.settings.concurrency,
            "Starting bulk restore"
        );

        let mut slots: Vec<Option<RestoreResult>> = vec![None; sessions.len()];
        let mut units = Vec::with_capacity(sessions.len());
        for (index, session) in sessions.into_iter().enumerate() {
            match resume_request(&session, self.registry.as_ref()).await {
                Ok(request) => units.push(Unit {
                    index,
                    display_name: session.display_name(),
                    session_id: session.id,
                    request,
                }),
                Err(reason) => {
                    tracing::debug!(session_id = %session.id, "Skipping session: {reason}");
                    let result = RestoreResult::new(
                        session.id.clone(),
                        session.display_name(),
                        RestoreOutcome::Failure {
                            message: reason.to_string(),
                        },
                    );
                    self.settle(&mut slots, index, result);
                }
            }
        }

        for (batch_no, batch) in units.chunks(self.settings.concurrency.max(1)).enumerate() {
            let mut in_flight = FuturesUnordered::new();
            for unit in batch {
                if self.is_cancelled() {
                    self.settle(&mut slots, unit.index, unit.result(RestoreOutcome::Cancelled));
                    continue;
                }
                self.state
                    .progress
                    .send_modify(|p| p.current_item = Some(unit.display_name.clone()));
                in_flight.push(self.start(unit));
            }
            if in_flight.is_empty() {
                continue;
            }

            tracing::debug!(batch = batch_no + 1, units = in_flight.len(), "Restore batch started");
            while let Some((index, result)) = in_flight.next().await {
                self.settle(&mut slots, index, result);
            }
        }

        self.state.progress.send_modify(|p| p.current_item = None);
        let results: Vec<RestoreResult> = slots.into_iter().flatten().collect();

        let revival_failures: Vec<RestoreResult> = results
            .iter()
            .filter(|r| matches!(r.outcome, RestoreOutcome::RevivalFailed { .. }))
            .cloned()
            .collect();
        if !revival_failures.is_empty() {
            tracing::warn!(
                count = revival_failures.len(),
                "Some agents exited and cannot be revived"
            );
            self.notifier.revival_failed(&revival_failures);
        }

        let summary = self.progress();
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            revival_failed = summary.revival_failed,
            cancelled = summary.cancelled_remaining,
            "Bulk restore finished"
        );

        Ok(results)
    }

    /// Start one unit's spawn on its own task and race it against the unit
    /// deadline. Losing the race leaves the task running.
    fn start(&self, unit: &Unit) -> BoxFuture<'static, (usize, RestoreResult)> {
        let orchestrator = self.orchestrator.clone();
        let request = unit.request.clone();
        let handle = tokio::spawn(async move { orchestrator.spawn(request).await });

        let deadline = self.settings.unit_timeout();
        let index = unit.index;
        let session_id = unit.session_id.clone();
        let display_name = unit.display_name.clone();

        async move {
            let outcome = match tokio::time::timeout(deadline, handle).await {
                Ok(Ok(Ok(new_session_id))) => RestoreOutcome::Success { new_session_id },
                Ok(Ok(Err(SpawnError::RevivalFailed { message }))) => {
                    RestoreOutcome::RevivalFailed { message }
                }
                Ok(Ok(Err(e))) => RestoreOutcome::Failure {
                    message: e.to_string(),
                },
                Ok(Err(e)) => {
                    tracing::error!(session_id = %session_id, "Restore task failed: {e}");
                    RestoreOutcome::Failure {
                        message: if e.is_panic() {
                            "Restore task panicked".to_string()
                        } else {
                            "Restore task was cancelled".to_string()
                        },
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        session_id = %session_id,
                        timeout = ?deadline,
                        "Restore timed out, remote call left running"
                    );
                    RestoreOutcome::TimedOut
                }
            };
            (index, RestoreResult::new(session_id, display_name, outcome))
        }
        .boxed()
    }

    fn settle(&self, slots: &mut [Option<RestoreResult>], index: usize, result: RestoreResult) {
        self.state.progress.send_modify(|p| p.record(result.clone()));
        slots[index] = Some(result);
    }
}
