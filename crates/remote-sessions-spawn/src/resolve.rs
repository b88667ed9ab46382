//! Session id resolution by polling the store.
//!
//! After a spawn whose acknowledgment was provisional or lost, the new
//! session eventually shows up in the synced store. The poller waits for it.

use remote_sessions_core::{ResolveBudget, Session, SessionId, SessionStore};

/// Progress callback: `(attempt, max_attempts)`, 1-based.
pub type AttemptCallback = dyn Fn(u32, u32) + Send + Sync;

/// Poll `store` until a session on `machine_id` created at or after
/// `since_ms` appears.
///
/// Each round waits `budget.interval()` and then queries. When several
/// candidates exist, the earliest-created one wins, ties broken by id, so a
/// session spawned concurrently by someone else is not picked up. A failed
/// query counts as an empty round.
///
/// Returns `None` once `budget.max_attempts` rounds found nothing. There is
/// no cancellation; a caller that loses interest drops the future.
pub async fn resolve<S>(
    store: &S,
    machine_id: &str,
    since_ms: i64,
    budget: ResolveBudget,
    on_attempt: Option<&AttemptCallback>,
) -> Option<SessionId>
where
    S: SessionStore + ?Sized,
{
    for attempt in 1..=budget.max_attempts {
        tokio::time::sleep(budget.interval()).await;

        if let Some(cb) = on_attempt {
            cb(attempt, budget.max_attempts);
        }

        match store.sessions_created_since(machine_id, since_ms).await {
            Ok(candidates) => {
                if let Some(found) = earliest(&candidates) {
                    tracing::info!(
                        machine_id,
                        session_id = %found.id,
                        attempt,
                        "Resolved spawned session"
                    );
                    return Some(found.id.clone());
                }
                tracing::debug!(
                    machine_id,
                    attempt,
                    max_attempts = budget.max_attempts,
                    "Spawned session not visible yet"
                );
            }
            Err(e) => {
                tracing::warn!(machine_id, attempt, "Session query failed: {e}");
            }
        }
    }

    tracing::warn!(
        machine_id,
        max_attempts = budget.max_attempts,
        "Gave up resolving spawned session"
    );
    None
}

fn earliest(candidates: &[Session]) -> Option<&Session> {
    candidates
        .iter()
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use remote_sessions_core::{SessionMetadata, StoreError};
    use tokio::time::Instant;

    use super::*;

    /// Store that answers from a script, one entry per query.
    struct ScriptedStore {
        rounds: Mutex<Vec<Result<Vec<Session>, StoreError>>>,
        queries: AtomicU32,
    }

    impl ScriptedStore {
        fn new(mut rounds: Vec<Result<Vec<Session>, StoreError>>) -> Self {
            rounds.reverse();
            Self {
                rounds: Mutex::new(rounds),
                queries: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionStore for ScriptedStore {
        async fn sessions_created_since(
            &self,
            _machine_id: &str,
            _since_ms: i64,
        ) -> Result<Vec<Session>, StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.rounds.lock().unwrap().pop().unwrap_or(Ok(Vec::new()))
        }

        async fn mark_superseded(&self, _old: &str, _new: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn session(id: &str, created_at: i64) -> Session {
        Session::new(
            id,
            SessionMetadata {
                machine_id: Some("m1".into()),
                ..SessionMetadata::default()
            },
            created_at,
        )
    }

    fn budget(interval_ms: u64, max_attempts: u32) -> ResolveBudget {
        ResolveBudget::new(Duration::from_millis(interval_ms), max_attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_none_after_max_attempts() {
        let store = ScriptedStore::new(vec![]);
        let started = Instant::now();

        let found = resolve(&store, "m1", 0, budget(3_000, 10), None).await;

        assert_eq!(found, None);
        assert_eq!(store.queries.load(Ordering::SeqCst), 10);
        assert!(started.elapsed() <= Duration::from_millis(30_000) + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_on_third_attempt() {
        let store = ScriptedStore::new(vec![
            Ok(vec![]),
            Ok(vec![]),
            Ok(vec![session("sess-abc", 10)]),
        ]);
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&attempts);
        let cb = move |n: u32, max: u32| seen.lock().unwrap().push((n, max));

        let found = resolve(&store, "m1", 0, budget(5_000, 24), Some(&cb)).await;

        assert_eq!(found.as_deref(), Some("sess-abc"));
        assert_eq!(store.queries.load(Ordering::SeqCst), 3);
        assert_eq!(*attempts.lock().unwrap(), [(1, 24), (2, 24), (3, 24)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_picks_earliest_created_candidate() {
        let store = ScriptedStore::new(vec![Ok(vec![
            session("later", 300),
            session("zeta", 100),
            session("alpha", 100),
        ])]);

        let found = resolve(&store, "m1", 0, budget(10, 3), None).await;

        assert_eq!(found.as_deref(), Some("alpha"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_errors_do_not_abort() {
        let store = ScriptedStore::new(vec![
            Err(StoreError::Internal("sync lagging".into())),
            Ok(vec![session("sess-1", 5)]),
        ]);

        let found = resolve(&store, "m1", 0, budget(100, 5), None).await;

        assert_eq!(found.as_deref(), Some("sess-1"));
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_before_each_query() {
        let store = ScriptedStore::new(vec![Ok(vec![session("s", 1)])]);
        let started = Instant::now();

        let found = resolve(&store, "m1", 0, budget(5_000, 2), None).await;

        assert!(found.is_some());
        assert!(started.elapsed() >= Duration::from_millis(5_000));
    }
}
