//! In-memory session store and machine registry.

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use async_trait::async_trait;
use remote_sessions_core::{
    MachineRegistry, Session, SessionId, SessionStore, StoreError, now_millis,
};

/// In-memory session store.
///
/// Useful for development, demos and tests. Data is lost on restart.
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a session, as the sync layer would when the
    /// remote side reports it.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn insert(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(session.id.clone(), session);
        Ok(())
    }

    /// Get a session by id.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(id)
            .cloned())
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().map_or(0, |s| s.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn sessions_created_since(
        &self,
        machine_id: &str,
        since_ms: i64,
    ) -> Result<Vec<Session>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut result: Vec<Session> = sessions
            .values()
            .filter(|s| {
                s.created_at >= since_ms && s.metadata.machine_id.as_deref() == Some(machine_id)
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(result)
    }

    async fn mark_superseded(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        if !sessions.contains_key(new_id) {
            return Err(StoreError::NotFound(new_id.to_string()));
        }
        let old = sessions
            .get(old_id)
            .ok_or_else(|| StoreError::NotFound(old_id.to_string()))?;
        match old.superseded_by.as_deref() {
            Some(existing) if existing == new_id => return Ok(()),
            Some(existing) => {
                return Err(StoreError::AlreadySuperseded {
                    id: old_id.to_string(),
                    successor: existing.to_string(),
                });
            }
            None => {}
        }

        // Both records were checked under the same write guard.
        let timestamp = now_millis();
        if let Some(old) = sessions.get_mut(old_id) {
            old.superseded_by = Some(new_id.to_string());
            old.updated_at = timestamp;
        }
        if let Some(new) = sessions.get_mut(new_id) {
            new.supersedes = Some(old_id.to_string());
            new.updated_at = timestamp;
        }

        Ok(())
    }
}

/// Machine registry backed by a fixed set of online machine ids.
#[derive(Default)]
pub struct StaticMachineRegistry {
    online: RwLock<HashSet<String>>,
}

impl StaticMachineRegistry {
    /// Create a registry with the given machines online.
    #[must_use]
    pub fn new<I>(online: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            online: RwLock::new(online.into_iter().map(Into::into).collect()),
        }
    }

    /// Mark a machine online or offline, as a heartbeat would.
    pub fn set_online(&self, machine_id: impl Into<String>, online: bool) {
        if let Ok(mut set) = self.online.write() {
            let machine_id = machine_id.into();
            if online {
                set.insert(machine_id);
            } else {
                set.remove(&machine_id);
            }
        }
    }
}

#[async_trait]
impl MachineRegistry for StaticMachineRegistry {
    async fn is_online(&self, machine_id: &str) -> bool {
        self.online
            .read()
            .is_ok_and(|set| set.contains(machine_id))
    }
}
