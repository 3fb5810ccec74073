use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ea_domain::cancel::CancellationContext;
use serde::Serialize;
use uuid::Uuid;

/// How long a terminated session's entry is kept around after it reaches
/// a terminal status, so a late citation lookup (or a `/sessions/{id}`
/// poll) still resolves. Spec.md §3 suggests "e.g. 1 hour"; this tracks
/// the configured citation TTL in practice (see `ea-gateway`'s wiring).
const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
    TimedOut,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Pending | SessionStatus::Processing)
    }
}

/// Full session state, including the live [`CancellationContext`] shared
/// with the running orchestrator. Not `Serialize` as a whole (the
/// cancellation context carries no meaningful serialized form); use
/// [`SessionEntry::snapshot`] for the `/sessions` HTTP surface.
#[derive(Clone)]
pub struct SessionEntry {
    pub id: Uuid,
    pub question: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub round: u32,
    pub consumed_tokens: u64,
    pub cancellation: CancellationContext,
}

impl SessionEntry {
    pub fn new(id: Uuid, question: impl Into<String>, cancellation: CancellationContext) -> Self {
        Self {
            id,
            question: question.into(),
            status: SessionStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            round: 0,
            consumed_tokens: 0,
            cancellation,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            question: self.question.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            round: self.round,
            consumed_tokens: self.consumed_tokens,
        }
    }

    fn retained_past(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match self.ended_at {
            Some(ended) => {
                let age = now.signed_duration_since(ended);
                age < chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero())
            }
            None => true,
        }
    }
}

/// Serializable view of a session, used for `GET /sessions` and
/// `GET /sessions/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub question: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub round: u32,
    pub consumed_tokens: u64,
}

/// Public alias used by call sites that only care about the `State` enum.
pub type SessionState = SessionStatus;

/// Guarded map of active and recently-terminated sessions.
///
/// Never held across an `.await` point: every method takes the lock, does
/// O(1) work, and returns.
pub struct SessionStore {
    sessions: parking_lot::RwLock<HashMap<Uuid, SessionEntry>>,
    retention: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: parking_lot::RwLock::new(HashMap::new()),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            sessions: parking_lot::RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn insert(&self, entry: SessionEntry) {
        self.sessions.write().insert(entry.id, entry);
    }

    pub fn get(&self, id: Uuid) -> Option<SessionEntry> {
        self.sessions.read().get(&id).cloned()
    }

    /// Apply `f` to the session's entry in place, if it exists.
    pub fn update<F: FnOnce(&mut SessionEntry)>(&self, id: Uuid, f: F) {
        if let Some(entry) = self.sessions.write().get_mut(&id) {
            f(entry);
        }
    }

    pub fn mark_terminal(&self, id: Uuid, status: SessionStatus) {
        self.update(id, |entry| {
            entry.status = status;
            entry.ended_at = Some(Utc::now());
        });
    }

    pub fn remove(&self, id: Uuid) {
        self.sessions.write().remove(&id);
    }

    pub fn processing_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|e| e.status == SessionStatus::Processing)
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_all(&self) -> Vec<SessionSnapshot> {
        self.sessions.read().values().map(SessionEntry::snapshot).collect()
    }

    pub fn snapshot_one(&self, id: Uuid) -> Option<SessionSnapshot> {
        self.sessions.read().get(&id).map(SessionEntry::snapshot)
    }

    /// Drop entries that finished more than `retention` ago. Intended to
    /// be run periodically by a background sweeper, mirroring the
    /// citation store's eviction discipline.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let retention = self.retention;
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.retained_past(now, retention));
        before - sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Uuid) -> SessionEntry {
        SessionEntry::new(id, "question", CancellationContext::no_deadline())
    }

    #[test]
    fn insert_and_get_round_trip() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        store.insert(entry(id));
        assert_eq!(store.get(id).unwrap().question, "question");
    }

    #[test]
    fn processing_count_tracks_status() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        store.insert(entry(id));
        store.update(id, |e| e.status = SessionStatus::Processing);
        assert_eq!(store.processing_count(), 1);
        store.mark_terminal(id, SessionStatus::Completed);
        assert_eq!(store.processing_count(), 0);
    }

    #[test]
    fn mark_terminal_sets_ended_at() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        store.insert(entry(id));
        store.mark_terminal(id, SessionStatus::Failed);
        let snap = store.snapshot_one(id).unwrap();
        assert_eq!(snap.status, SessionStatus::Failed);
        assert!(snap.ended_at.is_some());
    }

    #[test]
    fn sweep_drops_expired_terminal_sessions() {
        let store = SessionStore::with_retention(Duration::from_secs(0));
        let id = Uuid::new_v4();
        store.insert(entry(id));
        store.mark_terminal(id, SessionStatus::Completed);
        let evicted = store.sweep();
        assert_eq!(evicted, 1);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn sweep_keeps_active_sessions() {
        let store = SessionStore::with_retention(Duration::from_secs(0));
        let id = Uuid::new_v4();
        store.insert(entry(id));
        let evicted = store.sweep();
        assert_eq!(evicted, 0);
        assert!(store.get(id).is_some());
    }

    #[test]
    fn remove_deletes_entry() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        store.insert(entry(id));
        store.remove(id);
        assert!(store.get(id).is_none());
    }
}
