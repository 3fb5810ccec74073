use std::collections::HashMap;
use std::time::{Duration, Instant};

use ea_domain::trace::TraceEvent;
use ea_domain::{Error, Result};
use parking_lot::RwLock;

/// One stored citation: the full evidence record the answer referenced.
#[derive(Debug, Clone)]
pub struct CitationRecord {
    pub title: String,
    pub full_content: String,
}

struct SessionCitations {
    citations: HashMap<String, CitationRecord>,
    /// Set once the owning session reaches a terminal status; the TTL
    /// clock starts here, not at session creation.
    terminated_at: Option<Instant>,
}

impl SessionCitations {
    fn new() -> Self {
        Self {
            citations: HashMap::new(),
            terminated_at: None,
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.terminated_at.map(|t| t.elapsed() >= ttl).unwrap_or(false)
    }
}

/// Guarded `session_id -> citation_id -> CitationRecord` map with TTL
/// eviction measured from the owning session's terminal transition.
///
/// Eviction is lazy (checked on access) plus a periodic sweep, matching
/// the session store's discipline: the lock is never held across an
/// `.await` point.
pub struct CitationStore {
    sessions: RwLock<HashMap<String, SessionCitations>>,
    ttl: Duration,
}

impl CitationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Record one citation. Writes happen at most once per citation ID
    /// (re-storing the same ID overwrites, which the orchestrator never
    /// does in practice since citation assembly runs once per session).
    pub fn store(&self, session_id: &str, citation_id: &str, title: impl Into<String>, full_content: impl Into<String>) {
        let mut sessions = self.sessions.write();
        let entry = sessions.entry(session_id.to_string()).or_insert_with(SessionCitations::new);
        entry.citations.insert(
            citation_id.to_string(),
            CitationRecord {
                title: title.into(),
                full_content: full_content.into(),
            },
        );
        TraceEvent::CitationStored {
            session_id: session_id.to_string(),
            citation_id: citation_id.to_string(),
        }
        .emit();
    }

    /// Mark the owning session as terminated, starting its TTL clock.
    /// Idempotent: a session already marked keeps its original timestamp.
    pub fn mark_session_terminal(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.terminated_at.get_or_insert_with(Instant::now);
        }
    }

    pub fn get(&self, session_id: &str, citation_id: &str) -> Result<CitationRecord> {
        let mut sessions = self.sessions.write();

        if let Some(entry) = sessions.get(session_id) {
            if entry.expired(self.ttl) {
                for evicted_id in entry.citations.keys() {
                    TraceEvent::CitationEvicted {
                        session_id: session_id.to_string(),
                        citation_id: evicted_id.clone(),
                    }
                    .emit();
                }
                sessions.remove(session_id);
                return Err(Error::CitationNotFound(citation_id.to_string()));
            }
        }

        sessions
            .get(session_id)
            .and_then(|e| e.citations.get(citation_id))
            .cloned()
            .ok_or_else(|| Error::CitationNotFound(citation_id.to_string()))
    }

    /// Drop every session whose TTL has elapsed. Run periodically by a
    /// background task (see `ea-gateway`'s sweeper).
    pub fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write();
        let ttl = self.ttl;
        let before = sessions.len();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, e)| e.expired(ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for session_id in &expired {
            if let Some(entry) = sessions.get(session_id) {
                for citation_id in entry.citations.keys() {
                    TraceEvent::CitationEvicted {
                        session_id: session_id.clone(),
                        citation_id: citation_id.clone(),
                    }
                    .emit();
                }
            }
            sessions.remove(session_id);
        }
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "citation sweep evicted expired sessions");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_get_round_trips() {
        let store = CitationStore::new(Duration::from_secs(3600));
        store.store("s1", "1", "Title", "Full content");
        let rec = store.get("s1", "1").unwrap();
        assert_eq!(rec.title, "Title");
        assert_eq!(rec.full_content, "Full content");
    }

    #[test]
    fn missing_citation_is_not_found() {
        let store = CitationStore::new(Duration::from_secs(3600));
        assert!(matches!(store.get("nope", "1"), Err(Error::CitationNotFound(_))));
    }

    #[test]
    fn ttl_clock_starts_at_terminal_mark_not_store() {
        let store = CitationStore::new(Duration::from_millis(0));
        store.store("s1", "1", "t", "c");
        // Not yet marked terminal: TTL clock hasn't started, so lookups
        // still succeed even with a zero TTL.
        assert!(store.get("s1", "1").is_ok());
        store.mark_session_terminal("s1");
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(store.get("s1", "1"), Err(Error::CitationNotFound(_))));
    }

    #[test]
    fn sweep_evicts_expired_sessions() {
        let store = CitationStore::new(Duration::from_millis(0));
        store.store("s1", "1", "t", "c");
        store.mark_session_terminal("s1");
        std::thread::sleep(Duration::from_millis(5));
        let removed = store.sweep();
        assert_eq!(removed, 1);
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn mark_terminal_is_idempotent() {
        let store = CitationStore::new(Duration::from_secs(3600));
        store.store("s1", "1", "t", "c");
        store.mark_session_terminal("s1");
        store.mark_session_terminal("s1");
        assert!(store.get("s1", "1").is_ok());
    }
}
