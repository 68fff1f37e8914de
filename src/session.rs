//! In-memory conversation history for the HTTP host.
//!
//! Sessions are keyed by UUID and hold the user/assistant turns of earlier
//! requests. Tool traffic is not stored: each request's loop rebuilds it.
//! Nothing is persisted; restarting the process forgets every session.
//!
//! The store is bounded twice: a session keeps at most `history_limit`
//! messages, and at most `max_sessions` sessions are kept, evicting the
//! least recently used one when a new session records its first turn.

use crate::context::truncate_messages;
use crate::types::{CompletionResult, Message};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Session {
    turns: Vec<Message>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    entries: HashMap<Uuid, Session>,
    clock: u64,
}

impl Sessions {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_oldest(&mut self) -> Option<Uuid> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, session)| session.last_used)
            .map(|(id, _)| *id)?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<Sessions>>,
    system_prompt: Option<String>,
    history_limit: usize,
    max_sessions: usize,
}

impl SessionStore {
    /// `max_sessions` below 1 is treated as 1.
    pub fn new(system_prompt: Option<String>, history_limit: usize, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(Sessions::default())),
            system_prompt,
            history_limit,
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        // Entries are plain vectors; a panicked writer cannot leave one half-updated
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return `requested` if given, otherwise a fresh id.
    ///
    /// Nothing is stored until [`record_turn`](Self::record_turn), so ids
    /// that never complete a turn cost nothing.
    pub fn resolve(&self, requested: Option<Uuid>) -> Uuid {
        requested.unwrap_or_else(Uuid::new_v4)
    }

    /// Messages to feed the loop ahead of the next user message: the
    /// configured system prompt followed by the trimmed stored history.
    pub fn history(&self, id: Uuid) -> Vec<Message> {
        let stored = {
            let mut sessions = self.lock();
            let now = sessions.tick();
            match sessions.entries.get_mut(&id) {
                Some(session) => {
                    session.last_used = now;
                    session.turns.clone()
                }
                None => Vec::new(),
            }
        };

        let mut history: Vec<Message> = self.system_prompt.iter().map(Message::system).collect();
        history.extend(truncate_messages(&stored, self.history_limit, false));
        history
    }

    /// Append one finished turn, creating the session if needed.
    pub fn record_turn(&self, id: Uuid, user: Message, result: &CompletionResult) {
        let mut sessions = self.lock();
        if !sessions.entries.contains_key(&id) && sessions.entries.len() >= self.max_sessions {
            if let Some(evicted) = sessions.evict_oldest() {
                debug!(event_name = "server.session.evicted", session_id = %evicted);
            }
        }

        let now = sessions.tick();
        let session = sessions.entries.entry(id).or_default();
        session.last_used = now;
        session.turns.push(user);
        if !result.text.is_empty() {
            session.turns.push(Message::assistant(result.text.clone()));
        }

        let excess = session.turns.len().saturating_sub(self.history_limit);
        session.turns.drain(..excess);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.lock().entries.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageRole, Usage};

    fn completed(text: &str) -> CompletionResult {
        CompletionResult {
            text: text.to_string(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            usage: Usage::default(),
            finish_reason: "stop".to_string(),
            aborted: false,
        }
    }

    #[test]
    fn test_resolve_does_not_store_sessions() {
        let store = SessionStore::new(None, 10, 8);
        let fresh = store.resolve(None);
        let given = Uuid::new_v4();

        assert_eq!(store.resolve(Some(given)), given);
        assert_ne!(fresh, given);
        assert!(store.is_empty());
        assert!(store.history(fresh).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_history_includes_system_prompt_and_turns() {
        let store = SessionStore::new(Some("Be brief.".into()), 10, 8);
        let id = store.resolve(None);
        store.record_turn(id, Message::user("2 + 3?"), &completed("5"));

        let history = store.history(id);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(history[1].content.text(), "2 + 3?");
        assert_eq!(history[2].content.text(), "5");
    }

    #[test]
    fn test_stored_turns_are_capped_at_history_limit() {
        let store = SessionStore::new(None, 2, 8);
        let id = store.resolve(None);
        store.record_turn(id, Message::user("one"), &completed("1"));
        store.record_turn(id, Message::user("two"), &completed("2"));

        let history = store.history(id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content.text(), "two");
        assert_eq!(store.lock().entries[&id].turns.len(), 2);
    }

    #[test]
    fn test_empty_reply_records_only_user_turn() {
        let store = SessionStore::new(None, 10, 8);
        let id = store.resolve(None);
        store.record_turn(id, Message::user("hello?"), &completed(""));
        assert_eq!(store.history(id).len(), 1);
        assert!(store.remove(id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_session_count_is_bounded() {
        let store = SessionStore::new(None, 10, 3);
        for _ in 0..100 {
            let id = store.resolve(None);
            store.record_turn(id, Message::user("hi"), &completed("hello"));
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_least_recently_used_session_is_evicted() {
        let store = SessionStore::new(None, 10, 2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.record_turn(first, Message::user("a"), &completed("1"));
        store.record_turn(second, Message::user("b"), &completed("2"));

        // Reading the first session makes the second the eviction candidate
        assert_eq!(store.history(first).len(), 2);
        store.record_turn(Uuid::new_v4(), Message::user("c"), &completed("3"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.history(first).len(), 2);
        assert!(store.history(second).is_empty());
    }
}
