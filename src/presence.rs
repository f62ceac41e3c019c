//! Presence tracker: per-bare-JID availability state, scoped to one
//! account (never shared across accounts, per §5).

use std::collections::HashMap;

use crate::message::PresenceState;

/// Per-account presence table.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    states: HashMap<String, PresenceState>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presence update, keyed by the bare JID.
    pub fn update(&mut self, bare_jid: &str, available: bool, status: Option<String>, show: Option<String>, priority: Option<i8>, now_ms: i64) {
        let state = self.states.entry(bare_jid.to_string()).or_insert_with(|| PresenceState {
            jid: bare_jid.to_string(),
            available: false,
            status: None,
            show: None,
            priority: None,
            last_seen_ms: None,
        });
        state.available = available;
        state.status = status;
        state.show = show;
        state.priority = priority;
        if available {
            state.last_seen_ms = Some(now_ms);
        }
    }

    pub fn get(&self, bare_jid: &str) -> Option<&PresenceState> {
        self.states.get(bare_jid)
    }

    pub fn is_available(&self, bare_jid: &str) -> bool {
        self.states.get(bare_jid).is_some_and(|s| s.available)
    }

    pub fn remove(&mut self, bare_jid: &str) {
        self.states.remove(bare_jid);
    }
}
