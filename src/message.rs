//! Shared data-model types: `InboundMessage` and `PresenceState` (spec §3).

/// A decoded inbound message, independent of transport.
///
/// Invariants: if `is_group` then `target` is a room JID and
/// `sender_nickname` is set; if not `is_group` then `target = sender_bare_jid`.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: String,
    /// Room JID for MUC, else the sender's bare JID.
    pub target: String,
    pub raw_target: Option<String>,
    /// Full JID (`room@conference.domain/nick` for MUC, else bare+resource).
    pub sender_jid: String,
    pub sender_bare_jid: String,
    pub sender_resource: Option<String>,
    pub sender_nickname: Option<String>,
    pub text: String,
    pub timestamp_ms: i64,
    pub is_group: bool,
    pub stanza_id: Option<String>,
    /// XEP-0308: id of the message this corrects, if any.
    pub correction_of: Option<String>,
    /// XEP-0461: JID this message is threaded from, if any.
    pub reply_to: Option<String>,
}

impl InboundMessage {
    /// Checks the two target invariants from §8.
    pub fn is_well_formed(&self) -> bool {
        if self.is_group {
            crate::jid::is_room_jid(&self.target) && self.sender_nickname.is_some()
        } else {
            self.target == self.sender_bare_jid
        }
    }
}

/// Per-bare-JID availability state, tracked per account (never shared).
#[derive(Debug, Clone)]
pub struct PresenceState {
    pub jid: String,
    pub available: bool,
    pub status: Option<String>,
    pub show: Option<String>,
    pub priority: Option<i8>,
    pub last_seen_ms: Option<i64>,
}
