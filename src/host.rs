//! Host ports: trait boundary for every external collaborator this crate
//! consumes rather than implements (agent runtime, pairing store, session
//! store, routing table, activity ledger, markdown/chunking helpers).
//!
//! The adapter core holds `Arc<dyn ...>` for these instead of assuming a
//! concrete backing store, so it never reaches into a specific host
//! implementation.

use async_trait::async_trait;

/// Channel identifier used as the first component of pairing/session keys.
pub const CHANNEL_ID: &str = "xmpp";

/// Result of an idempotent pairing-request upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingUpsertResult {
    /// `true` only the first time this id is requested.
    pub created: bool,
}

/// Persists first-contact pairing challenges, keyed by `(channel, id)`.
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Idempotently record a pairing request for `id` (a lowercased bare JID).
    async fn upsert_pairing_request(&self, channel: &str, id: &str) -> anyhow::Result<PairingUpsertResult>;

    /// Read the set of bare JIDs the pairing store has approved for `channel`.
    async fn read_allow_from_store(&self, channel: &str) -> anyhow::Result<Vec<String>>;

    /// Build the one-line pairing instruction reply text for `id`.
    async fn build_pairing_reply(&self, channel: &str, id: &str) -> anyhow::Result<String>;
}

/// Supplies extra mention patterns/localparts beyond the account's own
/// localpart, e.g. aliases configured elsewhere in the host.
pub trait MentionPatternSource: Send + Sync {
    fn mention_patterns(&self, account_id: &str) -> Vec<String>;
}

/// Detects and authorizes textual commands embedded in message bodies.
pub trait CommandGate: Send + Sync {
    /// Does `body` contain a recognized command prefix?
    fn is_command(&self, body: &str) -> bool;

    /// Is `sender_bare_jid` authorized to issue commands on this account?
    fn is_authorized(&self, account_id: &str, sender_bare_jid: &str) -> bool;
}

/// Resolves an inbound message to an agent route.
#[async_trait]
pub trait RoutingResolver: Send + Sync {
    async fn resolve_route(&self, channel: &str, account_id: &str, peer: &Peer) -> anyhow::Result<String>;
}

/// The peer an inbound message addresses: a direct bare JID or a group room.
#[derive(Debug, Clone)]
pub struct Peer {
    pub kind: PeerKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    Direct,
    Group,
}

/// Session continuity store: previous-session timestamps and recorded turns.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn previous_session_timestamp(&self, session_key: &str) -> anyhow::Result<Option<i64>>;
    async fn record_inbound(&self, session_key: &str, at_ms: i64) -> anyhow::Result<()>;
}

/// Records inbound/outbound activity for operational visibility.
#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    async fn record(&self, event: ActivityEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub channel: &'static str,
    pub account_id: String,
    pub direction: ActivityDirection,
    pub at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityDirection {
    Inbound,
    Outbound,
}

/// The context payload handed to the agent dispatcher, per §4.6 step 5.
#[derive(Debug, Clone, Default)]
pub struct ContextPayload {
    pub body: String,
    pub raw_body: String,
    pub command_body: Option<String>,
    pub from: String,
    pub to: String,
    pub session_key: String,
    pub account_id: String,
    pub chat_type: String,
    pub conversation_label: String,
    pub sender_name: String,
    pub sender_id: String,
    pub group_subject: Option<String>,
    pub group_system_prompt: Option<String>,
    pub provider: &'static str,
    pub was_mentioned: Option<bool>,
    pub message_sid: String,
    pub timestamp_ms: i64,
    pub originating_channel: &'static str,
    pub originating_to: String,
    pub command_authorized: bool,
}

/// A single reply chunk handed back by the agent dispatcher.
#[derive(Debug, Clone)]
pub struct ReplyChunk {
    pub text: String,
    pub is_final: bool,
}

/// Dispatches a context payload to the external agent runtime and invokes
/// `deliver` for each reply chunk.
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        payload: ContextPayload,
        skills: &[String],
        block_streaming: bool,
        deliver: ReplySink,
    ) -> anyhow::Result<()>;
}

/// Callback-style sink an `AgentDispatcher` delivers reply chunks through.
pub type ReplySink = std::sync::Arc<dyn Fn(ReplyChunk) -> ReplyFuture + Send + Sync>;
type ReplyFuture = std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// Formats the channel label / sender label / envelope text shown to the
/// agent runtime for a given inbound message.
pub trait ReplyEnvelopeFormatter: Send + Sync {
    fn format_envelope(
        &self,
        channel_label: &str,
        sender_label: &str,
        now_ms: i64,
        previous_session_ms: Option<i64>,
        body: &str,
    ) -> String;
}

/// Converts markdown (tables in particular) to the plaintext mode the
/// channel's renderer expects, and chunks long text for delivery.
pub trait MarkdownChunker: Send + Sync {
    fn convert_tables(&self, text: &str) -> String;
    fn chunk(&self, text: &str, max_len: usize) -> Vec<String> {
        crate::stanza::chunk_text(text, max_len)
    }
}

/// Bundle of host ports an account's pipeline/outbound sender depend on.
/// Optional ports (`None`) degrade gracefully rather than failing: pairing
/// is skipped, routes fall back to the raw peer id, activity goes unlogged.
#[derive(Clone, Default)]
pub struct HostPorts {
    pub pairing_store: Option<std::sync::Arc<dyn PairingStore>>,
    pub mention_patterns: Option<std::sync::Arc<dyn MentionPatternSource>>,
    pub command_gate: Option<std::sync::Arc<dyn CommandGate>>,
    pub routing_resolver: Option<std::sync::Arc<dyn RoutingResolver>>,
    pub session_store: Option<std::sync::Arc<dyn SessionStore>>,
    pub activity_recorder: Option<std::sync::Arc<dyn ActivityRecorder>>,
    pub agent_dispatcher: Option<std::sync::Arc<dyn AgentDispatcher>>,
    pub envelope_formatter: Option<std::sync::Arc<dyn ReplyEnvelopeFormatter>>,
    pub markdown: Option<std::sync::Arc<dyn MarkdownChunker>>,
}

/// A no-op `MarkdownChunker` used when the host doesn't supply one: passes
/// text through unchanged (still chunks via `stanza::chunk_text`).
pub struct PassthroughMarkdown;

impl MarkdownChunker for PassthroughMarkdown {
    fn convert_tables(&self, text: &str) -> String {
        text.to_string()
    }
}
