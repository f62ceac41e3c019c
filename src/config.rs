//! Account and room configuration.
//!
//! `AccountConfig` is the per-account configuration surface described in
//! the data model: a base `channels.xmpp` block merged with per-account
//! overrides (merging itself is the account resolver's job, see
//! `account.rs`).

use std::collections::HashMap;

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// DM access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    /// First-contact pairing challenge gates unknown senders.
    Pairing,
    /// Only senders on the allowlist (or pairing-approved) are let through.
    Allowlist,
    /// Anyone may DM (requires `"*"` in `allowFrom`, enforced at validation).
    Open,
    /// DMs are never processed.
    Disabled,
}

impl Default for DmPolicy {
    fn default() -> Self {
        Self::Pairing
    }
}

/// Group (MUC) access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    /// Only rooms on the allowlist are processed.
    Allowlist,
    /// Any joined room is processed (subject to mention gating).
    Open,
    /// Group messages are never processed.
    Disabled,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self::Allowlist
    }
}

/// Per-room configuration override, keyed by room JID (or `"*"` for the
/// wildcard default applied when no exact/case-insensitive key matches).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoomConfig {
    /// Overrides the account-level mention requirement for this room.
    pub require_mention: Option<bool>,
    /// Whether this room is processed at all. Defaults to enabled.
    pub enabled: Option<bool>,
    /// Per-room sender allowlist (bare JIDs, domain globs, or `"*"`).
    pub allow_from: Vec<String>,
    /// Tool names enabled for this room's agent dispatch.
    pub tools: Vec<String>,
    /// Per-sender tool overrides within this room.
    pub tools_by_sender: HashMap<String, Vec<String>>,
    /// Skill filter forwarded to the agent dispatcher.
    pub skills: Vec<String>,
    /// Custom system prompt for this room's sessions.
    pub system_prompt: Option<String>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            require_mention: None,
            enabled: None,
            allow_from: Vec::new(),
            tools: Vec::new(),
            tools_by_sender: HashMap::new(),
            skills: Vec::new(),
            system_prompt: None,
        }
    }
}

/// Configuration for a single XMPP account (after merging base + overrides
/// + env, see `account.rs`).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountConfig {
    /// Bare JID, e.g. `"bot@example.com"`.
    pub jid: String,

    /// Account password.
    #[serde(serialize_with = "serialize_secret")]
    pub password: Secret<String>,

    /// Optional path to a file containing the password (trimmed on read).
    pub password_file: Option<String>,

    /// XMPP resource. Defaults to the product identifier.
    pub resource: String,

    /// Host override; defaults to the JID's domain.
    pub host: Option<String>,

    /// TCP port. Defaults to 5222.
    pub port: u16,

    /// Whether to use TLS (STARTTLS). Defaults to true.
    pub tls: bool,

    /// DM access policy.
    pub dm_policy: DmPolicy,

    /// Bare JIDs (or `"*"`, or `"*@domain"`) allowed to DM this account.
    pub allow_from: Vec<String>,

    /// Group/MUC access policy.
    pub group_policy: GroupPolicy,

    /// Bare room JIDs (or `"*"`) allowed under `group_policy = allowlist`.
    pub group_allow_from: Vec<String>,

    /// Per-room configuration, keyed by room JID or `"*"`.
    pub rooms: HashMap<String, RoomConfig>,

    /// Rooms to join automatically once the account comes online.
    pub auto_join_rooms: Vec<String>,

    /// Extra regex-like mention patterns (in addition to the account's
    /// localpart matched as a word).
    pub mention_patterns: Vec<String>,

    /// Whether to convert markdown tables for this channel's renderer.
    pub markdown: bool,

    /// How many prior messages of session history to include in context.
    pub history_limit: usize,

    /// Optional prefix prepended to every outbound reply.
    pub response_prefix: Option<String>,

    /// Whether streaming replies should be broken into multiple stanzas
    /// (true) or coalesced into one block (false).
    pub block_streaming: bool,

    /// Maximum characters per outbound text chunk.
    pub text_chunk_limit: usize,

    /// Maximum outbound media size, in megabytes.
    pub media_max_mb: u32,

    /// Media MIME types this account refuses to send.
    pub blocked_media_types: Vec<String>,

    /// Default model id for this account's sessions.
    pub model: Option<String>,

    /// Provider name associated with `model`.
    pub model_provider: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("jid", &self.jid)
            .field("password", &"[REDACTED]")
            .field("resource", &self.resource)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("dm_policy", &self.dm_policy)
            .field("group_policy", &self.group_policy)
            .field("auto_join_rooms", &self.auto_join_rooms)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Product resource identifier used as the default XMPP resource.
pub const DEFAULT_RESOURCE: &str = "agent-gateway";
pub const DEFAULT_PORT: u16 = 5222;

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            jid: String::new(),
            password: Secret::new(String::new()),
            password_file: None,
            resource: DEFAULT_RESOURCE.to_string(),
            host: None,
            port: DEFAULT_PORT,
            tls: true,
            dm_policy: DmPolicy::default(),
            allow_from: Vec::new(),
            group_policy: GroupPolicy::default(),
            group_allow_from: Vec::new(),
            rooms: HashMap::new(),
            auto_join_rooms: Vec::new(),
            mention_patterns: Vec::new(),
            markdown: true,
            history_limit: 20,
            response_prefix: None,
            block_streaming: true,
            text_chunk_limit: 4000,
            media_max_mb: 20,
            blocked_media_types: Vec::new(),
            model: None,
            model_provider: None,
        }
    }
}

impl AccountConfig {
    /// `configured = jid != "" && password != ""`.
    pub fn is_configured(&self) -> bool {
        !self.jid.is_empty() && !self.password.expose_secret().is_empty()
    }

    /// The account's bare JID domain, used as the connect host fallback.
    pub fn jid_domain(&self) -> Option<String> {
        crate::jid::parse_jid(&self.jid).map(|p| p.domain)
    }

    /// The effective connect host: explicit `host`, else the JID's domain.
    pub fn effective_host(&self) -> Option<String> {
        self.host.clone().or_else(|| self.jid_domain())
    }

    /// Validate cross-field invariants not expressible as plain defaults.
    ///
    /// `dmPolicy = open` requires `"*"` in `allowFrom`.
    pub fn validate(&self) -> std::result::Result<(), AdapterError> {
        if self.dm_policy == DmPolicy::Open && !self.allow_from.iter().any(|e| e == "*") {
            return Err(AdapterError::Config(
                "channels.xmpp.dmPolicy=open requires \"*\" in allowFrom".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the effective `RoomConfig` for a room JID: exact key match,
    /// then case-insensitive match, then the `"*"` wildcard.
    pub fn room_config(&self, room_jid: &str) -> (Option<&RoomConfig>, Option<&RoomConfig>) {
        if let Some(cfg) = self.rooms.get(room_jid) {
            return (Some(cfg), self.rooms.get("*"));
        }
        let lower = room_jid.to_lowercase();
        let ci_match = self
            .rooms
            .iter()
            .find(|(key, _)| key.to_lowercase() == lower)
            .map(|(_, cfg)| cfg);
        (ci_match, self.rooms.get("*"))
    }
}
