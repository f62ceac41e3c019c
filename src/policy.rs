//! Policy engine: DM/group access gates, room match, allowlist matching,
//! control-command gate, and mention gate (spec §4.4).
//!
//! Gates run in a fixed order; any NO short-circuits to `Drop`. Allowlist
//! matching itself stays pure over `(candidates, entries)` (`jid::is_allowed`);
//! only the DM-pairing branch needs to reach out to the host's pairing store,
//! so `decide` is the one async entry point and everything it calls into is
//! a plain function.

use crate::{
    config::{AccountConfig, DmPolicy, GroupPolicy},
    host::HostPorts,
    jid,
    message::InboundMessage,
};

/// Outcome of running the policy engine over one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow {
        reason: &'static str,
        was_mentioned: Option<bool>,
        command_authorized: bool,
    },
    Drop {
        reason: String,
    },
    /// DM from an unpaired sender under `dmPolicy=pairing`; `reply_text` is
    /// `Some` only the first time (store reported `created=true`).
    PairingChallenge {
        bare_jid: String,
        reply_text: Option<String>,
    },
}

/// Run the full policy engine for one inbound message.
pub async fn decide(account_id: &str, config: &AccountConfig, msg: &InboundMessage, ports: &HostPorts) -> PolicyDecision {
    if msg.is_group {
        decide_group(account_id, config, msg, ports).await
    } else {
        decide_dm(account_id, config, msg, ports).await
    }
}

async fn decide_dm(account_id: &str, config: &AccountConfig, msg: &InboundMessage, ports: &HostPorts) -> PolicyDecision {
    match config.dm_policy {
        DmPolicy::Disabled => drop_with("dms-disabled"),
        DmPolicy::Open => allow("open", command_authorized(account_id, msg, ports)),
        DmPolicy::Allowlist | DmPolicy::Pairing => {
            let effective = effective_dm_allowlist(config, ports).await;
            let candidates = sender_candidates(msg);
            if jid::is_allowed(&candidates, &effective) {
                return allow("allowlisted", command_authorized(account_id, msg, ports));
            }
            if config.dm_policy == DmPolicy::Allowlist {
                return drop_with("not-allowlisted");
            }
            crate::pairing::challenge(&msg.sender_bare_jid, ports).await
        },
    }
}

async fn decide_group(account_id: &str, config: &AccountConfig, msg: &InboundMessage, ports: &HostPorts) -> PolicyDecision {
    if config.group_policy == GroupPolicy::Disabled {
        return drop_with("groups-disabled");
    }

    let (room_cfg, wildcard_cfg) = config.room_config(&msg.target);

    if config.group_policy == GroupPolicy::Allowlist {
        if config.rooms.is_empty() {
            return drop_with("no rooms configured");
        }
        if room_cfg.is_none() && wildcard_cfg.is_none() {
            return drop_with("not-allowlisted");
        }
    }

    let enabled = room_cfg
        .and_then(|r| r.enabled)
        .or_else(|| wildcard_cfg.and_then(|w| w.enabled))
        .unwrap_or(true);
    if !enabled {
        return drop_with("room-disabled");
    }

    // Per-room sender allowlist: per-room `allowFrom` wins if non-empty,
    // else the account-level group allowlist (plus pairing-approved
    // senders); if both are empty, only `groupPolicy=open` lets anyone in.
    let room_allow_from = room_cfg
        .map(|r| r.allow_from.clone())
        .filter(|entries| !entries.is_empty())
        .or_else(|| wildcard_cfg.map(|w| w.allow_from.clone()).filter(|e| !e.is_empty()));
    let sender_candidates = sender_candidates(msg);
    match room_allow_from {
        Some(entries) => {
            if !jid::is_allowed(&sender_candidates, &entries) {
                return drop_with("not-allowlisted");
            }
        },
        None => {
            let effective = effective_group_allowlist(config, ports).await;
            if !effective.is_empty() {
                if !jid::is_allowed(&sender_candidates, &effective) {
                    return drop_with("not-allowlisted");
                }
            } else if config.group_policy != GroupPolicy::Open {
                return drop_with("not-allowlisted");
            }
        },
    }

    let authorized = command_authorized(account_id, msg, ports);

    let require_mention = room_cfg
        .and_then(|r| r.require_mention)
        .or_else(|| wildcard_cfg.and_then(|w| w.require_mention))
        .unwrap_or(true);
    let mentioned = was_mentioned(&msg.text, &config_localpart(config), &mention_patterns(config, ports));

    if !require_mention || mentioned {
        let reason = if config.group_policy == GroupPolicy::Open { "open" } else { "allowlisted" };
        return allow_group(reason, authorized, mentioned);
    }

    let has_command = ports.command_gate.as_ref().is_some_and(|g| g.is_command(&msg.text));
    if has_command && authorized {
        let reason = if config.group_policy == GroupPolicy::Open { "open" } else { "allowlisted" };
        return allow_group(reason, authorized, mentioned);
    }

    drop_with("missing-mention")
}

fn allow(reason: &'static str, command_authorized: bool) -> PolicyDecision {
    PolicyDecision::Allow {
        reason,
        was_mentioned: None,
        command_authorized,
    }
}

fn allow_group(reason: &'static str, command_authorized: bool, was_mentioned: bool) -> PolicyDecision {
    PolicyDecision::Allow {
        reason,
        was_mentioned: Some(was_mentioned),
        command_authorized,
    }
}

fn drop_with(reason: &str) -> PolicyDecision {
    PolicyDecision::Drop { reason: reason.to_string() }
}

fn sender_candidates(msg: &InboundMessage) -> Vec<String> {
    let mut candidates = vec![msg.sender_bare_jid.to_lowercase(), msg.sender_jid.to_lowercase()];
    if let Some(nick) = &msg.sender_nickname {
        candidates.push(nick.to_lowercase());
    }
    candidates
}

async fn effective_dm_allowlist(config: &AccountConfig, ports: &HostPorts) -> Vec<String> {
    let mut entries = config.allow_from.clone();
    if let Some(store) = &ports.pairing_store
        && let Ok(mut approved) = store.read_allow_from_store(crate::host::CHANNEL_ID).await
    {
        entries.append(&mut approved);
    }
    entries
}

async fn effective_group_allowlist(config: &AccountConfig, ports: &HostPorts) -> Vec<String> {
    let mut entries = config.group_allow_from.clone();
    if let Some(store) = &ports.pairing_store
        && let Ok(mut approved) = store.read_allow_from_store(crate::host::CHANNEL_ID).await
    {
        entries.append(&mut approved);
    }
    entries
}

fn command_authorized(account_id: &str, msg: &InboundMessage, ports: &HostPorts) -> bool {
    let Some(gate) = &ports.command_gate else { return false };
    if !gate.is_command(&msg.text) {
        return false;
    }
    gate.is_authorized(account_id, &msg.sender_bare_jid)
}

fn config_localpart(config: &AccountConfig) -> String {
    jid::parse_jid(&config.jid)
        .and_then(|p| p.local)
        .unwrap_or_default()
}

fn mention_patterns(config: &AccountConfig, ports: &HostPorts) -> Vec<String> {
    let mut patterns = config.mention_patterns.clone();
    if let Some(src) = &ports.mention_patterns {
        patterns.extend(src.mention_patterns(&config.jid));
    }
    patterns
}

/// `wasMentioned` = matches a configured mention pattern, OR matches the
/// account's localpart as a whole word (case-insensitive, optional trailing
/// `:`/`,`).
pub fn was_mentioned(text: &str, localpart: &str, patterns: &[String]) -> bool {
    let lower = text.to_lowercase();
    if patterns.iter().any(|p| !p.is_empty() && lower.contains(&p.to_lowercase())) {
        return true;
    }
    if localpart.is_empty() {
        return false;
    }
    let localpart = localpart.to_lowercase();
    lower.split_whitespace().any(|word| {
        let trimmed = word.trim_end_matches([':', ',']);
        trimmed == localpart
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use std::collections::HashMap;

    fn cfg() -> AccountConfig {
        AccountConfig {
            jid: "bot@example.com".into(),
            password: Secret::new("p".into()),
            ..Default::default()
        }
    }

    fn dm(sender: &str) -> InboundMessage {
        InboundMessage {
            message_id: "1".into(),
            target: sender.to_string(),
            raw_target: None,
            sender_jid: format!("{sender}/phone"),
            sender_bare_jid: sender.to_string(),
            sender_resource: Some("phone".into()),
            sender_nickname: None,
            text: "hi".into(),
            timestamp_ms: 0,
            is_group: false,
            stanza_id: None,
            correction_of: None,
            reply_to: None,
        }
    }

    fn group_msg(room: &str, nick: &str, text: &str) -> InboundMessage {
        InboundMessage {
            message_id: "1".into(),
            target: room.to_string(),
            raw_target: None,
            sender_jid: format!("{room}/{nick}"),
            sender_bare_jid: format!("{nick}@example.com"),
            sender_resource: None,
            sender_nickname: Some(nick.to_string()),
            text: text.to_string(),
            timestamp_ms: 0,
            is_group: true,
            stanza_id: None,
            correction_of: None,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn open_dm_allows_all() {
        let c = AccountConfig {
            dm_policy: DmPolicy::Open,
            allow_from: vec!["*".into()],
            ..cfg()
        };
        let decision = decide("acct", &c, &dm("anyone@example.com"), &HostPorts::default()).await;
        assert!(matches!(decision, PolicyDecision::Allow { .. }));
    }

    #[tokio::test]
    async fn disabled_dm_drops() {
        let c = AccountConfig { dm_policy: DmPolicy::Disabled, ..cfg() };
        let decision = decide("acct", &c, &dm("user@example.com"), &HostPorts::default()).await;
        assert_eq!(decision, PolicyDecision::Drop { reason: "dms-disabled".into() });
    }

    #[tokio::test]
    async fn allowlist_dm_exact_match() {
        let c = AccountConfig {
            dm_policy: DmPolicy::Allowlist,
            allow_from: vec!["alice@example.com".into()],
            ..cfg()
        };
        let allowed = decide("acct", &c, &dm("alice@example.com"), &HostPorts::default()).await;
        assert!(matches!(allowed, PolicyDecision::Allow { .. }));

        let denied = decide("acct", &c, &dm("bob@example.com"), &HostPorts::default()).await;
        assert_eq!(denied, PolicyDecision::Drop { reason: "not-allowlisted".into() });
    }

    #[tokio::test]
    async fn allowlist_dm_domain_glob() {
        let c = AccountConfig {
            dm_policy: DmPolicy::Allowlist,
            allow_from: vec!["*@trusted.org".into()],
            ..cfg()
        };
        let allowed = decide("acct", &c, &dm("anyone@trusted.org"), &HostPorts::default()).await;
        assert!(matches!(allowed, PolicyDecision::Allow { .. }));
    }

    #[tokio::test]
    async fn pairing_dm_issues_challenge_with_no_store() {
        let c = AccountConfig { dm_policy: DmPolicy::Pairing, ..cfg() };
        let decision = decide("acct", &c, &dm("bob@example.com"), &HostPorts::default()).await;
        match decision {
            PolicyDecision::PairingChallenge { bare_jid, .. } => {
                assert_eq!(bare_jid, "bob@example.com");
            },
            other => panic!("expected pairing challenge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn group_disabled_drops() {
        let c = AccountConfig { group_policy: GroupPolicy::Disabled, ..cfg() };
        let decision = decide("acct", &c, &group_msg("room@conference.example.com", "alice", "hi"), &HostPorts::default()).await;
        assert_eq!(decision, PolicyDecision::Drop { reason: "groups-disabled".into() });
    }

    #[tokio::test]
    async fn group_allowlist_no_rooms_configured() {
        let c = AccountConfig { group_policy: GroupPolicy::Allowlist, ..cfg() };
        let decision = decide("acct", &c, &group_msg("room@conference.example.com", "alice", "hi"), &HostPorts::default()).await;
        assert_eq!(decision, PolicyDecision::Drop { reason: "no rooms configured".into() });
    }

    #[tokio::test]
    async fn group_allowlist_not_matching_room() {
        let mut rooms = HashMap::new();
        rooms.insert("room@conference.example.com".to_string(), crate::config::RoomConfig::default());
        let c = AccountConfig {
            group_policy: GroupPolicy::Allowlist,
            rooms,
            ..cfg()
        };
        let decision = decide("acct", &c, &group_msg("other@conference.example.com", "alice", "hi"), &HostPorts::default()).await;
        assert_eq!(decision, PolicyDecision::Drop { reason: "not-allowlisted".into() });
    }

    #[tokio::test]
    async fn group_sender_allowlist_per_room() {
        let mut rooms = HashMap::new();
        rooms.insert(
            "room@conference.example.com".to_string(),
            crate::config::RoomConfig {
                require_mention: Some(false),
                allow_from: vec!["alice@example.com".into()],
                ..Default::default()
            },
        );
        let c = AccountConfig { group_policy: GroupPolicy::Allowlist, rooms, ..cfg() };

        let allowed = decide("acct", &c, &group_msg("room@conference.example.com", "alice", "hi"), &HostPorts::default()).await;
        assert!(matches!(allowed, PolicyDecision::Allow { .. }));

        let denied = decide("acct", &c, &group_msg("room@conference.example.com", "bob", "hi"), &HostPorts::default()).await;
        assert_eq!(denied, PolicyDecision::Drop { reason: "not-allowlisted".into() });
    }

    #[tokio::test]
    async fn group_open_no_mention_required_wildcard_override() {
        let mut rooms = HashMap::new();
        rooms.insert("*".to_string(), crate::config::RoomConfig { require_mention: Some(false), ..Default::default() });
        let c = AccountConfig { group_policy: GroupPolicy::Open, rooms, ..cfg() };
        let decision = decide("acct", &c, &group_msg("room@conference.example.com", "alice", "hello room"), &HostPorts::default()).await;
        assert!(matches!(decision, PolicyDecision::Allow { .. }));
    }

    #[tokio::test]
    async fn group_missing_mention_drops() {
        let mut rooms = HashMap::new();
        rooms.insert(
            "room@conference.example.com".to_string(),
            crate::config::RoomConfig { require_mention: Some(true), ..Default::default() },
        );
        let c = AccountConfig { group_policy: GroupPolicy::Open, rooms, ..cfg() };
        let decision = decide("acct", &c, &group_msg("room@conference.example.com", "alice", "hello"), &HostPorts::default()).await;
        assert_eq!(decision, PolicyDecision::Drop { reason: "missing-mention".into() });
    }

    #[tokio::test]
    async fn group_mentioned_by_localpart_proceeds() {
        let mut rooms = HashMap::new();
        rooms.insert(
            "room@conference.example.com".to_string(),
            crate::config::RoomConfig { require_mention: Some(true), ..Default::default() },
        );
        let c = AccountConfig { group_policy: GroupPolicy::Open, rooms, ..cfg() };
        let decision = decide("acct", &c, &group_msg("room@conference.example.com", "alice", "bot: help"), &HostPorts::default()).await;
        assert!(matches!(decision, PolicyDecision::Allow { .. }));
    }

    #[tokio::test]
    async fn allow_decision_carries_was_mentioned_for_groups() {
        let mut rooms = HashMap::new();
        rooms.insert(
            "room@conference.example.com".to_string(),
            crate::config::RoomConfig { require_mention: Some(true), ..Default::default() },
        );
        let c = AccountConfig { group_policy: GroupPolicy::Open, rooms, ..cfg() };

        let mentioned = decide("acct", &c, &group_msg("room@conference.example.com", "alice", "bot: help"), &HostPorts::default()).await;
        assert_eq!(
            mentioned,
            PolicyDecision::Allow { reason: "open", was_mentioned: Some(true), command_authorized: false }
        );
    }

    #[test]
    fn was_mentioned_matches_localpart_word() {
        assert!(was_mentioned("bot: help me", "bot", &[]));
        assert!(was_mentioned("hey bot, are you there", "bot", &[]));
        assert!(!was_mentioned("robot help", "bot", &[]));
    }

    #[test]
    fn was_mentioned_matches_pattern() {
        assert!(was_mentioned("assistant please help", "bot", &["assistant".into()]));
    }
}
