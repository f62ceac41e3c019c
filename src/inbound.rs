//! Inbound pipeline: orchestrates policy → activity → routing → envelope →
//! session → agent dispatch → outbound delivery for one decoded message
//! (spec §4.6).

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    account::Account,
    host::{ActivityDirection, ActivityEvent, CHANNEL_ID, ContextPayload, HostPorts, Peer, PeerKind, ReplyChunk},
    message::InboundMessage,
    outbound,
    policy::{self, PolicyDecision},
    state::AccountStateMap,
};

const PROVIDER: &str = "xmpp";

/// Timestamp helper shared with `client.rs`/`outbound.rs`. Kept here because
/// the inbound pipeline is the first consumer; not a method on any type
/// since none of the three modules own "current time".
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Run policy on a decoded message and, if accepted, the full inbound
/// pipeline through to agent dispatch and reply delivery.
pub async fn handle_inbound(
    account_id: &str,
    account: &Account,
    ports: &HostPorts,
    msg: InboundMessage,
    accounts: &AccountStateMap,
) {
    let decision = policy::decide(account_id, &account.config, &msg, ports).await;

    match decision {
        PolicyDecision::Drop { reason } => {
            info!(account_id, target = %msg.target, reason, "inbound message dropped by policy");
        },
        PolicyDecision::PairingChallenge { bare_jid, reply_text } => {
            info!(account_id, bare_jid, "pairing challenge issued");
            if let Some(text) = reply_text
                && let Err(err) = outbound::send_message(accounts, account_id, &bare_jid, &text, None).await
            {
                warn!(account_id, bare_jid, %err, "failed to send pairing reply");
            }
        },
        PolicyDecision::Allow { reason, was_mentioned, command_authorized } => {
            info!(account_id, target = %msg.target, reason, "inbound message accepted");
            run_pipeline(account_id, account, ports, msg, was_mentioned, command_authorized, accounts).await;
        },
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    account_id: &str,
    account: &Account,
    ports: &HostPorts,
    msg: InboundMessage,
    was_mentioned: Option<bool>,
    command_authorized: bool,
    accounts: &AccountStateMap,
) {
    let now = now_ms();

    record_activity(ports, account_id, ActivityDirection::Inbound, now).await;

    let peer = Peer {
        kind: if msg.is_group { PeerKind::Group } else { PeerKind::Direct },
        id: msg.target.clone(),
    };

    let route = match &ports.routing_resolver {
        Some(resolver) => match resolver.resolve_route(CHANNEL_ID, account_id, &peer).await {
            Ok(route) => route,
            Err(err) => {
                warn!(account_id, %err, "route resolution failed, falling back to raw peer id");
                peer.id.clone()
            },
        },
        None => peer.id.clone(),
    };
    let session_key = format!("{CHANNEL_ID}:{account_id}:{route}");

    let previous_session_ms = match &ports.session_store {
        Some(store) => store.previous_session_timestamp(&session_key).await.unwrap_or_default(),
        None => None,
    };

    let sender_name = msg.sender_nickname.clone().unwrap_or_else(|| msg.sender_bare_jid.clone());

    let body = match &ports.envelope_formatter {
        Some(formatter) => formatter.format_envelope(CHANNEL_ID, &sender_name, now, previous_session_ms, &msg.text),
        None => msg.text.clone(),
    };

    if let Some(store) = &ports.session_store {
        let _ = store.record_inbound(&session_key, now).await;
    }

    let (room_cfg, wildcard_cfg) = if msg.is_group {
        account.config.room_config(&msg.target)
    } else {
        (None, None)
    };
    let room_cfg = room_cfg.or(wildcard_cfg);

    let from = if msg.is_group {
        format!("xmpp:room:{}", msg.target)
    } else {
        format!("xmpp:{}", msg.sender_bare_jid)
    };
    let to = format!("xmpp:{route}");

    let payload = ContextPayload {
        body,
        raw_body: msg.text.clone(),
        command_body: command_authorized.then(|| msg.text.clone()),
        from,
        to: to.clone(),
        session_key,
        account_id: account_id.to_string(),
        chat_type: if msg.is_group { "group".to_string() } else { "direct".to_string() },
        conversation_label: if msg.is_group { format!("room:{}", msg.target) } else { format!("dm:{}", msg.target) },
        sender_name,
        sender_id: msg.sender_bare_jid.clone(),
        group_subject: None,
        group_system_prompt: room_cfg.and_then(|c| c.system_prompt.clone()),
        provider: PROVIDER,
        was_mentioned,
        message_sid: msg.message_id.clone(),
        timestamp_ms: msg.timestamp_ms,
        originating_channel: CHANNEL_ID,
        originating_to: to,
        command_authorized,
    };

    let Some(dispatcher) = ports.agent_dispatcher.clone() else {
        warn!(account_id, "no agent dispatcher configured, dropping accepted message");
        return;
    };

    let skills = room_cfg.map(|c| c.skills.clone()).unwrap_or_default();
    let block_streaming = account.config.block_streaming;

    let deliver_account_id = account_id.to_string();
    let deliver_target = msg.target.clone();
    let deliver_reply_to = msg.stanza_id.clone();
    let deliver_accounts = accounts.clone();

    let deliver: crate::host::ReplySink = Arc::new(move |chunk: ReplyChunk| {
        let account_id = deliver_account_id.clone();
        let target = deliver_target.clone();
        let reply_to = deliver_reply_to.clone();
        let accounts = deliver_accounts.clone();
        Box::pin(async move {
            outbound::send_message(&accounts, &account_id, &target, &chunk.text, reply_to.as_deref())
                .await
                .map_err(Into::into)
        })
    });

    if let Err(err) = dispatcher.dispatch(payload, &skills, block_streaming, deliver).await {
        warn!(account_id, %err, "agent dispatch failed");
    }
}

async fn record_activity(ports: &HostPorts, account_id: &str, direction: ActivityDirection, at_ms: i64) {
    if let Some(recorder) = &ports.activity_recorder {
        let _ = recorder
            .record(ActivityEvent { channel: CHANNEL_ID, account_id: account_id.to_string(), direction, at_ms })
            .await;
    }
}
