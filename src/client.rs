//! XMPP client event loop.
//!
//! Spawns a tokio task that owns the `tokio_xmpp::Client`, reads events
//! from it, and accepts outbound stanzas via an `mpsc` channel. Stanzas are
//! assembled and inspected as raw `crate::minidom::Element`s; only the
//! transport boundary below converts to/from `tokio_xmpp::parsers` types.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    anyhow::Result,
    futures::StreamExt,
    secrecy::ExposeSecret,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use tokio_xmpp::{
    Client, Event, Stanza,
    parsers::{jid::BareJid, message::Message, presence::Presence},
};

use crate::{
    account::Account,
    host::HostPorts,
    inbound, jid,
    message::InboundMessage,
    minidom::Element,
    stanza,
    state::{AccountState, AccountStateMap},
    xep::muc,
};

/// Size of the outbound stanza channel.
const STANZA_CHANNEL_SIZE: usize = 256;

/// Default connect timeout, per §4.2.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Delay between sending MUC join presence and the owner-config-submit IQ
/// that unlocks a freshly created room, per §4.2's join protocol.
const MUC_UNLOCK_DELAY_MS: u64 = 500;

/// Start the XMPP event loop for one account: registers its state and
/// spawns a background task that processes events until cancelled.
pub async fn start_event_loop(account: Account, ports: HostPorts, accounts: AccountStateMap) -> Result<()> {
    let account_id = account.account_id.clone();

    let (stanza_tx, stanza_rx) = mpsc::channel(STANZA_CHANNEL_SIZE);
    let cancel = CancellationToken::new();
    let connected = Arc::new(AtomicBool::new(false));

    {
        let state = AccountState {
            account_id: account_id.clone(),
            account: account.clone(),
            ports: ports.clone(),
            cancel: cancel.clone(),
            stanza_tx: stanza_tx.clone(),
            connected: Arc::clone(&connected),
            presence: crate::presence::PresenceTracker::new(),
        };
        accounts.write().await.insert(account_id.clone(), state);
    }

    let accounts_clone = Arc::clone(&accounts);
    tokio::spawn(async move {
        if let Err(e) = run_event_loop(account_id.clone(), account, ports, stanza_rx, cancel, connected, accounts_clone).await {
            tracing::error!(account_id, "xmpp event loop error: {e}");
        }
    });

    Ok(())
}

/// The main event loop — owns the `tokio_xmpp::Client`.
async fn run_event_loop(
    account_id: String,
    account: Account,
    ports: HostPorts,
    mut stanza_rx: mpsc::Receiver<Element>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    accounts: AccountStateMap,
) -> Result<()> {
    let jid: BareJid = account
        .jid
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid JID '{}': {e}", account.jid))?;
    let password = account.password.expose_secret().to_string();
    let mut client = Client::new(jid.clone(), password);

    info!(account_id, jid = %jid, "xmpp event loop started");

    match tokio::time::timeout(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS), wait_for_online(&mut client)).await {
        Ok(true) => {
            connected.store(true, Ordering::Relaxed);
            info!(account_id, "xmpp connected");
            on_online(&account_id, &account, &mut client).await;
        },
        Ok(false) => {
            warn!(account_id, "xmpp stream ended before coming online");
            cleanup(&accounts, &account_id).await;
            return Ok(());
        },
        Err(_) => {
            warn!(account_id, timeout_ms = DEFAULT_CONNECT_TIMEOUT_MS, "xmpp connect timed out");
            cleanup(&accounts, &account_id).await;
            return Ok(());
        },
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(account_id, "xmpp event loop cancelled, disconnecting");
                connected.store(false, Ordering::Relaxed);
                let full_jid = format!("{}/{}", account.jid, account.resource);
                let unavailable = stanza::build_unavailable(&full_jid, None);
                let _ = send_raw_stanza(&mut client, unavailable).await;
                let _ = client.send_end().await;
                break;
            }

            stanza = stanza_rx.recv() => {
                match stanza {
                    Some(element) => {
                        if let Err(e) = send_raw_stanza(&mut client, element).await {
                            warn!(account_id, "failed to send stanza: {e}");
                        }
                    },
                    None => {
                        info!(account_id, "stanza channel closed, shutting down");
                        break;
                    },
                }
            }

            event = client.next() => {
                match event {
                    Some(Event::Online { bound_jid, resumed }) => {
                        info!(account_id, %bound_jid, resumed, "xmpp reconnected");
                        connected.store(true, Ordering::Relaxed);
                        on_online(&account_id, &account, &mut client).await;
                    },

                    Some(Event::Disconnected(err)) => {
                        warn!(account_id, %err, "xmpp disconnected (will auto-reconnect)");
                        connected.store(false, Ordering::Relaxed);
                    },

                    Some(Event::Stanza(stanza)) => {
                        handle_stanza(&account_id, &account, &ports, stanza, &accounts).await;
                    },

                    None => {
                        info!(account_id, "xmpp stream ended");
                        connected.store(false, Ordering::Relaxed);
                        break;
                    },
                }
            }
        }
    }

    cleanup(&accounts, &account_id).await;
    info!(account_id, "xmpp event loop exited");

    Ok(())
}

/// Drive the client until it reports `Online`, ignoring anything else
/// (the stream shouldn't emit stanzas before bind completes, but we don't
/// assume that). Returns `false` if the stream ends first.
async fn wait_for_online(client: &mut Client) -> bool {
    loop {
        match client.next().await {
            Some(Event::Online { .. }) => return true,
            Some(Event::Disconnected(_)) | Some(Event::Stanza(_)) => continue,
            None => return false,
        }
    }
}

/// Send initial presence and join every configured room (§4.2 step 3).
async fn on_online(account_id: &str, account: &Account, client: &mut Client) {
    let full_jid = format!("{}/{}", account.jid, account.resource);
    let presence = stanza::build_presence(&full_jid, None);
    if let Err(e) = send_raw_stanza(client, presence).await {
        warn!(account_id, "failed to send initial presence: {e}");
    }

    for room in &account.config.auto_join_rooms {
        if let Err(e) = join_room(account_id, &full_jid, room, client).await {
            warn!(account_id, room, "failed to join MUC room: {e}");
        }
    }
}

/// MUC join protocol (§4.2 step 3): directed join presence, a short delay
/// to let the service finish creating the room, then an owner-config-submit
/// IQ accepting defaults — a no-op against pre-existing rooms, and the step
/// that unlocks ones our own join just created.
async fn join_room(account_id: &str, full_jid: &str, room: &str, client: &mut Client) -> Result<()> {
    let room_with_nick = format!("{room}/{}", full_jid.rsplit('/').next().unwrap_or_default());
    let join = muc::build_join_presence(full_jid, &room_with_nick);
    send_raw_stanza(client, join).await?;
    debug!(account_id, room, "sent MUC join presence");

    tokio::time::sleep(Duration::from_millis(MUC_UNLOCK_DELAY_MS)).await;

    let iq_id = stanza::new_message_id();
    let unlock = muc::build_owner_config_submit(full_jid, room, &iq_id);
    send_raw_stanza(client, unlock).await?;
    debug!(account_id, room, "sent MUC owner-config-submit");

    Ok(())
}

async fn handle_stanza(account_id: &str, account: &Account, ports: &HostPorts, stanza: Stanza, accounts: &AccountStateMap) {
    match stanza {
        Stanza::Message(msg) => handle_message(account_id, account, ports, msg, accounts).await,
        Stanza::Presence(pres) => handle_presence(account_id, pres, accounts).await,
        Stanza::Iq(iq) => {
            let element: Element = iq.into();
            debug!(
                account_id,
                id = element.attr("id"),
                from = element.attr("from"),
                type_ = element.attr("type"),
                "received iq stanza"
            );
        },
    }
}

/// Decode a message stanza into an `InboundMessage` and hand it to the
/// inbound pipeline, dropping it first per the rules in §8: no body, no
/// `from`, a group message with no resolvable nickname, or a self-echo.
async fn handle_message(account_id: &str, account: &Account, ports: &HostPorts, msg: Message, accounts: &AccountStateMap) {
    let element: Element = msg.into();

    let Some(text) = stanza::body_text(&element) else {
        return;
    };
    let Some(from) = element.attr("from").map(str::to_string) else {
        return;
    };

    let is_group = element.attr("type") == Some("groupchat");

    let sender_nickname = is_group.then(|| jid::occupant_nickname(&from)).flatten();
    if is_group && sender_nickname.is_none() {
        return;
    }

    let sender_resource = jid::parse_jid(&from).and_then(|p| p.resource);
    let sender_bare_jid = if is_group {
        muc::occupant_real_jid(&element)
            .and_then(|real| jid::normalize_jid(&real))
            .unwrap_or_else(|| jid::normalize_jid(&from).unwrap_or_else(|| from.clone()))
    } else {
        jid::normalize_jid(&from).unwrap_or_else(|| from.clone())
    };

    if sender_bare_jid.eq_ignore_ascii_case(&account.jid) {
        return;
    }
    if is_group && sender_nickname.as_deref() == Some(account.resource.as_str()) {
        return;
    }

    let target = if is_group {
        jid::parse_jid(&from).map(|p| p.bare()).unwrap_or_else(|| from.clone())
    } else {
        sender_bare_jid.clone()
    };

    let stanza_id = element.attr("id").map(str::to_string);
    let message_id = stanza_id.clone().unwrap_or_else(stanza::new_message_id);
    let timestamp_ms = stanza::delay_timestamp_ms(&element).unwrap_or_else(inbound::now_ms);

    let inbound_msg = InboundMessage {
        message_id,
        target,
        raw_target: element.attr("to").map(str::to_string),
        sender_jid: from,
        sender_bare_jid,
        sender_resource,
        sender_nickname,
        text,
        timestamp_ms,
        is_group,
        stanza_id,
        correction_of: stanza::correction_target(&element),
        reply_to: stanza::reply_origin(&element),
    };

    inbound::handle_inbound(account_id, account, ports, inbound_msg, accounts).await;
}

/// Decode a presence stanza and feed it to this account's presence tracker
/// (never shared across accounts, per §5).
async fn handle_presence(account_id: &str, pres: Presence, accounts: &AccountStateMap) {
    let element: Element = pres.into();
    let Some(from) = element.attr("from") else {
        return;
    };
    let Some(bare) = jid::parse_jid(from).map(|p| p.bare()) else {
        return;
    };

    let available = !matches!(element.attr("type"), Some("unavailable") | Some("error"));
    let status = stanza::presence_status(&element);
    let show = stanza::presence_show(&element);
    let priority = stanza::presence_priority(&element);
    let now = inbound::now_ms();

    let mut map = accounts.write().await;
    if let Some(state) = map.get_mut(account_id) {
        state.presence.update(&bare, available, status, show, priority, now);
    }
}

async fn cleanup(accounts: &AccountStateMap, account_id: &str) {
    accounts.write().await.remove(account_id);
}

/// Convert a `crate::minidom::Element` into the matching typed stanza and
/// send it.
pub(crate) async fn send_raw_stanza(client: &mut Client, element: Element) -> Result<()> {
    let stanza: Stanza = match element.name() {
        "message" => {
            let msg = tokio_xmpp::parsers::message::Message::try_from(element)
                .map_err(|e| anyhow::anyhow!("invalid message stanza: {e}"))?;
            msg.into()
        },
        "presence" => {
            let pres = tokio_xmpp::parsers::presence::Presence::try_from(element)
                .map_err(|e| anyhow::anyhow!("invalid presence stanza: {e}"))?;
            pres.into()
        },
        "iq" => {
            let iq = tokio_xmpp::parsers::iq::Iq::try_from(element).map_err(|e| anyhow::anyhow!("invalid iq stanza: {e}"))?;
            iq.into()
        },
        other => return Err(anyhow::anyhow!("unsupported stanza type: {other}")),
    };

    client.send_stanza(stanza).await.map_err(|e| anyhow::anyhow!("failed to send stanza: {e}"))?;

    Ok(())
}
