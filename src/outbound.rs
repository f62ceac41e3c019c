//! Outbound sender: `sendMessage`/`sendMedia`/typing notifications (§4.7).
//!
//! Routes through the account's live event-loop client when connected
//! (via its `stanza_tx` channel), or opens a transient one-off connection
//! otherwise — `tokio_xmpp::Client` isn't `Clone`, so only one task at a
//! time ever owns a live connection for a given account.

use std::sync::Arc;

use {futures::StreamExt, secrecy::ExposeSecret, tokio::sync::mpsc, tracing::debug};

use tokio_xmpp::{Client, Event, parsers::jid::BareJid};

use crate::{
    account::Account,
    client,
    error::{AdapterError, Result},
    host::{ActivityDirection, ActivityEvent, HostPorts, MarkdownChunker, PassthroughMarkdown},
    inbound, jid,
    minidom::Element,
    stanza,
    state::AccountStateMap,
    xep::{chat_states, oob},
};

/// `sendMessage(to, text, {accountId, replyTo})`: normalizes `to`, converts
/// markdown tables, appends a `[reply:<id>]` marker when `reply_to` is
/// given, chooses `chat` vs `groupchat` from the target's shape, and
/// records outbound activity once delivered.
pub async fn send_message(accounts: &AccountStateMap, account_id: &str, to: &str, text: &str, reply_to: Option<&str>) -> Result<()> {
    let target = jid::normalize_jid(to).ok_or_else(|| AdapterError::InvalidTarget(to.to_string()))?;
    let (account, ports, live_tx) = account_context(accounts, account_id).await?;

    let markdown = markdown_chunker(&ports);
    let mut body = if account.config.markdown { markdown.convert_tables(text) } else { text.to_string() };
    if let Some(id) = reply_to {
        body.push_str(&format!("\n\n[reply:{id}]"));
    }

    let msg_type = msg_type_for(&target);
    let from = full_jid(&account);
    let elements: Vec<Element> = markdown
        .chunk(&body, account.config.text_chunk_limit)
        .iter()
        .map(|chunk| stanza::build_message(&from, &target, msg_type, chunk))
        .collect();

    dispatch(account_id, &account, live_tx, elements).await?;
    record_outbound(&ports, account_id).await;
    Ok(())
}

/// Send a `composing` chat-state notification (XEP-0085). A best-effort
/// signal: if the account isn't currently connected there is no live
/// client to send it through, and opening a transient connection just to
/// emit a disposable typing indicator isn't worth the round trip, so this
/// silently no-ops in that case.
pub async fn send_typing(accounts: &AccountStateMap, account_id: &str, to: &str) -> Result<()> {
    let target = jid::normalize_jid(to).ok_or_else(|| AdapterError::InvalidTarget(to.to_string()))?;
    let (account, _ports, live_tx) = account_context(accounts, account_id).await?;

    let Some(tx) = live_tx else {
        debug!(account_id, to = %target, "skipping typing notification: account not connected");
        return Ok(());
    };

    let msg_type = msg_type_for(&target);
    let from = full_jid(&account);
    let element = chat_states::build_chat_state(&from, &target, msg_type, chat_states::ChatState::Composing);
    tx.send(element)
        .await
        .map_err(|_| AdapterError::Transport(format!("xmpp event loop closed for account {account_id}")))
}

/// `sendMedia(to, url, mimeType?, description?)`: sent via XEP-0066 Out of
/// Band Data, rejected up front if `mimeType` is on the account's
/// `blockedMediaTypes` list.
pub async fn send_media(
    accounts: &AccountStateMap,
    account_id: &str,
    to: &str,
    url: &str,
    mime_type: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let target = jid::normalize_jid(to).ok_or_else(|| AdapterError::InvalidTarget(to.to_string()))?;
    let (account, ports, live_tx) = account_context(accounts, account_id).await?;

    if let Some(mime) = mime_type
        && account.config.blocked_media_types.iter().any(|blocked| blocked.eq_ignore_ascii_case(mime))
    {
        return Err(AdapterError::InvalidTarget(format!("media type {mime} is blocked for account {account_id}")));
    }

    let msg_type = msg_type_for(&target);
    let from = full_jid(&account);
    let element = oob::build_oob_message(&from, &target, msg_type, url, description);

    dispatch(account_id, &account, live_tx, vec![element]).await?;
    record_outbound(&ports, account_id).await;
    Ok(())
}

fn msg_type_for(target: &str) -> &'static str {
    if jid::is_room_jid(target) { "groupchat" } else { "chat" }
}

fn full_jid(account: &Account) -> String {
    format!("{}/{}", account.jid, account.resource)
}

fn markdown_chunker(ports: &HostPorts) -> Arc<dyn MarkdownChunker> {
    ports.markdown.clone().unwrap_or_else(|| Arc::new(PassthroughMarkdown))
}

async fn account_context(accounts: &AccountStateMap, account_id: &str) -> Result<(Account, HostPorts, Option<mpsc::Sender<Element>>)> {
    let map = accounts.read().await;
    let state = map
        .get(account_id)
        .ok_or_else(|| AdapterError::InvalidTarget(format!("unknown xmpp account: {account_id}")))?;
    let live_tx = state.is_connected().then(|| state.stanza_tx.clone());
    Ok((state.account.clone(), state.ports.clone(), live_tx))
}

async fn record_outbound(ports: &HostPorts, account_id: &str) {
    if let Some(recorder) = &ports.activity_recorder {
        let _ = recorder
            .record(ActivityEvent {
                channel: crate::host::CHANNEL_ID,
                account_id: account_id.to_string(),
                direction: ActivityDirection::Outbound,
                at_ms: inbound::now_ms(),
            })
            .await;
    }
}

async fn dispatch(account_id: &str, account: &Account, live_tx: Option<mpsc::Sender<Element>>, elements: Vec<Element>) -> Result<()> {
    match live_tx {
        Some(tx) => {
            for element in elements {
                tx.send(element)
                    .await
                    .map_err(|_| AdapterError::Transport(format!("xmpp event loop closed for account {account_id}")))?;
            }
            Ok(())
        },
        None => send_transient(account, elements).await,
    }
}

/// Open a one-off connection, send every element, then disconnect — used
/// when the account's persistent client isn't currently online.
async fn send_transient(account: &Account, elements: Vec<Element>) -> Result<()> {
    let jid: BareJid = account.jid.parse().map_err(|e| AdapterError::Config(format!("invalid JID '{}': {e}", account.jid)))?;
    let password = account.password.expose_secret().to_string();
    let mut transient = Client::new(jid, password);

    let online = tokio::time::timeout(std::time::Duration::from_millis(15_000), async {
        loop {
            match transient.next().await {
                Some(Event::Online { .. }) => return true,
                Some(Event::Disconnected(_)) => continue,
                Some(Event::Stanza(_)) => continue,
                None => return false,
            }
        }
    })
    .await;

    match online {
        Ok(true) => {},
        Ok(false) => return Err(AdapterError::Transport("transient client stream ended before coming online".into())),
        Err(_) => return Err(AdapterError::Transport("transient client connect timed out".into())),
    }

    for element in elements {
        client::send_raw_stanza(&mut transient, element).await.map_err(|e| AdapterError::Transport(e.to_string()))?;
    }

    let _ = transient.send_end().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, atomic::AtomicBool};

    use secrecy::Secret;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{account::PasswordSource, config::AccountConfig, stanza::ns, state::AccountState};

    async fn setup_account(rooms: Vec<String>) -> (AccountStateMap, mpsc::Receiver<Element>) {
        let (tx, rx) = mpsc::channel(16);
        let map: AccountStateMap = Arc::new(tokio::sync::RwLock::new(std::collections::HashMap::new()));
        let account = Account {
            account_id: "test".into(),
            jid: "bot@example.com".into(),
            resource: "agent-gateway".into(),
            host: None,
            port: 5222,
            tls: true,
            password: Secret::new("pass".into()),
            password_source: PasswordSource::Config,
            enabled: true,
            config: AccountConfig { auto_join_rooms: rooms, ..Default::default() },
        };
        let state = AccountState {
            account_id: "test".into(),
            account,
            ports: HostPorts::default(),
            cancel: CancellationToken::new(),
            stanza_tx: tx,
            connected: Arc::new(AtomicBool::new(true)),
            presence: crate::presence::PresenceTracker::new(),
        };
        map.write().await.insert("test".into(), state);
        (map, rx)
    }

    #[tokio::test]
    async fn send_text_dm() {
        let (accounts, mut rx) = setup_account(vec![]).await;
        send_message(&accounts, "test", "alice@example.com", "Hello!", None).await.unwrap();

        let el = rx.recv().await.unwrap();
        assert_eq!(el.name(), "message");
        assert_eq!(el.attr("type"), Some("chat"));
        assert_eq!(el.attr("to"), Some("alice@example.com"));
        let body = el.get_child("body", ns::JABBER_CLIENT).unwrap();
        assert_eq!(body.text(), "Hello!");
    }

    #[tokio::test]
    async fn send_text_groupchat() {
        let (accounts, mut rx) = setup_account(vec!["room@conference.example.com".into()]).await;
        send_message(&accounts, "test", "room@conference.example.com", "Hi room!", None).await.unwrap();

        let el = rx.recv().await.unwrap();
        assert_eq!(el.attr("type"), Some("groupchat"));
    }

    #[tokio::test]
    async fn reply_marker_is_appended() {
        let (accounts, mut rx) = setup_account(vec![]).await;
        send_message(&accounts, "test", "alice@example.com", "hi", Some("msg-1")).await.unwrap();

        let el = rx.recv().await.unwrap();
        let body = el.get_child("body", ns::JABBER_CLIENT).unwrap();
        assert!(body.text().ends_with("[reply:msg-1]"));
    }

    #[tokio::test]
    async fn invalid_target_is_rejected() {
        let (accounts, _rx) = setup_account(vec![]).await;
        let result = send_message(&accounts, "test", "not a jid!!", "hi", None).await;
        assert!(matches!(result, Err(AdapterError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn unknown_account_is_rejected() {
        let (accounts, _rx) = setup_account(vec![]).await;
        let result = send_message(&accounts, "nonexistent", "alice@example.com", "hi", None).await;
        assert!(matches!(result, Err(AdapterError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn send_typing_composing() {
        let (accounts, mut rx) = setup_account(vec![]).await;
        send_typing(&accounts, "test", "alice@example.com").await.unwrap();

        let el = rx.recv().await.unwrap();
        assert!(el.get_child("composing", ns::CHAT_STATES).is_some());
    }

    #[tokio::test]
    async fn send_media_oob() {
        let (accounts, mut rx) = setup_account(vec![]).await;
        send_media(&accounts, "test", "alice@example.com", "https://example.com/image.png", Some("image/png"), Some("a photo"))
            .await
            .unwrap();

        let el = rx.recv().await.unwrap();
        assert!(el.get_child("x", ns::OOB).is_some());
    }

    #[tokio::test]
    async fn blocked_media_type_is_rejected() {
        let (accounts, _rx) = setup_account(vec![]).await;
        {
            let mut map = accounts.write().await;
            map.get_mut("test").unwrap().account.config.blocked_media_types = vec!["image/gif".into()];
        }
        let result = send_media(&accounts, "test", "alice@example.com", "https://example.com/x.gif", Some("image/gif"), None).await;
        assert!(result.is_err());
    }
}
