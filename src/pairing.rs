//! Pairing: first-contact challenge/approve flow gating unknown DM senders
//! under `dmPolicy=pairing` (spec §4.5).

use tracing::warn;

use crate::{error::Result, host::HostPorts, outbound, policy::PolicyDecision, state::AccountStateMap};

/// Fixed message sent to a bare JID once its pairing request is approved.
pub const APPROVED_MESSAGE: &str = "You're approved. Send a message to get started.";

/// Idempotently challenge `bare_jid`: upsert the pairing request, and if
/// the store reports this is the first time, build the one-line pairing
/// instruction reply. A store error still drops the message, but with no
/// reply (the store failure is logged, not surfaced to the sender).
pub async fn challenge(bare_jid: &str, ports: &HostPorts) -> PolicyDecision {
    let bare_jid = bare_jid.to_lowercase();

    let Some(store) = &ports.pairing_store else {
        return PolicyDecision::PairingChallenge { bare_jid, reply_text: None };
    };

    match store.upsert_pairing_request(crate::host::CHANNEL_ID, &bare_jid).await {
        Ok(result) if result.created => match store.build_pairing_reply(crate::host::CHANNEL_ID, &bare_jid).await {
            Ok(text) => PolicyDecision::PairingChallenge { bare_jid, reply_text: Some(text) },
            Err(err) => {
                warn!(bare_jid, %err, "pairing store failed to build reply");
                PolicyDecision::PairingChallenge { bare_jid, reply_text: None }
            },
        },
        Ok(_) => PolicyDecision::PairingChallenge { bare_jid, reply_text: None },
        Err(err) => {
            warn!(bare_jid, %err, "pairing store upsert failed");
            PolicyDecision::PairingChallenge { bare_jid, reply_text: None }
        },
    }
}

/// Invoked when the external pairing subsystem approves a previously
/// challenged bare JID: sends the fixed approval message to that JID over
/// `account_id`'s connection. Approval does not emit server-side
/// subscription presence (matches the behavior being preserved here; see
/// DESIGN.md).
pub async fn notify_approval(accounts: &AccountStateMap, account_id: &str, bare_jid: &str) -> Result<()> {
    outbound::send_message(accounts, account_id, bare_jid, APPROVED_MESSAGE, None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn challenge_without_store_has_no_reply() {
        let decision = challenge("Bob@Example.com", &HostPorts::default()).await;
        match decision {
            PolicyDecision::PairingChallenge { bare_jid, reply_text } => {
                assert_eq!(bare_jid, "bob@example.com");
                assert!(reply_text.is_none());
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn approval_sends_fixed_message_to_bare_jid() {
        use std::sync::{Arc, atomic::AtomicBool};

        use secrecy::Secret;
        use tokio::sync::mpsc;
        use tokio_util::sync::CancellationToken;

        use crate::{account::PasswordSource, config::AccountConfig, stanza::ns, state::AccountState};

        let (tx, mut rx) = mpsc::channel(16);
        let accounts: AccountStateMap = Arc::new(tokio::sync::RwLock::new(std::collections::HashMap::new()));
        let account = crate::account::Account {
            account_id: "test".into(),
            jid: "bot@example.com".into(),
            resource: "agent-gateway".into(),
            host: None,
            port: 5222,
            tls: true,
            password: Secret::new("pass".into()),
            password_source: PasswordSource::Config,
            enabled: true,
            config: AccountConfig::default(),
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
        accounts.write().await.insert("test".into(), state);

        notify_approval(&accounts, "test", "bob@example.com").await.unwrap();

        let el = rx.recv().await.unwrap();
        assert_eq!(el.attr("to"), Some("bob@example.com"));
        let body = el.get_child("body", ns::JABBER_CLIENT).unwrap();
        assert_eq!(body.text(), APPROVED_MESSAGE);
    }
}
