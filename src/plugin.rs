//! XMPP channel plugin: owns the account map, spawns/cancels per-account
//! event loops, and exposes the account lifecycle and outbound operations
//! named in §6's "Plugin API exposed".

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Instant,
};

use tracing::{info, warn};

use crate::{
    account::{self, Account, EnvOverrides},
    client,
    config::AccountConfig,
    error::{AdapterError, Result},
    host::HostPorts,
    outbound,
    state::AccountStateMap,
};

/// Cache TTL for probe results.
const PROBE_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(30);

/// Capability set this channel exposes, per §6: `{chatTypes:[direct,group],
/// media:true, blockStreaming:true, edit:true, reply:true}`.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub chat_types: Vec<&'static str>,
    pub media: bool,
    pub block_streaming: bool,
    pub edit: bool,
    pub reply: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { chat_types: vec!["direct", "group"], media: true, block_streaming: true, edit: true, reply: true }
    }
}

/// Connection health for one account, returned by the status probe.
#[derive(Debug, Clone)]
pub struct ChannelHealthSnapshot {
    pub account_id: String,
    pub connected: bool,
    pub details: Option<String>,
}

/// XMPP channel plugin.
pub struct XmppPlugin {
    accounts: AccountStateMap,
    base_config: AccountConfig,
    account_configs: HashMap<String, AccountConfig>,
    ports: HostPorts,
    probe_cache: RwLock<HashMap<String, (ChannelHealthSnapshot, Instant)>>,
}

impl XmppPlugin {
    pub fn new(base_config: AccountConfig, ports: HostPorts) -> Self {
        Self {
            accounts: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            base_config,
            account_configs: HashMap::new(),
            ports,
            probe_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &'static str {
        crate::host::CHANNEL_ID
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Register (but do not start) a per-account configuration override.
    pub fn with_account_config(mut self, account_id: impl Into<String>, config: AccountConfig) -> Self {
        self.account_configs.insert(account::normalize_account_id(&account_id.into()), config);
        self
    }

    /// Account ids currently running an event loop.
    pub fn account_ids(&self) -> Vec<String> {
        match self.accounts.try_read() {
            Ok(accounts) => accounts.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Resolve one account's configuration per §4.3 (base + override + env),
    /// without starting it.
    pub fn resolve_account(&self, account_id: Option<&str>, pinned: bool) -> Account {
        let env = if account_id.is_none() || account_id == Some(account::DEFAULT_ACCOUNT_ID) {
            EnvOverrides::from_env()
        } else {
            EnvOverrides::empty()
        };
        account::resolve_account(&self.base_config, &self.account_configs, account_id, pinned, &env)
    }

    /// The account resolved when no account id is supplied.
    pub fn default_account(&self) -> Account {
        self.resolve_account(None, false)
    }

    /// `startAccount`: validate and start this account's event loop.
    pub async fn start_account(&self, account_id: &str) -> Result<()> {
        let account = self.resolve_account(Some(account_id), true);

        if !account.is_configured() {
            return Err(AdapterError::Config(format!("account {account_id} is missing a jid or password")));
        }
        account.config.validate()?;

        info!(account_id, jid = %account.jid, "starting xmpp account");

        client::start_event_loop(account, self.ports.clone(), Arc::clone(&self.accounts))
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))
    }

    /// Stop a running account's event loop, if any.
    pub async fn stop_account(&self, account_id: &str) -> Result<()> {
        let cancel = {
            let accounts = self.accounts.read().await;
            accounts.get(account_id).map(|s| s.cancel.clone())
        };

        match cancel {
            Some(cancel) => {
                info!(account_id, "stopping xmpp account");
                cancel.cancel();
                self.accounts.write().await.remove(account_id);
            },
            None => warn!(account_id, "xmpp account not running"),
        }

        Ok(())
    }

    /// `setEnabled`: start or stop the account's event loop to match `enabled`.
    pub async fn set_enabled(&self, account_id: &str, enabled: bool) -> Result<()> {
        if enabled { self.start_account(account_id).await } else { self.stop_account(account_id).await }
    }

    /// `delete`: stop the account and forget its configuration override.
    pub async fn delete_account(&mut self, account_id: &str) -> Result<()> {
        self.stop_account(account_id).await?;
        self.account_configs.remove(&account::normalize_account_id(account_id));
        Ok(())
    }

    /// Outbound `sendText`.
    pub async fn send_text(&self, account_id: &str, to: &str, text: &str, reply_to: Option<&str>) -> Result<()> {
        outbound::send_message(&self.accounts, account_id, to, text, reply_to).await
    }

    /// Outbound `sendMedia`.
    pub async fn send_media(&self, account_id: &str, to: &str, url: &str, mime_type: Option<&str>, description: Option<&str>) -> Result<()> {
        outbound::send_media(&self.accounts, account_id, to, url, mime_type, description).await
    }

    /// Pairing adapter: notify `bare_jid` that its pairing request on
    /// `account_id` has been approved (§4.5/§6).
    pub async fn notify_pairing_approved(&self, account_id: &str, bare_jid: &str) -> Result<()> {
        crate::pairing::notify_approval(&self.accounts, account_id, bare_jid).await
    }

    /// Status probe, cached for `PROBE_CACHE_TTL`.
    pub async fn probe(&self, account_id: &str) -> ChannelHealthSnapshot {
        if let Ok(cache) = self.probe_cache.read()
            && let Some((snap, ts)) = cache.get(account_id)
            && ts.elapsed() < PROBE_CACHE_TTL
        {
            return snap.clone();
        }

        let connected = {
            let accounts = self.accounts.read().await;
            accounts.get(account_id).map(|s| s.is_connected())
        };

        let result = match connected {
            Some(true) => ChannelHealthSnapshot { account_id: account_id.to_string(), connected: true, details: Some("connected".into()) },
            Some(false) => {
                ChannelHealthSnapshot { account_id: account_id.to_string(), connected: false, details: Some("disconnected (reconnecting)".into()) }
            },
            None => ChannelHealthSnapshot { account_id: account_id.to_string(), connected: false, details: Some("account not started".into()) },
        };

        if let Ok(mut cache) = self.probe_cache.write() {
            cache.insert(account_id.to_string(), (result.clone(), Instant::now()));
        }

        result
    }
}
