//! Account resolver: merges base + per-account configuration, applies
//! environment fallbacks for the `default` account, and resolves the
//! account's password.

use std::collections::HashMap;

use secrecy::Secret;

use crate::config::AccountConfig;

/// The account id used when `channels.xmpp.accounts` is absent.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Normalize an account id: trim whitespace, lowercase.
pub fn normalize_account_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A resolved, ready-to-connect account.
#[derive(Clone)]
pub struct Account {
    pub account_id: String,
    pub jid: String,
    pub resource: String,
    pub host: Option<String>,
    pub port: u16,
    pub tls: bool,
    pub password: Secret<String>,
    pub password_source: PasswordSource,
    pub enabled: bool,
    pub config: AccountConfig,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("account_id", &self.account_id)
            .field("jid", &self.jid)
            .field("resource", &self.resource)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("password_source", &self.password_source)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Where the account's password came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    Env,
    PasswordFile,
    Config,
    None,
}

impl Account {
    /// `configured = jid ≠ "" ∧ password ≠ ""`.
    pub fn is_configured(&self) -> bool {
        !self.jid.is_empty() && !secrecy::ExposeSecret::expose_secret(&self.password).is_empty()
    }

    /// The bare JID this account connects as.
    pub fn bare_jid(&self) -> &str {
        &self.jid
    }

    /// The effective connect host: explicit `host`, else the JID's domain.
    pub fn effective_host(&self) -> Option<String> {
        self.host
            .clone()
            .or_else(|| crate::jid::parse_jid(&self.jid).map(|p| p.domain))
    }
}

/// Environment overrides consulted only for `accountId = default`.
pub struct EnvOverrides {
    pub xmpp_password: Option<String>,
    pub xmpp_jid: Option<String>,
    pub xmpp_host: Option<String>,
    pub xmpp_port: Option<String>,
    pub xmpp_tls: Option<String>,
    pub xmpp_rooms: Option<String>,
}

impl EnvOverrides {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self {
            xmpp_password: std::env::var("XMPP_PASSWORD").ok(),
            xmpp_jid: std::env::var("XMPP_JID").ok(),
            xmpp_host: std::env::var("XMPP_HOST").ok(),
            xmpp_port: std::env::var("XMPP_PORT").ok(),
            xmpp_tls: std::env::var("XMPP_TLS").ok(),
            xmpp_rooms: std::env::var("XMPP_ROOMS").ok(),
        }
    }

    /// No overrides present; used in tests and for non-default accounts.
    pub fn empty() -> Self {
        Self {
            xmpp_password: None,
            xmpp_jid: None,
            xmpp_host: None,
            xmpp_port: None,
            xmpp_tls: None,
            xmpp_rooms: None,
        }
    }
}

/// Merge the base `channels.xmpp` config with a per-account override.
/// Account fields win wherever they diverge from default; collections are
/// replaced wholesale rather than merged element-wise.
pub fn merge_account_config(base: &AccountConfig, account: Option<&AccountConfig>) -> AccountConfig {
    let Some(account) = account else {
        return base.clone();
    };
    let default = AccountConfig::default();
    AccountConfig {
        jid: if account.jid != default.jid { account.jid.clone() } else { base.jid.clone() },
        password: if secrecy::ExposeSecret::expose_secret(&account.password).is_empty() {
            Secret::new(secrecy::ExposeSecret::expose_secret(&base.password).clone())
        } else {
            Secret::new(secrecy::ExposeSecret::expose_secret(&account.password).clone())
        },
        password_file: account.password_file.clone().or_else(|| base.password_file.clone()),
        resource: if account.resource != default.resource { account.resource.clone() } else { base.resource.clone() },
        host: account.host.clone().or_else(|| base.host.clone()),
        port: if account.port != default.port { account.port } else { base.port },
        tls: account.tls,
        dm_policy: account.dm_policy,
        allow_from: if !account.allow_from.is_empty() { account.allow_from.clone() } else { base.allow_from.clone() },
        group_policy: account.group_policy,
        group_allow_from: if !account.group_allow_from.is_empty() {
            account.group_allow_from.clone()
        } else {
            base.group_allow_from.clone()
        },
        rooms: if !account.rooms.is_empty() { account.rooms.clone() } else { base.rooms.clone() },
        auto_join_rooms: if !account.auto_join_rooms.is_empty() {
            account.auto_join_rooms.clone()
        } else {
            base.auto_join_rooms.clone()
        },
        mention_patterns: if !account.mention_patterns.is_empty() {
            account.mention_patterns.clone()
        } else {
            base.mention_patterns.clone()
        },
        markdown: account.markdown,
        history_limit: if account.history_limit != default.history_limit {
            account.history_limit
        } else {
            base.history_limit
        },
        response_prefix: account.response_prefix.clone().or_else(|| base.response_prefix.clone()),
        block_streaming: account.block_streaming,
        text_chunk_limit: if account.text_chunk_limit != default.text_chunk_limit {
            account.text_chunk_limit
        } else {
            base.text_chunk_limit
        },
        media_max_mb: if account.media_max_mb != default.media_max_mb {
            account.media_max_mb
        } else {
            base.media_max_mb
        },
        blocked_media_types: if !account.blocked_media_types.is_empty() {
            account.blocked_media_types.clone()
        } else {
            base.blocked_media_types.clone()
        },
        model: account.model.clone().or_else(|| base.model.clone()),
        model_provider: account.model_provider.clone().or_else(|| base.model_provider.clone()),
    }
}

/// Resolve one account by id.
///
/// `accounts` maps account id → per-account config overrides; empty means
/// "synthesize a single `default` account" from `base` alone.
pub fn resolve_account(
    base: &AccountConfig,
    accounts: &HashMap<String, AccountConfig>,
    requested_id: Option<&str>,
    pinned: bool,
    env: &EnvOverrides,
) -> Account {
    let requested = requested_id
        .map(normalize_account_id)
        .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string());

    let account = resolve_one(base, accounts, &requested, env);

    if !account.is_configured() && !pinned && requested != DEFAULT_ACCOUNT_ID {
        let fallback = resolve_one(base, accounts, DEFAULT_ACCOUNT_ID, env);
        if fallback.is_configured() {
            return fallback;
        }
    }
    account
}

fn resolve_one(
    base: &AccountConfig,
    accounts: &HashMap<String, AccountConfig>,
    account_id: &str,
    env: &EnvOverrides,
) -> Account {
    let merged = merge_account_config(base, accounts.get(account_id));
    let is_default = account_id == DEFAULT_ACCOUNT_ID;

    let (password, password_source) = if is_default && env.xmpp_password.is_some() {
        (
            Secret::new(env.xmpp_password.clone().unwrap_or_default()),
            PasswordSource::Env,
        )
    } else if let Some(path) = &merged.password_file {
        match std::fs::read_to_string(path) {
            Ok(contents) => (Secret::new(contents.trim().to_string()), PasswordSource::PasswordFile),
            Err(_) => (Secret::new(String::new()), PasswordSource::None),
        }
    } else if !secrecy::ExposeSecret::expose_secret(&merged.password).is_empty() {
        (merged.password.clone(), PasswordSource::Config)
    } else {
        (Secret::new(String::new()), PasswordSource::None)
    };

    let jid = if is_default {
        env.xmpp_jid.clone().unwrap_or(merged.jid)
    } else {
        merged.jid
    };
    let host = if is_default {
        env.xmpp_host.clone().or(merged.host)
    } else {
        merged.host
    };
    let port = if is_default {
        env.xmpp_port
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(merged.port)
    } else {
        merged.port
    };
    let tls = if is_default {
        env.xmpp_tls.as_deref().map(parse_bool).unwrap_or(merged.tls)
    } else {
        merged.tls
    };

    let mut config = merged.clone();
    config.jid = jid.clone();
    config.host = host.clone();
    config.port = port;
    config.tls = tls;
    config.password = password.clone();

    if is_default {
        if let Some(rooms_csv) = &env.xmpp_rooms {
            let rooms: Vec<String> = rooms_csv
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !rooms.is_empty() {
                config.auto_join_rooms = rooms;
            }
        }
    }

    Account {
        account_id: account_id.to_string(),
        jid,
        resource: merged.resource,
        host,
        port,
        tls,
        password,
        password_source,
        enabled: true,
        config,
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
