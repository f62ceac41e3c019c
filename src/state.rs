//! Per-account runtime state held by the supervisor (`plugin.rs`).
//!
//! Key difference from a `Clone`-able client: `tokio_xmpp::Client` is not
//! `Clone`. We use an `mpsc::Sender<minidom::Element>` to hand outbound
//! stanzas to the event loop task, which alone owns the client.

use std::{
    collections::HashMap,
    sync::{Arc, atomic::AtomicBool},
};

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{account::Account, host::HostPorts, presence::PresenceTracker};

/// Shared account state map, guarded for concurrent account lifecycle ops.
pub type AccountStateMap = Arc<RwLock<HashMap<String, AccountState>>>;

/// Per-account runtime state: the resolved account, its cancellation
/// handle, the channel to its event loop, and connection bookkeeping.
pub struct AccountState {
    pub account_id: String,
    pub account: Account,
    pub ports: HostPorts,
    pub cancel: CancellationToken,
    /// Channel for sending outbound stanzas to the event loop task.
    pub stanza_tx: mpsc::Sender<crate::minidom::Element>,
    /// Whether the XMPP client is currently connected.
    pub connected: Arc<AtomicBool>,
    /// Per-account presence table; never shared across accounts (§5).
    pub presence: PresenceTracker,
}

impl AccountState {
    pub fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Relaxed)
    }
}
