//! XMPP channel adapter.
//!
//! Bridges an agent gateway to an XMPP/Jabber network using `tokio-xmpp`
//! for direct stanza-level control, supporting 1:1 chats and MUC
//! (XEP-0045) group conferences.

pub mod account;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod inbound;
pub mod jid;
pub mod message;
pub mod outbound;
pub mod pairing;
pub mod plugin;
pub mod policy;
pub mod presence;
pub mod stanza;
pub mod state;
pub mod xep;

/// Re-export tokio-xmpp's minidom to avoid version conflicts.
/// All modules in this crate should use `crate::minidom` instead of
/// importing minidom directly.
pub use tokio_xmpp::minidom;

pub use {config::AccountConfig, plugin::XmppPlugin};
