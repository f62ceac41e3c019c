//! XEP-0461: Message Replies.
//!
//! No reference implementation was available to crib from; built from the
//! XEP description in the style of `message_correct.rs`/`delay.rs`. Inbound
//! replies are parsed into metadata only — outbound replies use a plain
//! text marker instead of this element (see `outbound.rs`).

use crate::minidom::Element;

use crate::stanza::{self, ncname, ns};

/// Parse a `<reply to=.../>` child into the JID this message replies to.
pub fn parse_reply_origin(element: &Element) -> Option<String> {
    stanza::reply_origin(element)
}

/// Build a `<reply xmlns=urn:xmpp:reply:0 to=... id=.../>` child.
pub fn build_reply(to: &str, id: &str) -> Element {
    Element::builder("reply", ns::REPLY)
        .attr(ncname("to"), to)
        .attr(ncname("id"), id)
        .build()
}
