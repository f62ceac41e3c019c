//! Stanza building and decoding helpers for XMPP messages, presence, and IQ.
//!
//! Stanzas are assembled and inspected as raw `minidom::Element`s and only
//! converted to typed `tokio_xmpp::parsers` structs at the transport
//! boundary (`client.rs`), matching how chat states, MUC, and OOB are
//! already handled here.

use crate::minidom::{Element, rxml::NcName};

/// XMPP namespace constants, centralized so every encoder/decoder shares
/// one source of truth instead of repeating string literals.
pub mod ns {
    pub const JABBER_CLIENT: &str = "jabber:client";
    pub const MUC: &str = "http://jabber.org/protocol/muc";
    pub const MUC_USER: &str = "http://jabber.org/protocol/muc#user";
    pub const MUC_OWNER: &str = "http://jabber.org/protocol/muc#owner";
    pub const DATA_FORM: &str = "jabber:x:data";
    pub const CHAT_STATES: &str = "http://jabber.org/protocol/chatstates";
    pub const RECEIPTS: &str = "urn:xmpp:receipts";
    pub const DELAY: &str = "urn:xmpp:delay";
    pub const MESSAGE_CORRECT: &str = "urn:xmpp:message-correct:0";
    pub const REPLY: &str = "urn:xmpp:reply:0";
    pub const OOB: &str = "jabber:x:oob";
}

/// Convert a static string to an `NcName` for use with minidom's attribute API.
///
/// Panics if the string is not a valid NCName (should only be used with known-good names).
pub(crate) fn ncname(s: &str) -> NcName {
    NcName::try_from(s).unwrap_or_else(|_| panic!("invalid NCName: {s}"))
}

/// Generate a fresh message id (UUID v4).
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build a `<message>` stanza. `body` is trimmed; `id` is a fresh UUID v4.
///
/// `msg_type` should be `"chat"`, `"groupchat"`, `"normal"`, or `"headline"`.
pub fn build_message(from: &str, to: &str, msg_type: &str, body: &str) -> Element {
    Element::builder("message", ns::JABBER_CLIENT)
        .attr(ncname("from"), from)
        .attr(ncname("to"), to)
        .attr(ncname("type"), msg_type)
        .attr(ncname("id"), new_message_id())
        .append(
            Element::builder("body", ns::JABBER_CLIENT)
                .append(body.trim())
                .build(),
        )
        .build()
}

/// Build a `<presence>` stanza (initial presence or directed).
pub fn build_presence(from: &str, to: Option<&str>) -> Element {
    let mut builder = Element::builder("presence", ns::JABBER_CLIENT).attr(ncname("from"), from);
    if let Some(to) = to {
        builder = builder.attr(ncname("to"), to);
    }
    builder.build()
}

/// Build a `<presence type="unavailable">` stanza.
pub fn build_unavailable(from: &str, to: Option<&str>) -> Element {
    let mut builder = Element::builder("presence", ns::JABBER_CLIENT)
        .attr(ncname("from"), from)
        .attr(ncname("type"), "unavailable");
    if let Some(to) = to {
        builder = builder.attr(ncname("to"), to);
    }
    builder.build()
}

/// Build a `<message><received xmlns=urn:xmpp:receipts id=.../></message>`
/// delivery receipt (XEP-0184).
pub fn build_receipt(from: &str, to: &str, msg_type: &str, receipt_for_id: &str) -> Element {
    Element::builder("message", ns::JABBER_CLIENT)
        .attr(ncname("from"), from)
        .attr(ncname("to"), to)
        .attr(ncname("type"), msg_type)
        .append(
            Element::builder("received", ns::RECEIPTS)
                .attr(ncname("id"), receipt_for_id)
                .build(),
        )
        .build()
}

/// Decode the `<body/>` text from a message element, if present and non-empty.
pub fn body_text(element: &Element) -> Option<String> {
    element
        .get_child("body", ns::JABBER_CLIENT)
        .map(|b| b.text())
        .filter(|t| !t.is_empty())
}

/// Decode a `<delay xmlns=urn:xmpp:delay stamp=.../>` (XEP-0203) into a
/// millisecond Unix timestamp, if present and the stamp parses as RFC 3339.
pub fn delay_timestamp_ms(element: &Element) -> Option<i64> {
    let stamp = element.get_child("delay", ns::DELAY)?.attr("stamp")?;
    chrono::DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Decode a `<replace xmlns=urn:xmpp:message-correct:0 id=.../>` (XEP-0308)
/// into the id of the message being corrected.
pub fn correction_target(element: &Element) -> Option<String> {
    element
        .get_child("replace", ns::MESSAGE_CORRECT)
        .and_then(|r| r.attr("id"))
        .map(str::to_string)
}

/// Decode a `<reply xmlns=urn:xmpp:reply:0 to=.../>` (XEP-0461) into the
/// JID this message is threaded from.
pub fn reply_origin(element: &Element) -> Option<String> {
    element
        .get_child("reply", ns::REPLY)
        .and_then(|r| r.attr("to"))
        .map(str::to_string)
}

/// Decode a presence's `<status/>` text child, if present.
pub fn presence_status(element: &Element) -> Option<String> {
    element
        .get_child("status", ns::JABBER_CLIENT)
        .map(|s| s.text())
        .filter(|t| !t.is_empty())
}

/// Decode a presence's `<show/>` text child, if present.
pub fn presence_show(element: &Element) -> Option<String> {
    element
        .get_child("show", ns::JABBER_CLIENT)
        .map(|s| s.text())
        .filter(|t| !t.is_empty())
}

/// Decode a presence's `<priority/>` text child as an `i8`, if present and valid.
pub fn presence_priority(element: &Element) -> Option<i8> {
    element
        .get_child("priority", ns::JABBER_CLIENT)
        .and_then(|p| p.text().trim().parse().ok())
}

/// Round `index` down to the nearest UTF-8 char boundary at or before it,
/// so a multibyte character is never split mid-codepoint. Falls back to the
/// next char boundary after 0 when `index` lands inside the very first
/// character, so callers always make forward progress.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut idx = index;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    if idx == 0 {
        idx = (1..=s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len());
    }
    idx
}

/// Chunk a text string into segments of at most `max_len` characters,
/// splitting at newline boundaries when possible.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let boundary = floor_char_boundary(remaining, max_len);
        let split_at = remaining[..boundary]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(boundary);

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_chat_message_has_uuid_id() {
        let el = build_message("bot@example.com", "user@example.com", "chat", "  Hello!  ");
        assert_eq!(el.name(), "message");
        assert_eq!(el.attr("type"), Some("chat"));
        assert_eq!(el.attr("to"), Some("user@example.com"));
        assert!(el.attr("id").is_some());
        let body = el.get_child("body", ns::JABBER_CLIENT).unwrap();
        assert_eq!(body.text(), "Hello!");
    }

    #[test]
    fn build_groupchat_message() {
        let el = build_message(
            "bot@example.com",
            "room@conference.example.com",
            "groupchat",
            "Hi room!",
        );
        assert_eq!(el.attr("type"), Some("groupchat"));
    }

    #[test]
    fn build_initial_presence() {
        let el = build_presence("bot@example.com/moltis", None);
        assert_eq!(el.name(), "presence");
        assert_eq!(el.attr("from"), Some("bot@example.com/moltis"));
        assert!(el.attr("to").is_none());
    }

    #[test]
    fn build_directed_presence() {
        let el = build_presence(
            "bot@example.com/moltis",
            Some("room@conference.example.com/botnick"),
        );
        assert_eq!(el.attr("to"), Some("room@conference.example.com/botnick"));
    }

    #[test]
    fn build_receipt_stanza() {
        let el = build_receipt("bot@example.com", "user@example.com", "chat", "msg-1");
        let received = el.get_child("received", ns::RECEIPTS).unwrap();
        assert_eq!(received.attr("id"), Some("msg-1"));
    }

    #[test]
    fn decode_body_text_drops_empty() {
        let with_body = build_message("a@x", "b@x", "chat", "hi");
        assert_eq!(body_text(&with_body).as_deref(), Some("hi"));

        let empty = Element::builder("message", ns::JABBER_CLIENT).build();
        assert_eq!(body_text(&empty), None);
    }

    #[test]
    fn decode_delay_stamp() {
        let el = Element::builder("message", ns::JABBER_CLIENT)
            .append(
                Element::builder("delay", ns::DELAY)
                    .attr(ncname("stamp"), "2024-01-01T00:00:00Z")
                    .build(),
            )
            .build();
        assert_eq!(delay_timestamp_ms(&el), Some(1704067200000));
    }

    #[test]
    fn decode_correction_and_reply() {
        let el = Element::builder("message", ns::JABBER_CLIENT)
            .append(
                Element::builder("replace", ns::MESSAGE_CORRECT)
                    .attr(ncname("id"), "orig-id")
                    .build(),
            )
            .append(
                Element::builder("reply", ns::REPLY)
                    .attr(ncname("to"), "alice@example.com")
                    .build(),
            )
            .build();
        assert_eq!(correction_target(&el).as_deref(), Some("orig-id"));
        assert_eq!(reply_origin(&el).as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn decode_presence_metadata() {
        let el = Element::builder("presence", ns::JABBER_CLIENT)
            .append(Element::builder("show", ns::JABBER_CLIENT).append("dnd").build())
            .append(Element::builder("status", ns::JABBER_CLIENT).append("in a meeting").build())
            .append(Element::builder("priority", ns::JABBER_CLIENT).append("5").build())
            .build();
        assert_eq!(presence_show(&el).as_deref(), Some("dnd"));
        assert_eq!(presence_status(&el).as_deref(), Some("in a meeting"));
        assert_eq!(presence_priority(&el), Some(5));
    }

    #[test]
    fn decode_presence_metadata_absent() {
        let el = Element::builder("presence", ns::JABBER_CLIENT).build();
        assert_eq!(presence_show(&el), None);
        assert_eq!(presence_status(&el), None);
        assert_eq!(presence_priority(&el), None);
    }

    #[test]
    fn chunk_short_text() {
        let chunks = chunk_text("hello", 100);
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn chunk_at_newline() {
        let text = "line1\nline2\nline3";
        let chunks = chunk_text(text, 10);
        assert_eq!(chunks, vec!["line1\n", "line2\n", "line3"]);
    }

    #[test]
    fn chunk_no_newline() {
        let text = "abcdefghij";
        let chunks = chunk_text(text, 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn chunk_does_not_split_multibyte_char() {
        let text = format!("a{}", "😀".repeat(1000));
        let chunks = chunk_text(&text, 4000);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunk_boundary_inside_leading_multibyte_char_still_progresses() {
        let text = "😀😀😀😀";
        let chunks = chunk_text(text, 1);
        assert_eq!(chunks, vec!["😀", "😀", "😀", "😀"]);
    }
}
