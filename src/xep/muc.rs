//! XEP-0045: Multi-User Chat (MUC) join/unlock/leave helpers.

use crate::minidom::Element;

use crate::stanza::{ncname, ns};

/// Build a directed presence to join a MUC room.
///
/// `room_jid_with_nick` should be `room@conference.example.com/nickname`.
pub fn build_join_presence(from: &str, room_jid_with_nick: &str) -> Element {
    let muc_ext = Element::builder("x", ns::MUC).build();
    Element::builder("presence", ns::JABBER_CLIENT)
        .attr(ncname("from"), from)
        .attr(ncname("to"), room_jid_with_nick)
        .append(muc_ext)
        .build()
}

/// Build a presence to leave a MUC room.
pub fn build_leave_presence(from: &str, room_jid_with_nick: &str) -> Element {
    Element::builder("presence", ns::JABBER_CLIENT)
        .attr(ncname("from"), from)
        .attr(ncname("to"), room_jid_with_nick)
        .attr(ncname("type"), "unavailable")
        .build()
}

/// Build the owner-configuration-submit IQ that unlocks a freshly created
/// room (XEP-0045 §10.1, the "instant room" case): `<iq type=set><query
/// xmlns=.../#owner><x xmlns=jabber:x:data type=submit/></query></iq>`.
///
/// A no-op for pre-existing rooms; accepts the service's defaults for rooms
/// implicitly created by our own join.
pub fn build_owner_config_submit(from: &str, room_jid: &str, iq_id: &str) -> Element {
    let form = Element::builder("x", ns::DATA_FORM)
        .attr(ncname("type"), "submit")
        .build();
    let query = Element::builder("query", ns::MUC_OWNER).append(form).build();
    Element::builder("iq", ns::JABBER_CLIENT)
        .attr(ncname("from"), from)
        .attr(ncname("to"), room_jid)
        .attr(ncname("type"), "set")
        .attr(ncname("id"), iq_id)
        .append(query)
        .build()
}

/// Extract the nickname (resource part) from a full MUC JID.
///
/// e.g. `room@conference.example.com/nick` → `Some("nick")`
pub fn extract_nick(full_jid: &str) -> Option<&str> {
    full_jid.split('/').nth(1)
}

/// Extract the occupant's real JID from a MUC presence or message's
/// `<x xmlns=.../#user><item jid="..."/></x>` child (XEP-0045 §17.2.4),
/// present only when the room is non-anonymous.
pub fn occupant_real_jid(element: &Element) -> Option<String> {
    element
        .get_child("x", ns::MUC_USER)
        .and_then(|x| x.get_child("item", ns::MUC_USER))
        .and_then(|item| item.attr("jid"))
        .map(str::to_string)
}

/// Check if a presence stanza indicates a MUC self-presence
/// (i.e. the server echoing our own join back to us), per status code 110.
pub fn is_self_presence(element: &Element) -> bool {
    if let Some(x) = element.get_child("x", ns::MUC_USER) {
        for status in x.children().filter(|c| c.name() == "status") {
            if status.attr("code") == Some("110") {
                return true;
            }
        }
    }
    false
}
