//! XEP-0308: Last Message Correction.

use crate::minidom::Element;

use crate::stanza::{self, ncname, ns};

/// Parse a `<replace id=.../>` child into the corrected message's id.
pub fn parse_correction_target(element: &Element) -> Option<String> {
    stanza::correction_target(element)
}

/// Build a `<replace xmlns=urn:xmpp:message-correct:0 id=.../>` child
/// marking an outbound message as a correction of `original_id`.
pub fn build_replace(original_id: &str) -> Element {
    Element::builder("replace", ns::MESSAGE_CORRECT)
        .attr(ncname("id"), original_id)
        .build()
}
