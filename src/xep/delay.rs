//! XEP-0203: Delayed Delivery.

use crate::minidom::Element;

use crate::stanza::{self, ncname, ns};

/// Parse a `<delay/>` child into a millisecond Unix timestamp.
pub fn parse_delay_ms(element: &Element) -> Option<i64> {
    stanza::delay_timestamp_ms(element)
}

/// Build a `<delay xmlns=urn:xmpp:delay stamp=.../>` element tagging a
/// message as delayed delivery (e.g. MUC history replay), stamped `from`.
pub fn build_delay(stamp_rfc3339: &str, from: Option<&str>) -> Element {
    let mut builder =
        Element::builder("delay", ns::DELAY).attr(ncname("stamp"), stamp_rfc3339);
    if let Some(from) = from {
        builder = builder.attr(ncname("from"), from);
    }
    builder.build()
}
