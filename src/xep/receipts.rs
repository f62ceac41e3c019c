//! XEP-0184: Message Delivery Receipts.

use crate::minidom::Element;

use crate::stanza::{self, ns};

/// Build a `<received/>` receipt acknowledging `receipt_for_id`.
pub fn build_receipt(from: &str, to: &str, msg_type: &str, receipt_for_id: &str) -> Element {
    stanza::build_receipt(from, to, msg_type, receipt_for_id)
}

/// Does this message request a receipt (`<request xmlns=urn:xmpp:receipts/>`)?
pub fn requests_receipt(element: &Element) -> bool {
    element.get_child("request", ns::RECEIPTS).is_some()
}

/// Extract the id being acknowledged from a `<received/>` element, if any.
pub fn received_id(element: &Element) -> Option<String> {
    element
        .get_child("received", ns::RECEIPTS)
        .and_then(|r| r.attr("id"))
        .map(str::to_string)
}
