//! JID parsing, normalization, and allowlist matching.
//!
//! Kept string-based on purpose: the policy engine and access-control code
//! compare bare JIDs and allowlist entries as lowercased strings, so this
//! module exposes pure functions over `&str` rather than forcing every
//! caller through the `jid` crate's typed `BareJid`/`FullJid`. The typed
//! crate is still used at the transport boundary (`client.rs`) where a
//! real `jid::BareJid` is required to open a connection.

/// A parsed JID split into its three (at most) parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedJid {
    pub local: Option<String>,
    pub domain: String,
    pub resource: Option<String>,
}

impl ParsedJid {
    /// The bare JID (`local@domain`, or just `domain`), rendered lowercase.
    pub fn bare(&self) -> String {
        match &self.local {
            Some(local) => format!("{local}@{}", self.domain),
            None => self.domain.clone(),
        }
    }
}

/// Parse a raw JID-like string into its parts. Returns `None` for clearly
/// invalid input (empty string, empty local part before `@`, empty
/// resource after `/`).
pub fn parse_jid(raw: &str) -> Option<ParsedJid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (head, resource) = match raw.split_once('/') {
        Some((h, r)) => {
            if r.is_empty() {
                return None;
            }
            (h, Some(r.to_string()))
        },
        None => (raw, None),
    };

    let (local, domain) = match head.split_once('@') {
        Some((l, d)) => {
            if l.is_empty() || d.is_empty() {
                return None;
            }
            (Some(l.to_string()), d.to_string())
        },
        None => {
            if head.is_empty() {
                return None;
            }
            (None, head.to_string())
        },
    };

    Some(ParsedJid {
        local,
        domain,
        resource,
    })
}

/// Normalize a JID-like string to its lowercased bare form
/// (`local@domain`, domain case-folded). Returns `None` for invalid input.
///
/// Idempotent: `normalize_jid(normalize_jid(x)?) == normalize_jid(x)`.
pub fn normalize_jid(raw: &str) -> Option<String> {
    let parsed = parse_jid(raw)?;
    let local = parsed.local.map(|l| l.to_lowercase());
    let domain = parsed.domain.to_lowercase();
    Some(match local {
        Some(local) => format!("{local}@{domain}"),
        None => domain,
    })
}

/// Strip a leading `xmpp:`, `user:`, or `room:` prefix (once) and normalize
/// the remainder to a bare JID. `"*"` is passed through unchanged.
pub fn normalize_allow_entry(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed == "*" {
        return Some("*".to_string());
    }
    let stripped = ["xmpp:", "user:", "room:"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);
    normalize_jid(stripped)
}

/// Heuristic: does this JID's domain look like a MUC component?
///
/// Matches if the domain contains `conference` or `muc`, case-insensitive.
/// Exposed as a free function (not a trait) so deployments with unusual
/// component names can shadow it with their own predicate at the call site.
pub fn is_room_jid(raw: &str) -> bool {
    let Some(parsed) = parse_jid(raw) else {
        return false;
    };
    let domain = parsed.domain.to_lowercase();
    domain.contains("conference") || domain.contains("muc")
}

/// Extract the nickname (resource) from an occupant JID
/// (`room@conference.domain/nickname`).
pub fn occupant_nickname(full_jid: &str) -> Option<String> {
    parse_jid(full_jid)?.resource
}

/// Does `entry` (already normalized, lowercase, possibly `"*"`) match any of
/// `candidates` (already lowercase)? Pure function over the two slices, as
/// required by the allowlist-matching design.
pub fn allow_entry_matches(entry: &str, candidates: &[String]) -> bool {
    if entry == "*" {
        return true;
    }
    if let Some(domain) = entry.strip_prefix("*@") {
        return candidates
            .iter()
            .any(|c| c.rsplit_once('@').is_some_and(|(_, d)| d == domain));
    }
    candidates.iter().any(|c| c == entry)
}

/// Is any of `candidates` allowed by any entry in `entries`?
///
/// `candidates` should already be the lowercased set of
/// `{senderBareJid, senderJid, senderNickname?}`; `entries` is the raw
/// allowlist, normalized here.
pub fn is_allowed(candidates: &[String], entries: &[String]) -> bool {
    entries.iter().any(|raw| {
        normalize_allow_entry(raw)
            .map(|norm| allow_entry_matches(&norm, candidates))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_bare() {
        let full = parse_jid("room@conference.example.com/nick").unwrap();
        assert_eq!(full.local.as_deref(), Some("room"));
        assert_eq!(full.domain, "conference.example.com");
        assert_eq!(full.resource.as_deref(), Some("nick"));

        let bare = parse_jid("alice@example.com").unwrap();
        assert_eq!(bare.resource, None);
        assert_eq!(bare.bare(), "alice@example.com");
    }

    #[test]
    fn rejects_invalid() {
        assert!(parse_jid("").is_none());
        assert!(parse_jid("@example.com").is_none());
        assert!(parse_jid("alice@").is_none());
        assert!(parse_jid("alice@example.com/").is_none());
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["Alice@Example.COM", "room@conference.example.com/Nick", "EXAMPLE.COM"] {
            let once = normalize_jid(raw).unwrap();
            let twice = normalize_jid(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn normalize_lowercases_and_drops_resource() {
        assert_eq!(
            normalize_jid("Alice@Example.COM/Phone").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn allow_entry_strips_known_prefixes_once() {
        assert_eq!(normalize_allow_entry("*").as_deref(), Some("*"));
        assert_eq!(
            normalize_allow_entry("xmpp:Alice@Example.com").as_deref(),
            Some("alice@example.com")
        );
        assert_eq!(
            normalize_allow_entry("room:Room@Conference.example.com").as_deref(),
            Some("room@conference.example.com")
        );
        // Only one prefix layer is stripped.
        assert_eq!(
            normalize_allow_entry("user:user:weird@example.com").as_deref(),
            Some("user:weird@example.com")
        );
    }

    #[test]
    fn room_jid_heuristic() {
        assert!(is_room_jid("room@conference.example.com"));
        assert!(is_room_jid("room@MUC.example.com"));
        assert!(!is_room_jid("alice@example.com"));
    }

    #[test]
    fn nickname_extraction() {
        assert_eq!(
            occupant_nickname("room@conference.example.com/Bot"),
            Some("Bot".to_string())
        );
        assert_eq!(occupant_nickname("room@conference.example.com"), None);
    }

    #[test]
    fn domain_glob_matches_any_local_part() {
        let entries = vec!["*@trusted.org".into()];
        assert!(is_allowed(&["anyone@trusted.org".into()], &entries));
        assert!(!is_allowed(&["anyone@untrusted.com".into()], &entries));
    }

    #[test]
    fn wildcard_allows_any_candidate() {
        assert!(is_allowed(&["anyone@example.com".into()], &["*".into()]));
    }

    #[test]
    fn exact_match_required_without_wildcard() {
        let entries = vec!["alice@example.com".into()];
        assert!(is_allowed(&["alice@example.com".into()], &entries));
        assert!(!is_allowed(&["bob@example.com".into()], &entries));
    }
}
