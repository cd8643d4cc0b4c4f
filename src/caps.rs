//! Entity-capability digests (XEP-0115 / XEP-0390) for the fixed feature
//! set this client advertises in its MUC presence.

use crate::xml::{Element, ElementBuilder};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Stable client URI used as the caps `node` attribute.
pub const CAPS_NODE: &str = "https://github.com/jitsi-rust/jitsi-rust";

pub const CLIENT_NAME: &str = "jitsi-rust";

const FEATURES: &[&str] = &[
    "http://jabber.org/protocol/disco#info",
    "urn:xmpp:jingle:apps:rtp:video",
    "urn:xmpp:jingle:apps:rtp:audio",
    "urn:xmpp:jingle:transports:ice-udp:1",
    "urn:xmpp:jingle:apps:dtls:0",
    "urn:ietf:rfc:5888",
    "urn:ietf:rfc:5761",
    "urn:ietf:rfc:4588",
    "http://jitsi.org/tcc",
];

/// The disco#info `query` payload answered to capability probes.
pub fn disco_info() -> Element {
    ElementBuilder::new("query")
        .attr("xmlns", "http://jabber.org/protocol/disco#info")
        .child(
            ElementBuilder::new("identity")
                .attr("category", "client")
                .attr("name", CLIENT_NAME)
                .attr("type", "bot")
                .attr("xml:lang", "en")
                .build(),
        )
        .children(
            FEATURES
                .iter()
                .map(|var| ElementBuilder::new("feature").attr("var", *var).build()),
        )
        .build()
}

/// Base64 digests of the canonical capability string, in both hash
/// flavors carried in presence (`c` and `ecaps2`).
#[derive(Debug, Clone, PartialEq)]
pub struct CapsDigest {
    pub sha1_b64: String,
    pub sha256_b64: String,
}

pub fn compute(info: &Element) -> CapsDigest {
    let canonical = canonical_string(info);
    CapsDigest {
        sha1_b64: BASE64.encode(Sha1::digest(canonical.as_bytes())),
        sha256_b64: BASE64.encode(Sha256::digest(canonical.as_bytes())),
    }
}

/// Canonical verification string: sorted `category/type/lang/name`
/// identities, then sorted feature vars, each terminated by `<`.
fn canonical_string(info: &Element) -> String {
    let mut identities: Vec<String> = info
        .children_named("identity")
        .map(|identity| {
            format!(
                "{}/{}/{}/{}",
                identity.attr("category").unwrap_or(""),
                identity.attr("type").unwrap_or(""),
                identity.attr("xml:lang").unwrap_or(""),
                identity.attr("name").unwrap_or(""),
            )
        })
        .collect();
    identities.sort();

    let mut features: Vec<&str> = info
        .children_named("feature")
        .filter_map(|feature| feature.attr("var"))
        .collect();
    features.sort_unstable();

    let mut canonical = String::new();
    for identity in &identities {
        canonical.push_str(identity);
        canonical.push('<');
    }
    for feature in &features {
        canonical.push_str(feature);
        canonical.push('<');
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_sorts_features() {
        let canonical = canonical_string(&disco_info());
        assert!(canonical.starts_with("client/bot/en/jitsi-rust<"));
        assert!(canonical.ends_with("urn:xmpp:jingle:transports:ice-udp:1<"));
        let vars: Vec<&str> = canonical
            .split('<')
            .skip(1)
            .filter(|var| !var.is_empty())
            .collect();
        let mut sorted = vars.clone();
        sorted.sort_unstable();
        assert_eq!(vars, sorted);
    }

    #[test]
    fn digests_match_reference_values() {
        let digest = compute(&disco_info());
        assert_eq!(digest.sha1_b64, "K+1HqAhO3snC/+gaDwAB0CQpFPQ=");
        assert_eq!(digest.sha256_b64, "MYKbsLy+NR3KhrkGskZcouMM3DU/nAmG8sfNhi+YTxQ=");
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(compute(&disco_info()), compute(&disco_info()));
    }
}
