use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JidError {
    #[error("invalid JID format: {0}")]
    InvalidFormat(String),
}

/// A routable XMPP identifier of the form `node@domain/resource`.
///
/// The *bare* form drops the resource; the *full* form renders all three
/// parts. Both `node` and `resource` may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Jid {
    pub node: String,
    pub domain: String,
    pub resource: String,
}

impl Jid {
    pub fn new(node: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            domain: domain.into(),
            resource: String::new(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// `node@domain` (or just `domain` when the node is empty).
    pub fn to_bare(&self) -> String {
        if self.node.is_empty() {
            self.domain.clone()
        } else {
            format!("{}@{}", self.node, self.domain)
        }
    }

    /// `node@domain/resource`, omitting empty parts.
    pub fn to_full(&self) -> String {
        let bare = self.to_bare();
        if self.resource.is_empty() {
            bare
        } else {
            format!("{}/{}", bare, self.resource)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bare, resource) = match s.split_once('/') {
            Some((b, r)) => (b, r),
            None => (s, ""),
        };
        let (node, domain) = match bare.split_once('@') {
            Some((n, d)) => (n, d),
            None => ("", bare),
        };
        if domain.is_empty() || domain.contains('@') {
            return Err(JidError::InvalidFormat(s.to_string()));
        }
        Ok(Jid {
            node: node.to_string(),
            domain: domain.to_string(),
            resource: resource.to_string(),
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_all_forms() {
        let jid: Jid = "abc-123@meet.example.org/browser".parse().unwrap();
        assert_eq!(jid.node, "abc-123");
        assert_eq!(jid.domain, "meet.example.org");
        assert_eq!(jid.resource, "browser");
        assert_eq!(jid.to_bare(), "abc-123@meet.example.org");
        assert_eq!(jid.to_full(), "abc-123@meet.example.org/browser");

        let bare: Jid = "room@conference.meet.example.org".parse().unwrap();
        assert!(bare.resource.is_empty());
        assert_eq!(bare.to_full(), bare.to_bare());

        let domain_only: Jid = "meet.example.org".parse().unwrap();
        assert!(domain_only.node.is_empty());
        assert_eq!(domain_only.to_full(), "meet.example.org");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Jid::from_str("").is_err());
        assert!(Jid::from_str("a@b@c").is_err());
        assert!(Jid::from_str("node@/resource").is_err());
    }
}
