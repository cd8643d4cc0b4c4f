use crate::types::jid::Jid;
use crate::xml::error::XmlError;
use crate::xml::node::Element;
use std::fmt;
use std::str::FromStr;

/// Attribute accessor that accumulates errors instead of failing fast,
/// so a caller can read every field and then check `finish()` once.
pub struct AttrParser<'a> {
    element: &'a Element,
    pub errors: Vec<XmlError>,
}

impl<'a> AttrParser<'a> {
    pub fn new(element: &'a Element) -> Self {
        Self {
            element,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), XmlError> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(first),
        }
    }

    pub fn optional_string(&mut self, key: &str) -> Option<&'a str> {
        self.element.attr(key)
    }

    pub fn required_string(&mut self, key: &str) -> &'a str {
        match self.element.attr(key) {
            Some(value) => value,
            None => {
                self.errors.push(XmlError::MissingAttr {
                    element: self.element.name.clone(),
                    attr: key.to_string(),
                });
                ""
            }
        }
    }

    pub fn optional_num<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr + Default,
        T::Err: fmt::Display,
    {
        let raw = self.element.attr(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(XmlError::AttrParse {
                    attr: key.to_string(),
                    reason: format!("invalid number {raw:?}: {e}"),
                });
                None
            }
        }
    }

    pub fn required_num<T>(&mut self, key: &str) -> T
    where
        T: FromStr + Default,
        T::Err: fmt::Display,
    {
        self.required_string(key);
        self.optional_num(key).unwrap_or_default()
    }

    pub fn optional_bool(&mut self, key: &str) -> Option<bool> {
        let raw = self.element.attr(key)?;
        match raw {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                self.errors.push(XmlError::AttrParse {
                    attr: key.to_string(),
                    reason: format!("invalid boolean {other:?}"),
                });
                None
            }
        }
    }

    pub fn optional_jid(&mut self, key: &str) -> Option<Jid> {
        let raw = self.element.attr(key)?;
        match raw.parse() {
            Ok(jid) => Some(jid),
            Err(e) => {
                self.errors.push(XmlError::AttrParse {
                    attr: key.to_string(),
                    reason: format!("invalid jid {raw:?}: {e}"),
                });
                None
            }
        }
    }

    pub fn required_jid(&mut self, key: &str) -> Jid {
        self.required_string(key);
        self.optional_jid(key).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::xml::ElementBuilder;

    #[test]
    fn collects_errors_instead_of_failing_fast() {
        let element = ElementBuilder::new("candidate")
            .attr("port", "not-a-number")
            .attr("ip", "192.0.2.1")
            .build();
        let mut parser = element.attrs();
        assert_eq!(parser.optional_string("ip"), Some("192.0.2.1"));
        assert_eq!(parser.optional_num::<u16>("port"), None);
        assert_eq!(parser.required_string("foundation"), "");
        assert!(!parser.ok());
        assert_eq!(parser.errors.len(), 2);
        assert!(parser.finish().is_err());
    }

    #[test]
    fn parses_typed_attributes() {
        let element = ElementBuilder::new("service")
            .attr("port", "3478")
            .attr("restricted", "1")
            .attr("from", "room@conference.example.org/alice")
            .build();
        let mut parser = element.attrs();
        assert_eq!(parser.optional_num::<u16>("port"), Some(3478));
        assert_eq!(parser.optional_bool("restricted"), Some(true));
        let jid = parser.optional_jid("from").unwrap();
        assert_eq!(jid.resource, "alice");
        assert!(parser.finish().is_ok());
    }
}
