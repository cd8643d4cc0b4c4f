use crate::xml::attrs::AttrParser;
use indexmap::IndexMap;
use std::fmt;

/// Insertion-ordered attribute map. Equality is value-based: two elements
/// whose attributes differ only in order compare equal, but serialization
/// preserves the order attributes were inserted in.
pub type Attrs = IndexMap<String, String>;

/// A single XML element: name, attributes, child elements and inline text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Attrs,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn is_attr(&self, key: &str, value: &str) -> bool {
        self.attr(key) == Some(value)
    }

    pub fn attrs(&self) -> AttrParser<'_> {
        AttrParser::new(self)
    }

    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Walks a path of child names, returning the innermost element.
    pub fn find_child_path<'a>(&'a self, names: &[&str]) -> Option<&'a Element> {
        let mut current = self;
        for &name in names {
            current = current.find_child(name)?;
        }
        Some(current)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Builder-style append on a cloned template; the template itself is
    /// never touched.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::xml::writer::write_element(self))
    }
}
