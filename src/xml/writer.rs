use crate::xml::node::Element;

/// Serializes an element tree. Attributes keep their insertion order and
/// elements with no content are self-closed.
pub fn write_element(element: &Element) -> String {
    let mut out = String::new();
    write_into(&mut out, element);
    out
}

fn write_into(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_into(out, value);
        out.push('"');
    }
    if element.text.is_empty() && element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    escape_into(out, &element.text);
    for child in &element.children {
        write_into(out, child);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::builder::ElementBuilder;
    use crate::xml::parser;

    #[test]
    fn serializes_in_insertion_order_and_self_closes() {
        let element = ElementBuilder::new("iq")
            .attr("to", "room@conference.example.org")
            .attr("type", "set")
            .child(ElementBuilder::new("ping").build())
            .build();
        assert_eq!(
            write_element(&element),
            r#"<iq to="room@conference.example.org" type="set"><ping/></iq>"#
        );
    }

    #[test]
    fn escapes_text_and_attribute_values() {
        let element = ElementBuilder::new("nick")
            .attr("note", "a<b\"c")
            .text("tom & jerry")
            .build();
        assert_eq!(
            write_element(&element),
            r#"<nick note="a&lt;b&quot;c">tom &amp; jerry</nick>"#
        );
    }

    #[test]
    fn round_trips_through_the_parser() {
        let element = ElementBuilder::new("presence")
            .attr("to", "room@conference.example.org/alice")
            .child(
                ElementBuilder::new("c")
                    .attr("hash", "sha-1")
                    .attr("ver", "AAA+//Z=")
                    .build(),
            )
            .child(ElementBuilder::new("nick").text("alice & co").build())
            .build();
        let serialized = write_element(&element);
        let (reparsed, consumed) = parser::parse(&serialized).unwrap();
        assert_eq!(consumed, serialized.len());
        assert_eq!(reparsed, element);
    }
}
