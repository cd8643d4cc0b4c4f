//! Streaming parser for the structural XML subset the signaling protocol
//! uses: start/end tags with attributes, nested elements, text content,
//! XML declarations and self-closing tags. No DTDs, no comments, no
//! namespace resolution beyond plain `xmlns` attribute strings.

use crate::xml::error::XmlError;
use crate::xml::node::Element;

/// Parses the first complete top-level element out of `input` and returns
/// it together with the number of bytes consumed, so the caller can drain
/// its accumulator and retry on the remainder.
///
/// `XmlError::Incomplete` means the buffer ends mid-element; anything else
/// means the buffer contents are unusable.
pub fn parse(input: &str) -> Result<(Element, usize), XmlError> {
    let mut cursor = Cursor { input, pos: 0 };
    cursor.skip_whitespace();
    loop {
        if cursor.rest().is_empty() {
            return Err(XmlError::Incomplete);
        }
        if cursor.rest().starts_with("<?") {
            cursor.skip_declaration()?;
            cursor.skip_whitespace();
            continue;
        }
        break;
    }
    let element = cursor.parse_element()?;
    Ok((element, cursor.pos))
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> XmlError {
        XmlError::Malformed {
            at: self.pos,
            reason: reason.into(),
        }
    }

    fn skip_declaration(&mut self) -> Result<(), XmlError> {
        match self.rest().find("?>") {
            Some(end) => {
                self.pos += end + 2;
                Ok(())
            }
            None => Err(XmlError::Incomplete),
        }
    }

    fn parse_name(&mut self) -> Result<&'a str, XmlError> {
        let start = self.pos;
        while matches!(self.peek(),
            Some(c) if c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-' | '.'))
        {
            self.bump();
        }
        if self.pos == start {
            if self.rest().is_empty() {
                return Err(XmlError::Incomplete);
            }
            return Err(self.malformed("expected a name"));
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_element(&mut self) -> Result<Element, XmlError> {
        if !self.eat("<") {
            return Err(self.malformed("expected '<'"));
        }
        let mut element = Element::new(self.parse_name()?);

        // attribute list
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(XmlError::Incomplete),
                Some('/') => {
                    self.bump();
                    if self.peek().is_none() {
                        return Err(XmlError::Incomplete);
                    }
                    if !self.eat(">") {
                        return Err(self.malformed("expected '>' after '/'"));
                    }
                    return Ok(element);
                }
                Some('>') => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    let key = self.parse_name()?;
                    self.skip_whitespace();
                    if self.peek().is_none() {
                        return Err(XmlError::Incomplete);
                    }
                    if !self.eat("=") {
                        return Err(self.malformed("expected '=' after attribute name"));
                    }
                    self.skip_whitespace();
                    let value = self.parse_quoted()?;
                    element.attrs.insert(key.to_string(), value);
                }
            }
        }

        // content: text interleaved with children, until the closing tag
        loop {
            match self.rest().find('<') {
                None => {
                    // trailing text with no close tag yet
                    return Err(XmlError::Incomplete);
                }
                Some(offset) => {
                    if offset > 0 {
                        let raw = &self.input[self.pos..self.pos + offset];
                        element.text.push_str(&unescape(raw, self.pos)?);
                        self.pos += offset;
                    }
                }
            }
            if self.rest().starts_with("</") {
                self.pos += 2;
                let close = self.parse_name()?;
                if close != element.name {
                    return Err(self.malformed(format!(
                        "mismatched closing tag </{close}> for <{}>",
                        element.name
                    )));
                }
                self.skip_whitespace();
                if self.peek().is_none() {
                    return Err(XmlError::Incomplete);
                }
                if !self.eat(">") {
                    return Err(self.malformed("expected '>' in closing tag"));
                }
                return Ok(element);
            }
            if self.rest() == "<" {
                return Err(XmlError::Incomplete);
            }
            element.children.push(self.parse_element()?);
        }
    }

    fn parse_quoted(&mut self) -> Result<String, XmlError> {
        let quote = match self.bump() {
            None => return Err(XmlError::Incomplete),
            Some(c @ ('"' | '\'')) => c,
            Some(_) => return Err(self.malformed("expected a quoted attribute value")),
        };
        let start = self.pos;
        match self.rest().find(quote) {
            None => Err(XmlError::Incomplete),
            Some(end) => {
                let raw = &self.input[start..start + end];
                self.pos = start + end + 1;
                unescape(raw, start)
            }
        }
    }
}

fn unescape(raw: &str, at: usize) -> Result<String, XmlError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = rest.find(';').ok_or(XmlError::Malformed {
            at,
            reason: "unterminated entity reference".to_string(),
        })?;
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse))
                    .and_then(Result::ok)
                    .and_then(char::from_u32);
                match code {
                    Some(c) => out.push(c),
                    None => {
                        return Err(XmlError::Malformed {
                            at,
                            reason: format!("unknown entity &{entity};"),
                        });
                    }
                }
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &str) -> Element {
        let (element, consumed) = parse(input).expect("parse failed");
        assert_eq!(consumed, input.len());
        element
    }

    #[test]
    fn parses_nested_elements_and_attributes() {
        let element = parse_one(
            r#"<iq type="result" id="iq_1"><query xmlns="http://jabber.org/protocol/disco#info"><feature var="a"/></query></iq>"#,
        );
        assert_eq!(element.name, "iq");
        assert_eq!(element.attr("type"), Some("result"));
        let query = element.find_child("query").unwrap();
        assert_eq!(
            query.attr("xmlns"),
            Some("http://jabber.org/protocol/disco#info")
        );
        assert_eq!(query.children.len(), 1);
        assert_eq!(query.children[0].attr("var"), Some("a"));
    }

    #[test]
    fn parses_text_content_and_entities() {
        let element = parse_one("<nick>alice &amp; &#98;ob</nick>");
        assert_eq!(element.text, "alice & bob");
    }

    #[test]
    fn skips_declaration_and_leading_whitespace() {
        let element = parse_one("\n<?xml version='1.0'?><presence/>");
        assert_eq!(element.name, "presence");
    }

    #[test]
    fn reports_incomplete_on_truncation() {
        for cut in ["<", "<iq", "<iq ty", "<iq type=\"ge", "<iq type=\"get\"><pi", "<iq type=\"get\"><ping/>"] {
            assert_eq!(parse(cut).unwrap_err(), XmlError::Incomplete, "cut {cut:?}");
        }
    }

    #[test]
    fn reports_malformed_on_tag_mismatch() {
        let err = parse("<iq><ping/></presence>").unwrap_err();
        assert!(matches!(err, XmlError::Malformed { .. }));
    }

    #[test]
    fn leaves_trailing_input_unconsumed() {
        let input = "<a/><b/>";
        let (element, consumed) = parse(input).unwrap();
        assert_eq!(element.name, "a");
        let (element, _) = parse(&input[consumed..]).unwrap();
        assert_eq!(element.name, "b");
    }
}
