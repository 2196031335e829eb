//! Distinguished name model and parsing.
//!
//! A [`Dn`] is an ordered sequence of [`Rdn`]s (leftmost first); each RDN is
//! a non-empty set of attribute-value assertions ([`Ava`]). The root DN is
//! the empty sequence. Parsing follows the RFC 4514 string form: components
//! separated by `,`, multi-valued RDNs joined with `+`, backslash escapes
//! (single character or two hex digits) and `#hexstring` values.
//!
//! Equality and hashing go through the normalised form: attribute types and
//! values are lowercased, so `DC=Example` and `dc=example` compare equal.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A single attribute-value assertion, e.g. `cn=Babs Jensen`.
///
/// The attribute type is kept as written; the value is raw bytes with all
/// escapes already resolved.
#[derive(Debug, Clone)]
pub struct Ava {
    attr: String,
    value: Vec<u8>,
}

impl Ava {
    /// Creates an assertion from an attribute type name and a raw value.
    pub fn new(attr: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Ava { attr: attr.into(), value: value.into() }
    }

    /// The attribute type name as written in the source.
    pub fn attribute_name(&self) -> &str {
        &self.attr
    }

    /// The lowercase attribute type name used as an identity key.
    pub fn attribute_key(&self) -> String {
        self.attr.to_ascii_lowercase()
    }

    /// The assertion value with escapes resolved.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attr.to_ascii_lowercase(),
            escape_value(&normalize_value(&self.value))
        )
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

/// One relative distinguished name: a non-empty set of AVAs.
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Creates an RDN from a single assertion.
    pub fn new(ava: Ava) -> Self {
        Rdn { avas: vec![ava] }
    }

    /// Parses the string form of exactly one RDN.
    pub fn parse(s: &str) -> Result<Rdn, String> {
        let rdns = parse_rdns(s)?;
        match rdns.len() {
            1 => Ok(rdns.into_iter().next().unwrap()),
            0 => Err("RDN must not be empty".to_string()),
            n => Err(format!("expected a single RDN but found {n} components")),
        }
    }

    /// The assertions making up this RDN, in source order.
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    fn normalized(&self) -> String {
        // AVA sets are unordered: sort the normalised assertions so that
        // `cn=a+sn=b` and `sn=b+cn=a` compare equal.
        let mut parts: Vec<String> = self.avas.iter().map(Ava::normalized).collect();
        parts.sort();
        parts.join("+")
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.avas.iter().map(Ava::to_string).collect();
        write!(f, "{}", parts.join("+"))
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Rdn {}

/// A distinguished name: the identity of a directory entry.
#[derive(Debug, Clone, Default)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The root DN (the empty sequence of RDNs).
    pub fn root() -> Self {
        Dn { rdns: Vec::new() }
    }

    /// Parses the RFC 4514 string form of a DN.
    ///
    /// An empty or all-whitespace string yields the root DN.
    pub fn parse(s: &str) -> Result<Dn, String> {
        Ok(Dn { rdns: parse_rdns(s)? })
    }

    /// Whether this is the root DN.
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The RDNs of this DN, leftmost first.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The leftmost RDN, or `None` for the root DN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// The DN with the leftmost RDN removed, or `None` for the root DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Dn { rdns: self.rdns[1..].to_vec() })
        }
    }

    /// Builds a child DN by prepending `rdn` to this DN.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// Whether this DN equals `base` or sits below it in the tree.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        if base.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - base.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(base.rdns.iter())
            .all(|(a, b)| a.normalized() == b.normalized())
    }

    /// The canonical normalised form used for equality comparisons.
    pub fn to_normalized_string(&self) -> String {
        let parts: Vec<String> = self.rdns.iter().map(Rdn::normalized).collect();
        parts.join(",")
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.rdns.iter().map(Rdn::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.to_normalized_string() == other.to_normalized_string()
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_normalized_string().hash(state);
    }
}

/// Value normalisation for comparisons: valid UTF-8 is lowercased
/// (caseIgnore matching), anything else is compared byte for byte.
fn normalize_value(value: &[u8]) -> Vec<u8> {
    match std::str::from_utf8(value) {
        Ok(s) => s.to_lowercase().into_bytes(),
        Err(_) => value.to_vec(),
    }
}

/// Escapes a raw value back into RFC 4514 string form.
fn escape_value(value: &[u8]) -> String {
    let mut out = String::new();
    let len = value.len();
    let mut i = 0;
    while i < len {
        let b = value[i];
        let first = i == 0;
        let rest_utf8 = std::str::from_utf8(&value[i..]);
        match rest_utf8 {
            Ok(s) => {
                // The remainder is valid UTF-8: escape specials, pass the
                // rest through unchanged.
                for (j, c) in s.char_indices() {
                    let at_start = first && j == 0;
                    let at_end = i + j + c.len_utf8() == len;
                    match c {
                        '"' | '+' | ',' | ';' | '<' | '>' | '\\' => {
                            out.push('\\');
                            out.push(c);
                        }
                        '#' | ' ' if at_start => {
                            out.push('\\');
                            out.push(c);
                        }
                        ' ' if at_end => {
                            out.push('\\');
                            out.push(c);
                        }
                        c if (c as u32) < 0x20 => {
                            out.push_str(&format!("\\{:02x}", c as u32));
                        }
                        c => out.push(c),
                    }
                }
                return out;
            }
            Err(_) => {
                // Not valid UTF-8 from here: emit one byte as a hex escape
                // and retry UTF-8 decoding on the remainder.
                out.push_str(&format!("\\{b:02x}"));
                i += 1;
            }
        }
    }
    out
}

/// Parses a DN string into its RDN components.
fn parse_rdns(s: &str) -> Result<Vec<Rdn>, String> {
    let mut scanner = Scanner { bytes: s.as_bytes(), pos: 0 };
    scanner.skip_spaces();
    if scanner.at_end() {
        return Ok(Vec::new());
    }

    let mut rdns = Vec::new();
    loop {
        rdns.push(scanner.parse_rdn()?);
        scanner.skip_spaces();
        if scanner.at_end() {
            break;
        }
        scanner.expect(b',')?;
    }
    Ok(rdns)
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), String> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!(
                "expected '{}' at position {} of DN",
                b as char, self.pos
            ))
        }
    }

    fn parse_rdn(&mut self) -> Result<Rdn, String> {
        let mut avas = Vec::new();
        loop {
            self.skip_spaces();
            avas.push(self.parse_ava()?);
            self.skip_spaces();
            if self.peek() == Some(b'+') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(Rdn { avas })
    }

    fn parse_ava(&mut self) -> Result<Ava, String> {
        let attr = self.parse_attribute_type()?;
        self.skip_spaces();
        self.expect(b'=')?;
        self.skip_spaces();
        let value = self.parse_value()?;
        Ok(Ava { attr, value })
    }

    fn parse_attribute_type(&mut self) -> Result<String, String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(format!(
                "expected an attribute type at position {} of DN",
                self.pos
            ));
        }
        // Safe: the accepted bytes are all ASCII.
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn parse_value(&mut self) -> Result<Vec<u8>, String> {
        if self.peek() == Some(b'#') {
            self.pos += 1;
            return self.parse_hex_value();
        }

        let mut value = Vec::new();
        // Length of the value up to and including the last byte that is not
        // an unescaped trailing space.
        let mut significant = 0;
        while let Some(b) = self.peek() {
            match b {
                b',' | b'+' => break,
                b'\\' => {
                    self.pos += 1;
                    match self.take_escape()? {
                        Some(byte) => value.push(byte),
                        None => return Err("DN ends with a dangling escape".to_string()),
                    }
                    significant = value.len();
                }
                b' ' => {
                    value.push(b);
                    self.pos += 1;
                }
                _ => {
                    value.push(b);
                    self.pos += 1;
                    significant = value.len();
                }
            }
        }
        value.truncate(significant);
        Ok(value)
    }

    /// Resolves the character after a backslash: either two hex digits
    /// forming a byte, or a single literally-escaped byte.
    fn take_escape(&mut self) -> Result<Option<u8>, String> {
        let Some(first) = self.peek() else {
            return Ok(None);
        };
        let second = self.bytes.get(self.pos + 1).copied();
        if first.is_ascii_hexdigit() && second.map(|b| b.is_ascii_hexdigit()) == Some(true) {
            let hi = (first as char).to_digit(16).unwrap() as u8;
            let lo = (second.unwrap() as char).to_digit(16).unwrap() as u8;
            self.pos += 2;
            Ok(Some((hi << 4) | lo))
        } else {
            self.pos += 1;
            Ok(Some(first))
        }
    }

    fn parse_hex_value(&mut self) -> Result<Vec<u8>, String> {
        let mut value = Vec::new();
        while let Some(b) = self.peek() {
            if b == b',' || b == b'+' {
                break;
            }
            let second = self.bytes.get(self.pos + 1).copied();
            if !b.is_ascii_hexdigit() || second.map(|s| s.is_ascii_hexdigit()) != Some(true) {
                return Err(format!(
                    "invalid hex pair in DN value at position {}",
                    self.pos
                ));
            }
            let hi = (b as char).to_digit(16).unwrap() as u8;
            let lo = (second.unwrap() as char).to_digit(16).unwrap() as u8;
            value.push((hi << 4) | lo);
            self.pos += 2;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_dn() {
        let dn = Dn::parse("uid=bjensen,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.rdns().len(), 4);
        let rdn = dn.rdn().unwrap();
        assert_eq!(rdn.avas()[0].attribute_name(), "uid");
        assert_eq!(rdn.avas()[0].value(), b"bjensen");
    }

    #[test]
    fn empty_string_is_root() {
        let dn = Dn::parse("").unwrap();
        assert!(dn.is_root());
        assert_eq!(Dn::parse("   ").unwrap(), Dn::root());
    }

    #[test]
    fn equality_ignores_case_and_spacing() {
        let a = Dn::parse("CN=Babs Jensen, DC=Example").unwrap();
        let b = Dn::parse("cn=babs jensen,dc=example").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn multi_valued_rdn_is_unordered() {
        let a = Dn::parse("cn=a+sn=b,dc=example").unwrap();
        let b = Dn::parse("sn=b+cn=a,dc=example").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn resolves_escapes() {
        let dn = Dn::parse(r"cn=Doe\, John,dc=example").unwrap();
        assert_eq!(dn.rdns().len(), 2);
        assert_eq!(dn.rdn().unwrap().avas()[0].value(), b"Doe, John");

        let dn = Dn::parse(r"cn=\23leading,dc=example").unwrap();
        assert_eq!(dn.rdn().unwrap().avas()[0].value(), b"#leading");
    }

    #[test]
    fn hex_string_value() {
        let dn = Dn::parse("cn=#48656c6c6f,dc=example").unwrap();
        assert_eq!(dn.rdn().unwrap().avas()[0].value(), b"Hello");
    }

    #[test]
    fn trailing_unescaped_spaces_are_trimmed() {
        let dn = Dn::parse("cn=value  ,dc=example").unwrap();
        assert_eq!(dn.rdn().unwrap().avas()[0].value(), b"value");

        let dn = Dn::parse(r"cn=value\ ,dc=example").unwrap();
        assert_eq!(dn.rdn().unwrap().avas()[0].value(), b"value ");
    }

    #[test]
    fn descendant_checks() {
        let base = Dn::parse("dc=example,dc=com").unwrap();
        let child = Dn::parse("ou=People,dc=example,dc=com").unwrap();
        let other = Dn::parse("dc=other,dc=com").unwrap();
        assert!(child.is_descendant_of(&base));
        assert!(base.is_descendant_of(&base));
        assert!(!other.is_descendant_of(&base));
        assert!(child.is_descendant_of(&Dn::root()));
    }

    #[test]
    fn display_round_trips() {
        let dn = Dn::parse(r"cn=Doe\, John,dc=example").unwrap();
        let rendered = dn.to_string();
        assert_eq!(Dn::parse(&rendered).unwrap(), dn);
    }

    #[test]
    fn rdn_parse_rejects_multiple_components() {
        assert!(Rdn::parse("cn=a,dc=b").is_err());
        assert!(Rdn::parse("cn=a+sn=b").is_ok());
    }
}
