//! Syntax validation for distinguished names (RFC 4514) and search filters
//! (RFC 4515).
//!
//! These checks only answer "would a server accept this string?"; nothing
//! here builds a parsed representation, the raw strings are sent as-is.

use std::fmt;

/// A syntax error, with the byte offset where it was detected when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub position: Option<usize>,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "{} at position {}", self.message, position),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SyntaxError {}

type Result<T> = std::result::Result<T, SyntaxError>;

/// Validate a distinguished name.
///
/// The empty DN (the root DSE) is valid.
pub fn validate_dn(dn: &str) -> Result<()> {
    if dn.trim().is_empty() {
        return Ok(());
    }

    let mut cursor = Cursor::new(dn);
    loop {
        cursor.relative_dn()?;
        match cursor.peek() {
            Some(b',') | Some(b';') => cursor.advance(),
            None => return Ok(()),
            Some(_) => return Err(cursor.error("expected ',' between RDNs")),
        }
    }
}

/// Validate a search filter such as `(&(objectClass=person)(uid=*))`.
///
/// Uses the parser that encodes the filter of every search, so a filter
/// accepted here is one the client can send.
pub fn validate_filter(filter: &str) -> Result<()> {
    ldap3::parse_filter(filter)
        .map(|_| ())
        .map_err(|_| SyntaxError {
            position: None,
            message: "not a valid search filter".to_string(),
        })
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn error(&self, message: &str) -> SyntaxError {
        SyntaxError {
            position: Some(self.pos),
            message: message.to_string(),
        }
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.advance();
                Ok(())
            }
            Some(_) => Err(self.error(&format!("expected '{}'", expected as char))),
            None => Err(self.error(&format!(
                "unexpected end of input, expected '{}'",
                expected as char
            ))),
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }

    fn expect_hex_pair(&mut self) -> Result<()> {
        for _ in 0..2 {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => self.advance(),
                _ => return Err(self.error("expected two hex digits")),
            }
        }
        Ok(())
    }

    /// `descr` (keystring) or `numericoid`.
    fn oid_or_descr(&mut self) -> Result<()> {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                self.advance();
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'-') {
                    self.advance();
                }
                Ok(())
            }
            Some(c) if c.is_ascii_digit() => {
                loop {
                    if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                        return Err(self.error("expected digit in numeric OID"));
                    }
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                        self.advance();
                    }
                    if self.peek() != Some(b'.') {
                        return Ok(());
                    }
                    self.advance();
                }
            }
            _ => Err(self.error("expected attribute type")),
        }
    }

    fn relative_dn(&mut self) -> Result<()> {
        loop {
            self.skip_spaces();
            self.oid_or_descr()?;
            self.skip_spaces();
            self.expect(b'=')?;
            self.skip_spaces();
            self.dn_value()?;
            if self.peek() == Some(b'+') {
                self.advance();
                continue;
            }
            return Ok(());
        }
    }

    fn dn_value(&mut self) -> Result<()> {
        if self.peek() == Some(b'#') {
            self.advance();
            self.expect_hex_pair()?;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.expect_hex_pair()?;
            }
            self.skip_spaces();
            return Ok(());
        }

        while let Some(c) = self.peek() {
            match c {
                b',' | b';' | b'+' => break,
                b'\\' => {
                    self.advance();
                    match self.peek() {
                        Some(
                            b' ' | b'"' | b'#' | b'+' | b',' | b';' | b'<' | b'=' | b'>' | b'\\',
                        ) => self.advance(),
                        Some(c) if c.is_ascii_hexdigit() => self.expect_hex_pair()?,
                        _ => return Err(self.error("invalid escape sequence")),
                    }
                }
                b'"' | b'<' | b'>' | 0 => {
                    return Err(self.error("character must be escaped in attribute value"));
                }
                _ => self.advance(),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_dns() {
        for dn in [
            "",
            "dc=example,dc=com",
            "ou=people, dc=example, dc=com",
            "cn=snmp,cn=monitor",
            "cn=John Smith+uid=jsmith,ou=people,dc=example,dc=com",
            "cn=Lu\\C4\\8Di\\C4\\87,dc=example",
            "cn=a\\,b,dc=example",
            "1.3.6.1.4.1.1466.0=#04024869,dc=example",
            "cn=monitor;dc=example",
        ] {
            assert!(validate_dn(dn).is_ok(), "expected '{}' to be valid", dn);
        }
    }

    #[test]
    fn test_invalid_dns() {
        for dn in [
            "example.com",
            "=foo",
            "cn=foo,",
            "cn=a\"b",
            "cn=bad\\zz",
            "cn=x,dc",
            "1.=foo",
            "cn=#zz",
        ] {
            assert!(validate_dn(dn).is_err(), "expected '{}' to be invalid", dn);
        }
    }

    #[test]
    fn test_valid_filters() {
        for filter in [
            "(objectClass=*)",
            "(cn=Babs Jensen)",
            "(!(cn=Tim Howes))",
            "(&(objectClass=Person)(|(sn=Jensen)(cn=Babs J*)))",
            "(o=univ*of*mich*)",
            "(cn:caseExactMatch:=Fred Flintstone)",
            "(sn:dn:2.4.6.8.10:=Barney Rubble)",
            "(cn=*\\2A*)",
            "(createTimestamp>=20240101000000Z)",
            "(uidNumber<=1000)",
            "(cn~=jensen)",
        ] {
            assert!(
                validate_filter(filter).is_ok(),
                "expected '{}' to be valid",
                filter
            );
        }
    }

    #[test]
    fn test_invalid_filters() {
        for filter in [
            "",
            "(objectClass=*",
            "(=foo)",
            "(&(cn=a)",
            "(cn=*a**b)",
        ] {
            assert!(
                validate_filter(filter).is_err(),
                "expected '{}' to be invalid",
                filter
            );
        }
    }

    #[test]
    fn test_dn_error_reports_position() {
        let err = validate_dn("cn=a\"b").unwrap_err();
        assert_eq!(err.position, Some(4));
        assert!(err.to_string().contains("position 4"));
    }
}
