//! Byte classes and token tables used by the state machine (RFC 9110 / RFC 9112).

use crate::types::Method;

/// Longest method token in [`Method::ALL`].
pub(crate) const MAX_METHOD_LEN: usize = 11;

/// `tchar` – characters allowed in HTTP tokens (method, header names).
///
/// ```text
/// tchar = "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" / "-" / "." /
///         "^" / "_" / "`" / "|" / "~" / DIGIT / ALPHA
/// ```
#[inline]
pub(crate) fn is_tchar(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#'
            | b'$'
            | b'%'
            | b'&'
            | b'\''
            | b'*'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~'
            | b'0'..=b'9'
            | b'a'..=b'z'
            | b'A'..=b'Z'
    )
}

/// Bytes permitted inside a header field value:
/// `SP / HTAB / VCHAR / obs-text`.
#[inline]
pub(crate) fn is_field_content_byte(b: u8) -> bool {
    b == b' ' || b == b'\t' || (0x21..=0x7E).contains(&b) || b >= 0x80
}

/// Bytes permitted in a request target. No normalization or
/// component validation happens here.
#[inline]
pub(crate) fn is_url_byte(b: u8) -> bool {
    b > b' ' && b != 0x7F
}

/// Optional whitespace.
#[inline]
pub(crate) fn is_ows(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Bytes permitted in a reason phrase: `HTAB / SP / VCHAR / obs-text`.
#[inline]
pub(crate) fn is_reason_byte(b: u8) -> bool {
    is_field_content_byte(b)
}

#[inline]
pub(crate) fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// `true` if some known method starts with `prefix`.
pub(crate) fn is_method_prefix(prefix: &[u8]) -> bool {
    Method::ALL
        .iter()
        .any(|m| m.as_str().as_bytes().starts_with(prefix))
}

/// Header fields the parser interprets while reading the header section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderKind {
    General,
    ContentLength,
    TransferEncoding,
    Connection,
    Upgrade,
}

impl HeaderKind {
    pub(crate) fn classify(name: &[u8]) -> Self {
        if name.eq_ignore_ascii_case(b"content-length") {
            Self::ContentLength
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            Self::TransferEncoding
        } else if name.eq_ignore_ascii_case(b"connection") {
            Self::Connection
        } else if name.eq_ignore_ascii_case(b"upgrade") {
            Self::Upgrade
        } else {
            Self::General
        }
    }
}

/// Fixed-capacity buffer for a method token that may span `execute` calls.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MethodToken {
    buf: [u8; MAX_METHOD_LEN],
    len: usize,
}

impl MethodToken {
    /// Append `b`; `false` if no known method can start with the result.
    pub(crate) fn push(&mut self, b: u8) -> bool {
        if self.len == MAX_METHOD_LEN {
            return false;
        }
        self.buf[self.len] = b;
        self.len += 1;
        is_method_prefix(self.as_bytes())
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub(crate) fn method(&self) -> Option<Method> {
        Method::from_bytes(self.as_bytes())
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tchar_accepts_valid_bytes() {
        for &b in b"abcXYZ019!#$%&'*+-.^_`|~" {
            assert!(is_tchar(b), "expected tchar for byte 0x{b:02X}");
        }
    }

    #[test]
    fn tchar_rejects_invalid_bytes() {
        for &b in b" \t\r\n@[]{}:" {
            assert!(!is_tchar(b), "expected non-tchar for byte 0x{b:02X}");
        }
    }

    #[test]
    fn field_content_byte_rejects_ctl() {
        assert!(is_field_content_byte(b'\t'));
        assert!(is_field_content_byte(0xFF));
        assert!(!is_field_content_byte(0x00));
        assert!(!is_field_content_byte(b'\r'));
        assert!(!is_field_content_byte(0x7F));
    }

    #[test]
    fn url_bytes() {
        assert!(is_url_byte(b'/'));
        assert!(is_url_byte(b'%'));
        assert!(!is_url_byte(b' '));
        assert!(!is_url_byte(b'\r'));
    }

    #[test]
    fn hex_digits() {
        assert_eq!(hex_value(b'a'), Some(10));
        assert_eq!(hex_value(b'F'), Some(15));
        assert_eq!(hex_value(b'7'), Some(7));
        assert_eq!(hex_value(b'g'), None);
    }

    #[test]
    fn method_prefixes() {
        assert!(is_method_prefix(b"G"));
        assert!(is_method_prefix(b"M-SE"));
        assert!(is_method_prefix(b"PROPP"));
        assert!(!is_method_prefix(b"I"));
        assert!(!is_method_prefix(b"GETX"));
        assert!(!is_method_prefix(b"get"));
    }

    #[test]
    fn method_token_rejects_unknown_prefix() {
        let mut token = MethodToken::default();
        assert!(token.push(b'P'));
        assert!(token.push(b'U'));
        assert_eq!(token.method(), None);
        assert!(token.push(b'T'));
        assert_eq!(token.method(), Some(Method::Put));
        assert!(!token.push(b'X'));
    }

    #[test]
    fn header_kinds_ignore_case() {
        assert_eq!(HeaderKind::classify(b"content-LENGTH"), HeaderKind::ContentLength);
        assert_eq!(HeaderKind::classify(b"Transfer-Encoding"), HeaderKind::TransferEncoding);
        assert_eq!(HeaderKind::classify(b"CONNECTION"), HeaderKind::Connection);
        assert_eq!(HeaderKind::classify(b"Upgrade"), HeaderKind::Upgrade);
        assert_eq!(HeaderKind::classify(b"Host"), HeaderKind::General);
    }
}
