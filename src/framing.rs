//! Body framing: which of the header facts decide how a body is delimited.

use crate::error::ErrorCode;
use crate::types::{HttpVersion, Method, MessageType};

/// How the body of the current message is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body follows the header section.
    None,
    /// Exactly this many bytes follow.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// The body runs until the connection is closed.
    UntilClose,
}

/// Header facts gathered while parsing the header section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct HeaderFacts {
    pub content_length: Option<u64>,
    /// `Some(true)` when the final transfer coding is `chunked`.
    pub transfer_encoding: Option<bool>,
    pub connection_close: bool,
    pub connection_keep_alive: bool,
    pub connection_upgrade: bool,
    pub upgrade_header: bool,
}

impl HeaderFacts {
    /// Fold a complete `Connection` header value into the facts.
    pub(crate) fn add_connection(&mut self, value: &[u8]) {
        for token in value.split(|&b| b == b',') {
            let token = trim_ows(token);
            if token.eq_ignore_ascii_case(b"close") {
                self.connection_close = true;
            } else if token.eq_ignore_ascii_case(b"keep-alive") {
                self.connection_keep_alive = true;
            } else if token.eq_ignore_ascii_case(b"upgrade") {
                self.connection_upgrade = true;
            }
        }
    }

    /// Fold a complete `Transfer-Encoding` header value into the facts.
    ///
    /// Only the last coding of the last header counts: `chunked` must be
    /// applied last for the message to be chunked.
    pub(crate) fn add_transfer_encoding(&mut self, value: &[u8]) {
        let last = value
            .rsplit(|&b| b == b',')
            .map(trim_ows)
            .find(|t| !t.is_empty());
        match last {
            Some(coding) => {
                self.transfer_encoding = Some(coding.eq_ignore_ascii_case(b"chunked"));
            }
            None if self.transfer_encoding.is_none() => {
                self.transfer_encoding = Some(false);
            }
            None => {}
        }
    }

    /// Record a parsed `Content-Length`. Repeats must agree.
    pub(crate) fn add_content_length(&mut self, length: u64) -> Result<(), FramingError> {
        match self.content_length {
            Some(existing) if existing != length => Err(FramingError {
                code: ErrorCode::UnexpectedContentLength,
                reason: "Duplicate Content-Length",
            }),
            _ => {
                self.content_length = Some(length);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FramingError {
    pub code: ErrorCode,
    pub reason: &'static str,
}

/// Start-line facts the resolver needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StartLine {
    pub kind: MessageType,
    pub version: HttpVersion,
    pub method: Option<Method>,
    pub status_code: Option<u16>,
}

impl StartLine {
    /// Responses that can never carry a body.
    fn is_bodyless_status(&self) -> bool {
        matches!(self.status_code, Some(100..=199 | 204 | 304))
    }

    /// Whether the message switches protocols once it is complete.
    pub(crate) fn is_upgrade(&self, facts: &HeaderFacts) -> bool {
        match self.kind {
            MessageType::Request => {
                self.method == Some(Method::Connect)
                    || (facts.upgrade_header && facts.connection_upgrade)
            }
            MessageType::Response => self.status_code == Some(101),
        }
    }
}

/// Pick the body framing for a message whose header section just ended.
///
/// Precedence: chunked transfer coding, then `Content-Length`, then the
/// message-type default (no body for requests, read-until-close for
/// responses).
pub(crate) fn resolve(
    start: &StartLine,
    facts: &HeaderFacts,
    skip_body: bool,
) -> Result<Framing, FramingError> {
    if start.version == HttpVersion::HTTP_09 {
        return Ok(Framing::UntilClose);
    }

    if skip_body || start.is_bodyless_status() {
        return Ok(Framing::None);
    }

    match facts.transfer_encoding {
        Some(true) => return Ok(Framing::Chunked),
        Some(false) if start.kind == MessageType::Request => {
            return Err(FramingError {
                code: ErrorCode::InvalidTransferEncoding,
                reason: "Request has invalid `Transfer-Encoding`",
            });
        }
        Some(false) => return Ok(Framing::UntilClose),
        None => {}
    }

    match (facts.content_length, start.kind) {
        (Some(0), _) => Ok(Framing::None),
        (Some(n), _) => Ok(Framing::Length(n)),
        (None, MessageType::Request) => Ok(Framing::None),
        (None, MessageType::Response) => Ok(Framing::UntilClose),
    }
}

/// Whether the connection may carry another message after this one.
pub(crate) fn keep_alive(version: HttpVersion, facts: &HeaderFacts, framing: Framing) -> bool {
    if framing == Framing::UntilClose {
        return false;
    }
    if version >= HttpVersion::HTTP_11 {
        !facts.connection_close
    } else {
        facts.connection_keep_alive && !facts.connection_close
    }
}

/// Append a decimal digit to a `Content-Length` accumulator.
pub(crate) fn push_decimal(acc: u64, b: u8) -> Option<u64> {
    acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
}

/// Append a hex digit value to a chunk-size accumulator.
pub(crate) fn push_hex(acc: u64, digit: u8) -> Option<u64> {
    acc.checked_mul(16)?.checked_add(u64::from(digit))
}

fn trim_ows(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = s {
        s = rest;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method) -> StartLine {
        StartLine {
            kind: MessageType::Request,
            version: HttpVersion::HTTP_11,
            method: Some(method),
            status_code: None,
        }
    }

    fn response(status: u16) -> StartLine {
        StartLine {
            kind: MessageType::Response,
            version: HttpVersion::HTTP_11,
            method: None,
            status_code: Some(status),
        }
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let mut facts = HeaderFacts::default();
        facts.add_transfer_encoding(b"gzip, chunked");
        facts.add_content_length(10).unwrap();
        assert_eq!(resolve(&request(Method::Post), &facts, false), Ok(Framing::Chunked));
    }

    #[test]
    fn request_without_framing_has_no_body() {
        let facts = HeaderFacts::default();
        assert_eq!(resolve(&request(Method::Get), &facts, false), Ok(Framing::None));
    }

    #[test]
    fn response_without_framing_reads_until_close() {
        let facts = HeaderFacts::default();
        assert_eq!(resolve(&response(200), &facts, false), Ok(Framing::UntilClose));
        assert_eq!(resolve(&response(204), &facts, false), Ok(Framing::None));
        assert_eq!(resolve(&response(304), &facts, false), Ok(Framing::None));
        assert_eq!(resolve(&response(200), &facts, true), Ok(Framing::None));
    }

    #[test]
    fn request_with_non_chunked_final_coding_is_rejected() {
        let mut facts = HeaderFacts::default();
        facts.add_transfer_encoding(b"chunked, gzip");
        let err = resolve(&request(Method::Post), &facts, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransferEncoding);
        assert_eq!(resolve(&response(200), &facts, false), Ok(Framing::UntilClose));
    }

    #[test]
    fn zero_content_length_means_no_body() {
        let mut facts = HeaderFacts::default();
        facts.add_content_length(0).unwrap();
        assert_eq!(resolve(&request(Method::Post), &facts, false), Ok(Framing::None));
    }

    #[test]
    fn differing_content_lengths_conflict() {
        let mut facts = HeaderFacts::default();
        facts.add_content_length(3).unwrap();
        facts.add_content_length(3).unwrap();
        let err = facts.add_content_length(5).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedContentLength);
    }

    #[test]
    fn connection_tokens() {
        let mut facts = HeaderFacts::default();
        facts.add_connection(b"Keep-Alive, Upgrade");
        assert!(facts.connection_keep_alive);
        assert!(facts.connection_upgrade);
        assert!(!facts.connection_close);
    }

    #[test]
    fn keep_alive_defaults() {
        let mut facts = HeaderFacts::default();
        assert!(keep_alive(HttpVersion::HTTP_11, &facts, Framing::None));
        assert!(!keep_alive(HttpVersion::HTTP_10, &facts, Framing::None));
        assert!(!keep_alive(HttpVersion::HTTP_11, &facts, Framing::UntilClose));
        facts.add_connection(b"keep-alive");
        assert!(keep_alive(HttpVersion::HTTP_10, &facts, Framing::Length(3)));
        facts.add_connection(b"close");
        assert!(!keep_alive(HttpVersion::HTTP_11, &facts, Framing::None));
    }

    #[test]
    fn upgrade_detection() {
        let mut facts = HeaderFacts::default();
        assert!(request(Method::Connect).is_upgrade(&facts));
        assert!(!request(Method::Get).is_upgrade(&facts));
        facts.upgrade_header = true;
        facts.add_connection(b"upgrade");
        assert!(request(Method::Get).is_upgrade(&facts));
        assert!(response(101).is_upgrade(&facts));
        assert!(!response(200).is_upgrade(&facts));
    }

    #[test]
    fn accumulators_detect_overflow() {
        assert_eq!(push_decimal(12, b'3'), Some(123));
        assert_eq!(push_decimal(u64::MAX / 10 + 1, b'0'), None);
        assert_eq!(push_hex(0xA, 0xF), Some(0xAF));
        assert_eq!(push_hex(u64::MAX, 1), None);
    }
}
