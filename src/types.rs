use serde::{Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Which kind of message a session parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum MessageType {
    Request = 1,
    Response = 2,
}

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// Request methods understood by the parser, with their stable numeric values.
///
/// Covers the RFC 9110 methods plus the WebDAV, UPnP and other extension
/// methods that show up on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    Delete = 0,
    Get = 1,
    Head = 2,
    Post = 3,
    Put = 4,
    Connect = 5,
    Options = 6,
    Trace = 7,
    Copy = 8,
    Lock = 9,
    Mkcol = 10,
    Move = 11,
    Propfind = 12,
    Proppatch = 13,
    Search = 14,
    Unlock = 15,
    Bind = 16,
    Rebind = 17,
    Unbind = 18,
    Acl = 19,
    Report = 20,
    Mkactivity = 21,
    Checkout = 22,
    Merge = 23,
    MSearch = 24,
    Notify = 25,
    Subscribe = 26,
    Unsubscribe = 27,
    Patch = 28,
    Purge = 29,
    Mkcalendar = 30,
    Link = 31,
    Unlink = 32,
    Source = 33,
    Query = 46,
}

impl Method {
    /// Every method, in numeric order.
    pub const ALL: [Method; 35] = [
        Self::Delete,
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Connect,
        Self::Options,
        Self::Trace,
        Self::Copy,
        Self::Lock,
        Self::Mkcol,
        Self::Move,
        Self::Propfind,
        Self::Proppatch,
        Self::Search,
        Self::Unlock,
        Self::Bind,
        Self::Rebind,
        Self::Unbind,
        Self::Acl,
        Self::Report,
        Self::Mkactivity,
        Self::Checkout,
        Self::Merge,
        Self::MSearch,
        Self::Notify,
        Self::Subscribe,
        Self::Unsubscribe,
        Self::Patch,
        Self::Purge,
        Self::Mkcalendar,
        Self::Link,
        Self::Unlink,
        Self::Source,
        Self::Query,
    ];

    /// Parse a method from its exact (case-sensitive) token.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().as_bytes() == bytes)
    }

    /// Look a method up by its numeric value.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.code() == code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Return the method as a static string slice.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Copy => "COPY",
            Self::Lock => "LOCK",
            Self::Mkcol => "MKCOL",
            Self::Move => "MOVE",
            Self::Propfind => "PROPFIND",
            Self::Proppatch => "PROPPATCH",
            Self::Search => "SEARCH",
            Self::Unlock => "UNLOCK",
            Self::Bind => "BIND",
            Self::Rebind => "REBIND",
            Self::Unbind => "UNBIND",
            Self::Acl => "ACL",
            Self::Report => "REPORT",
            Self::Mkactivity => "MKACTIVITY",
            Self::Checkout => "CHECKOUT",
            Self::Merge => "MERGE",
            Self::MSearch => "M-SEARCH",
            Self::Notify => "NOTIFY",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Patch => "PATCH",
            Self::Purge => "PURGE",
            Self::Mkcalendar => "MKCALENDAR",
            Self::Link => "LINK",
            Self::Unlink => "UNLINK",
            Self::Source => "SOURCE",
            Self::Query => "QUERY",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HttpVersion
// ---------------------------------------------------------------------------

/// HTTP protocol version as parsed from the start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_09: Self = Self::new(0, 9);
    pub const HTTP_10: Self = Self::new(1, 0);
    pub const HTTP_11: Self = Self::new(1, 1);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Versions that may appear spelled out in a start line.
    pub(crate) fn is_supported(self) -> bool {
        self == Self::HTTP_10 || self == Self::HTTP_11
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

impl Serialize for HttpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// A single HTTP header field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    /// Header field name (original casing preserved).
    pub name: String,
    /// Header field value (leading/trailing OWS trimmed).
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Head
// ---------------------------------------------------------------------------

/// Everything known about a message once its header section is complete.
///
/// Delivered with [`Event::HeadersComplete`](crate::Event::HeadersComplete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Head {
    pub kind: MessageType,
    pub version: HttpVersion,
    /// Request method; `None` for responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    /// Request target; empty for responses.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Response status code; `None` for requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Response reason phrase; `None` for requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Header fields in arrival order, duplicates included.
    pub headers: Vec<Header>,
    pub upgrade: bool,
    pub keep_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    pub chunked: bool,
}

impl Head {
    pub(crate) fn new(kind: MessageType) -> Self {
        Self {
            kind,
            version: HttpVersion::default(),
            method: None,
            url: String::new(),
            status_code: None,
            status_message: None,
            headers: Vec::new(),
            upgrade: false,
            keep_alive: false,
            content_length: None,
            chunked: false,
        }
    }

    /// Look up the first header value by name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Return all values for headers matching `name` (case-insensitive).
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A fully assembled message, as built by [`Collector`](crate::Collector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    #[serde(flatten)]
    pub head: Head,
    /// Concatenation of every body fragment.
    #[serde(serialize_with = "serialize_body")]
    pub body: Vec<u8>,
    /// Trailer fields of a chunked message.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trailers: Vec<Header>,
    /// `false` while the message is still being received.
    pub complete: bool,
}

/// Serialize body bytes as a UTF-8 string (lossy) for JSON output.
fn serialize_body<S: Serializer>(body: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(body))
}

impl Message {
    /// Return the body as a UTF-8 `&str` if it is valid UTF-8.
    pub fn body_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.head.header_value(name)
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.head.header_values(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_codes_are_stable() {
        assert_eq!(Method::Delete.code(), 0);
        assert_eq!(Method::Get.code(), 1);
        assert_eq!(Method::MSearch.code(), 24);
        assert_eq!(Method::Query.code(), 46);
        for m in Method::ALL {
            assert_eq!(Method::from_code(m.code()), Some(m));
            assert_eq!(Method::from_bytes(m.as_str().as_bytes()), Some(m));
        }
    }

    #[test]
    fn method_lookup_is_case_sensitive() {
        assert_eq!(Method::from_bytes(b"get"), None);
        assert_eq!(Method::from_bytes(b"M-SEARCH"), Some(Method::MSearch));
    }

    #[test]
    fn version_display() {
        assert_eq!(HttpVersion::HTTP_11.to_string(), "HTTP/1.1");
        assert_eq!(HttpVersion::HTTP_09.to_string(), "HTTP/0.9");
        assert!(HttpVersion::HTTP_10.is_supported());
        assert!(!HttpVersion::new(9, 9).is_supported());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut head = Head::new(MessageType::Request);
        head.headers.push(Header::new("Set-Cookie", "a=1"));
        head.headers.push(Header::new("set-cookie", "b=2"));
        assert_eq!(head.header_value("SET-COOKIE"), Some("a=1"));
        assert_eq!(head.header_values("Set-Cookie"), vec!["a=1", "b=2"]);
    }
}
