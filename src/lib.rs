//! # h1stream
//!
//! An **incremental HTTP/1.x parser** with a session/event interface.
//!
//! Bytes are fed in arbitrarily-sized chunks as they arrive from the
//! transport; the parser reports message elements (request target, header
//! fields, body fragments, ...) to a [`Handler`] as soon as they are
//! recognized, without buffering the whole message. Requests and responses,
//! `Content-Length`, chunked and close-delimited bodies, pipelining,
//! pause/resume and protocol upgrades are supported. Every fault carries a
//! stable [`ErrorCode`] and the byte offset where it happened.
//!
//! ## Quick start: sessions and events
//!
//! ```rust
//! use h1stream::{Control, Engine, Event, MessageType, Outcome};
//!
//! let engine = Engine::new();
//! let mut urls = Vec::new();
//! let mut session = engine.session(MessageType::Request, |event: Event<'_>| {
//!     if let Event::Url(fragment) = event {
//!         urls.push(fragment.to_vec());
//!     }
//!     Control::Continue
//! });
//!
//! // The target is split across two reads.
//! assert_eq!(session.execute(b"GET /hel"), Ok(Outcome::Ok));
//! assert_eq!(session.execute(b"lo HTTP/1.1\r\n\r\n"), Ok(Outcome::Ok));
//! drop(session);
//! assert_eq!(urls.concat(), b"/hello");
//! ```
//!
//! ## Quick start: whole messages
//!
//! ```rust
//! use h1stream::{MessageType, parse_messages};
//!
//! let raw = b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello";
//! let messages = parse_messages(MessageType::Request, raw).unwrap();
//! assert_eq!(messages[0].head.url, "/submit");
//! assert_eq!(messages[0].body_as_str(), Some("hello"));
//! ```

mod error;
mod event;
mod framing;
mod lexer;
mod output;
mod parser;
mod session;
mod types;

// Re-export public API.
pub use error::{ErrorCode, ParseError, PoolError};
pub use event::{Collector, Control, Event, EventKind, Handler, RecordedEvent};
pub use framing::Framing;
pub use output::{format_debug, format_events, format_headers_only, format_json};
pub use parser::{Outcome, Parser, ParserConfig};
pub use session::{Engine, Session, SessionHandle, SessionPool};
pub use types::{Head, Header, HttpVersion, Message, MessageType, Method};

/// Parse every message in `data` and return them fully assembled.
///
/// This is a convenience wrapper around a [`Session`] with a [`Collector`]
/// that also signals end of input, so a close-delimited response body is
/// completed. For streaming use-cases, create a session directly.
///
/// # Errors
///
/// Returns [`ParseError`] if the data is malformed or ends inside a message.
pub fn parse_messages(kind: MessageType, data: &[u8]) -> Result<Vec<Message>, ParseError> {
    parse_messages_with_config(kind, data, ParserConfig::default())
}

/// Like [`parse_messages`], using custom [`ParserConfig`] limits.
///
/// # Errors
///
/// Returns [`ParseError`] if the data is malformed, ends inside a message,
/// or exceeds the configured limits.
pub fn parse_messages_with_config(
    kind: MessageType,
    data: &[u8],
    config: ParserConfig,
) -> Result<Vec<Message>, ParseError> {
    let mut session = Engine::with_config(config).session(kind, Collector::new(kind));
    match session.execute(data)? {
        // Whatever follows an upgrade belongs to another protocol.
        Outcome::Upgrade { .. } => {}
        Outcome::Ok | Outcome::Paused { .. } => session.finish()?,
    }
    Ok(session.into_handler().into_messages())
}
