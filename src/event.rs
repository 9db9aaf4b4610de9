use serde::Serialize;

use crate::types::{Head, Header, Message, MessageType};

/// A parser event.
///
/// Slices borrow the buffer passed to the current `execute` call and are
/// only valid for the duration of the dispatch. A value that spans several
/// `execute` calls is delivered as several fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A new message starts; all per-message state has been cleared.
    MessageBegin,
    /// Fragment of the request target.
    Url(&'a [u8]),
    /// Fragment of the response reason phrase.
    Status(&'a [u8]),
    /// Fragment of a header (or trailer) field name.
    HeaderField(&'a [u8]),
    /// Fragment of a header (or trailer) field value.
    HeaderValue(&'a [u8]),
    /// The header section is complete.
    HeadersComplete(&'a Head),
    /// A chunk of the given size follows (chunked framing only).
    ChunkHeader(u64),
    /// Fragment of the message body. Chunk-size lines and CRLFs are never included.
    Body(&'a [u8]),
    /// The current chunk, including its trailing CRLF, has been consumed.
    ChunkComplete,
    MessageComplete,
}

/// Payload-free discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageBegin,
    Url,
    Status,
    HeaderField,
    HeaderValue,
    HeadersComplete,
    ChunkHeader,
    Body,
    ChunkComplete,
    MessageComplete,
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageBegin => EventKind::MessageBegin,
            Event::Url(_) => EventKind::Url,
            Event::Status(_) => EventKind::Status,
            Event::HeaderField(_) => EventKind::HeaderField,
            Event::HeaderValue(_) => EventKind::HeaderValue,
            Event::HeadersComplete(_) => EventKind::HeadersComplete,
            Event::ChunkHeader(_) => EventKind::ChunkHeader,
            Event::Body(_) => EventKind::Body,
            Event::ChunkComplete => EventKind::ChunkComplete,
            Event::MessageComplete => EventKind::MessageComplete,
        }
    }
}

/// What the parser should do after an event has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    /// Keep parsing.
    #[default]
    Continue,
    /// Stop after this event; `execute` returns
    /// [`Outcome::Paused`](crate::Outcome::Paused) and the session waits for
    /// `resume`.
    Pause,
    /// Only meaningful for [`Event::HeadersComplete`]: the message has no
    /// body regardless of its framing headers (e.g. a response to `HEAD`).
    /// Treated as `Continue` for every other event.
    SkipBody,
    /// Fail the current `execute` with the callback error code for this event.
    Abort,
}

/// Receives the events of one session.
pub trait Handler {
    fn on_event(&mut self, event: Event<'_>) -> Control;
}

impl<F> Handler for F
where
    F: FnMut(Event<'_>) -> Control,
{
    fn on_event(&mut self, event: Event<'_>) -> Control {
        self(event)
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Owned copy of an [`Event`], as recorded by [`Collector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RecordedEvent {
    MessageBegin,
    Url(String),
    Status(String),
    HeaderField(String),
    HeaderValue(String),
    HeadersComplete,
    ChunkHeader(u64),
    Body(String),
    ChunkComplete,
    MessageComplete,
}

impl RecordedEvent {
    fn from_event(event: &Event<'_>) -> Self {
        let text = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
        match *event {
            Event::MessageBegin => Self::MessageBegin,
            Event::Url(b) => Self::Url(text(b)),
            Event::Status(b) => Self::Status(text(b)),
            Event::HeaderField(b) => Self::HeaderField(text(b)),
            Event::HeaderValue(b) => Self::HeaderValue(text(b)),
            Event::HeadersComplete(_) => Self::HeadersComplete,
            Event::ChunkHeader(n) => Self::ChunkHeader(n),
            Event::Body(b) => Self::Body(text(b)),
            Event::ChunkComplete => Self::ChunkComplete,
            Event::MessageComplete => Self::MessageComplete,
        }
    }
}

/// A [`Handler`] that assembles whole [`Message`]s out of the event stream.
///
/// Fragments are concatenated, trailers are gathered after the body, and
/// every event can optionally be recorded in order.
#[derive(Debug)]
pub struct Collector {
    kind: MessageType,
    messages: Vec<Message>,
    events: Option<Vec<RecordedEvent>>,
    trailer_field: Vec<u8>,
    trailer_value: Vec<u8>,
    in_trailer_value: bool,
    head_seen: bool,
}

impl Collector {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            messages: Vec::new(),
            events: None,
            trailer_field: Vec::new(),
            trailer_value: Vec::new(),
            in_trailer_value: false,
            head_seen: false,
        }
    }

    /// Also keep an ordered log of every event.
    pub fn with_events(mut self) -> Self {
        self.events = Some(Vec::new());
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Recorded events; empty unless built [`with_events`](Self::with_events).
    pub fn events(&self) -> &[RecordedEvent] {
        self.events.as_deref().unwrap_or(&[])
    }

    /// Messages that reached `MessageComplete`.
    pub fn completed(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.complete)
    }

    fn flush_trailer(&mut self) {
        if !self.in_trailer_value {
            return;
        }
        let header = Header {
            name: String::from_utf8_lossy(&self.trailer_field).into_owned(),
            value: String::from_utf8_lossy(&self.trailer_value).into_owned(),
        };
        if let Some(msg) = self.messages.last_mut() {
            msg.trailers.push(header);
        }
        self.trailer_field.clear();
        self.trailer_value.clear();
        self.in_trailer_value = false;
    }
}

impl Handler for Collector {
    fn on_event(&mut self, event: Event<'_>) -> Control {
        if let Some(events) = self.events.as_mut() {
            events.push(RecordedEvent::from_event(&event));
        }

        match event {
            Event::MessageBegin => {
                self.head_seen = false;
                self.messages.push(Message {
                    head: Head::new(self.kind),
                    body: Vec::new(),
                    trailers: Vec::new(),
                    complete: false,
                });
            }
            Event::HeadersComplete(head) => {
                self.head_seen = true;
                if let Some(msg) = self.messages.last_mut() {
                    msg.head = head.clone();
                }
            }
            Event::Body(data) => {
                if let Some(msg) = self.messages.last_mut() {
                    msg.body.extend_from_slice(data);
                }
            }
            // Header fragments before HeadersComplete are covered by the
            // snapshot; only trailers need assembling here.
            Event::HeaderField(data) if self.head_seen => {
                self.flush_trailer();
                self.trailer_field.extend_from_slice(data);
            }
            Event::HeaderValue(data) if self.head_seen => {
                self.in_trailer_value = true;
                self.trailer_value.extend_from_slice(data);
            }
            Event::MessageComplete => {
                self.flush_trailer();
                if let Some(msg) = self.messages.last_mut() {
                    msg.complete = true;
                }
            }
            _ => {}
        }
        Control::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpVersion;

    #[test]
    fn closures_are_handlers() {
        let mut seen = Vec::new();
        let mut handler = |event: Event<'_>| {
            seen.push(event.kind());
            Control::Continue
        };
        assert_eq!(handler.on_event(Event::MessageBegin), Control::Continue);
        assert_eq!(handler.on_event(Event::Body(b"x")), Control::Continue);
        assert_eq!(seen, vec![EventKind::MessageBegin, EventKind::Body]);
    }

    #[test]
    fn boxed_handlers() {
        let mut boxed: Box<dyn FnMut(Event<'_>) -> Control> = Box::new(|event| match event {
            Event::Body(_) => Control::Pause,
            _ => Control::Continue,
        });
        assert_eq!(boxed.on_event(Event::Body(b"x")), Control::Pause);

        let mut collector: Box<dyn Handler> = Box::new(Collector::new(MessageType::Request));
        let handler: &mut dyn Handler = &mut *collector;
        assert_eq!(handler.on_event(Event::MessageBegin), Control::Continue);
    }

    #[test]
    fn collector_assembles_fragments_and_trailers() {
        let mut c = Collector::new(MessageType::Request).with_events();
        let mut head = Head::new(MessageType::Request);
        head.version = HttpVersion::HTTP_11;

        c.on_event(Event::MessageBegin);
        c.on_event(Event::Url(b"/a"));
        c.on_event(Event::HeadersComplete(&head));
        c.on_event(Event::Body(b"hel"));
        c.on_event(Event::Body(b"lo"));
        c.on_event(Event::HeaderField(b"Exp"));
        c.on_event(Event::HeaderField(b"ires"));
        c.on_event(Event::HeaderValue(b"never"));
        c.on_event(Event::HeaderField(b"X"));
        c.on_event(Event::HeaderValue(b""));
        c.on_event(Event::MessageComplete);

        let msg = &c.messages()[0];
        assert!(msg.complete);
        assert_eq!(msg.body_as_str(), Some("hello"));
        assert_eq!(
            msg.trailers,
            vec![Header::new("Expires", "never"), Header::new("X", "")]
        );
        assert_eq!(c.events().len(), 11);
        assert_eq!(c.events()[1], RecordedEvent::Url("/a".into()));
    }
}
