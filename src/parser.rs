use tracing::{debug, trace};

use crate::error::{ErrorCode, ParseError};
use crate::event::{Control, Event, EventKind, Handler};
use crate::framing::{self, Framing, HeaderFacts, StartLine};
use crate::lexer::{
    HeaderKind, MethodToken, hex_value, is_field_content_byte, is_ows, is_reason_byte, is_tchar,
    is_url_byte,
};
use crate::types::{Head, Header, HttpVersion, Method, MessageType};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configurable limits for the HTTP parser.
///
/// All sizes are in bytes unless stated otherwise. Bodies are streamed and
/// never buffered, so there is no body limit.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum length of the request target (default: 8 192).
    pub max_url_len: usize,
    /// Maximum length of a single header field name (default: 256).
    pub max_header_name_len: usize,
    /// Maximum length of a single header field value or reason phrase (default: 8 192).
    pub max_header_value_len: usize,
    /// Maximum number of header (and trailer) fields per message (default: 128).
    pub max_headers_count: usize,
    /// Accept the HTTP/0.9 short request form `GET /\r\n` (default: true).
    pub allow_http09: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_url_len: 8_192,
            max_header_name_len: 256,
            max_header_value_len: 8_192,
            max_headers_count: 128,
            allow_http09: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a successful [`Parser::execute`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The whole buffer was consumed.
    Ok,
    /// A handler (or [`Parser::pause`]) stopped parsing. Bytes from `offset`
    /// on were not consumed; feed them again after [`Parser::resume`].
    Paused { offset: usize },
    /// The message switched protocols. Bytes from `offset` on belong to the
    /// new protocol and were not parsed.
    Upgrade { offset: usize },
}

impl Outcome {
    /// Numeric status of this outcome (`0`, `PAUSED` or `PAUSED_UPGRADE`).
    pub fn code(self) -> ErrorCode {
        match self {
            Self::Ok => ErrorCode::Ok,
            Self::Paused { .. } => ErrorCode::Paused,
            Self::Upgrade { .. } => ErrorCode::PausedUpgrade,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    // ---- Between messages ----
    Start,

    // ---- Request line ----
    ReqMethod,
    ReqUrlStart,
    ReqUrl,
    ReqHttp09Lf,
    ReqLineCr,

    // ---- Version (shared) ----
    VersionConst(u8),
    VersionMajor,
    VersionDot,
    VersionMinor,

    // ---- Status line ----
    ResStatusSpace,
    ResStatusCode(u8),
    ResStatusEnd,
    ResReason,

    StartLineLf,

    // ---- Header (and trailer) section ----
    HeaderLineStart,
    HeaderField,
    HeaderValueStart,
    HeaderValue,
    HeaderValueLf,
    HeaderFoldOws,
    HeadersAlmostDone,
    /// Framing is resolved and `HeadersComplete` dispatched; consumes nothing.
    HeadersDone,

    // ---- Fixed-length / close-delimited body ----
    Body,
    BodyUntilClose,

    // ---- Chunked transfer encoding ----
    ChunkSizeStart,
    ChunkSize,
    ChunkExt,
    ChunkSizeLf,
    ChunkData,
    ChunkDataCr,
    ChunkDataLf,

    // ---- Done ----
    /// `MessageComplete` is dispatched; consumes nothing.
    MessageDone,
    Closed,
    Upgraded,
    Error,
}

const HTTP_CONSTANT: &[u8; 5] = b"HTTP/";

fn err(code: ErrorCode, reason: &'static str, offset: usize) -> ParseError {
    ParseError::new(code, reason, offset)
}

fn abort_reason(kind: EventKind) -> &'static str {
    match kind {
        EventKind::MessageBegin => "`on_message_begin` callback error",
        EventKind::HeadersComplete => "`on_headers_complete` callback error",
        EventKind::MessageComplete => "`on_message_complete` callback error",
        EventKind::ChunkHeader => "`on_chunk_header` callback error",
        EventKind::ChunkComplete => "`on_chunk_complete` callback error",
        _ => "Span callback error",
    }
}

/// Deliver one event; `Abort` becomes the callback error for the event kind.
fn dispatch<H: Handler + ?Sized>(
    handler: &mut H,
    event: Event<'_>,
    at: usize,
) -> Result<Control, ParseError> {
    let kind = event.kind();
    match handler.on_event(event) {
        Control::Abort => Err(err(ErrorCode::for_abort(kind), abort_reason(kind), at)),
        control => Ok(control),
    }
}

fn paused(offset: usize) -> Outcome {
    debug!(offset, "parser paused by handler");
    Outcome::Paused { offset }
}

/// Dispatch an event and stop with `Paused { offset: $resume }` if asked to.
macro_rules! emit {
    ($handler:expr, $event:expr, $at:expr, $resume:expr) => {
        if dispatch($handler, $event, $at)? == Control::Pause {
            return Ok(paused($resume));
        }
    };
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// An incremental, state-machine-based HTTP/1.x parser.
///
/// The parser owns no handler: every [`execute`](Parser::execute) call is
/// given the [`Handler`] that receives the events. [`Session`](crate::Session)
/// bundles a parser with its handler.
///
/// ```rust
/// use h1stream::{Collector, MessageType, Outcome, Parser, ParserConfig};
///
/// let mut parser = Parser::new(MessageType::Request, ParserConfig::default());
/// let mut collector = Collector::new(MessageType::Request);
///
/// let status = parser.execute(&mut collector, b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
/// assert_eq!(status, Ok(Outcome::Ok));
/// assert_eq!(collector.messages()[0].head.url, "/");
/// ```
#[derive(Debug, Clone)]
pub struct Parser {
    kind: MessageType,
    config: ParserConfig,
    state: State,
    error: Option<ParseError>,
    paused: bool,

    // Per-call span bookkeeping (indices into the current buffer).
    mark: Option<usize>,
    ws_from: Option<usize>,
    token_start: Option<usize>,

    // Per-message accumulation.
    head: Head,
    facts: HeaderFacts,
    framing: Option<Framing>,
    method: MethodToken,
    url: Vec<u8>,
    reason: Vec<u8>,
    field: Vec<u8>,
    value: Vec<u8>,
    pending_ws: Vec<u8>,
    header_kind: HeaderKind,
    header_pending: bool,
    value_emitted: bool,
    header_count: usize,
    span_len: usize,
    cl_acc: Option<u64>,
    status: u16,
    major: u8,
    in_trailers: bool,

    // Body bookkeeping.
    remaining: u64,
}

impl Parser {
    pub fn new(kind: MessageType, config: ParserConfig) -> Self {
        Self {
            kind,
            config,
            state: State::Start,
            error: None,
            paused: false,
            mark: None,
            ws_from: None,
            token_start: None,
            head: Head::new(kind),
            facts: HeaderFacts::default(),
            framing: None,
            method: MethodToken::default(),
            url: Vec::with_capacity(256),
            reason: Vec::new(),
            field: Vec::with_capacity(32),
            value: Vec::with_capacity(128),
            pending_ws: Vec::new(),
            header_kind: HeaderKind::General,
            header_pending: false,
            value_emitted: false,
            header_count: 0,
            span_len: 0,
            cl_acc: None,
            status: 0,
            major: 0,
            in_trailers: false,
            remaining: 0,
        }
    }

    /// Return to the initial state, clearing the error record and all
    /// per-message data. Configuration is kept.
    pub fn reset(&mut self) {
        self.state = State::Start;
        self.error = None;
        self.paused = false;
        self.clear_message();
    }

    fn clear_message(&mut self) {
        self.head = Head::new(self.kind);
        self.facts = HeaderFacts::default();
        self.framing = None;
        self.method.clear();
        self.url.clear();
        self.reason.clear();
        self.field.clear();
        self.value.clear();
        self.pending_ws.clear();
        self.header_kind = HeaderKind::General;
        self.header_pending = false;
        self.value_emitted = false;
        self.header_count = 0;
        self.span_len = 0;
        self.cl_acc = None;
        self.status = 0;
        self.major = 0;
        self.in_trailers = false;
        self.remaining = 0;
    }

    /// Stop before consuming anything further; [`execute`](Self::execute)
    /// reports `Paused { offset: 0 }` until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Clear a pause; the next [`execute`](Self::execute) continues where
    /// the paused one stopped.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Leave the upgraded state and expect a new HTTP message.
    pub fn resume_after_upgrade(&mut self) {
        if self.state == State::Upgraded {
            self.state = State::Start;
        }
        self.paused = false;
    }

    /// Feed a slice of bytes into the parser, dispatching events to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] on any protocol violation or handler abort.
    /// The session then stays failed, and every later call returns the same
    /// error, until [`reset`](Self::reset).
    pub fn execute<H: Handler + ?Sized>(
        &mut self,
        handler: &mut H,
        data: &[u8],
    ) -> Result<Outcome, ParseError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.paused {
            return Ok(Outcome::Paused { offset: 0 });
        }

        self.mark = None;
        self.ws_from = None;
        self.token_start = None;

        match self.run(handler, data) {
            Ok(outcome) => {
                match outcome {
                    Outcome::Paused { .. } => self.paused = true,
                    Outcome::Upgrade { offset } => {
                        debug!(offset, "connection upgraded");
                    }
                    Outcome::Ok => {}
                }
                Ok(outcome)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Signal end of input (e.g. the peer closed the connection).
    ///
    /// Completes a body delimited by connection close. Ending anywhere else
    /// inside a message is `INVALID_EOF_STATE`.
    ///
    /// # Errors
    ///
    /// Returns the stored error if the parser already failed.
    pub fn finish<H: Handler + ?Sized>(&mut self, handler: &mut H) -> Result<(), ParseError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        // A pause may have stopped right before headers-complete or
        // message-complete; those need no further input.
        self.mark = None;
        self.ws_from = None;
        self.token_start = None;
        while matches!(self.state, State::HeadersDone | State::MessageDone) {
            if let Err(error) = self.run(handler, &[]) {
                return Err(self.fail(error));
            }
        }
        match self.state {
            State::Start | State::Closed | State::Upgraded => {
                self.state = State::Closed;
                Ok(())
            }
            State::BodyUntilClose => {
                self.state = State::Closed;
                trace!("message complete at end of input");
                // A pause has nothing left to suspend here.
                dispatch(handler, Event::MessageComplete, 0)
                    .map(|_| ())
                    .map_err(|e| self.fail(e))
            }
            _ => Err(self.fail(err(ErrorCode::InvalidEofState, "Invalid EOF state", 0))),
        }
    }

    fn fail(&mut self, error: ParseError) -> ParseError {
        debug!(
            code = %error.code(),
            offset = error.offset(),
            reason = error.reason(),
            "parse error"
        );
        self.state = State::Error;
        self.error = Some(error.clone());
        error
    }

    // ----- public query ---------------------------------------------------

    pub fn message_type(&self) -> MessageType {
        self.kind
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Version of the current (or last) message.
    pub fn version(&self) -> HttpVersion {
        self.head.version
    }

    pub fn method(&self) -> Option<Method> {
        self.head.method
    }

    pub fn status_code(&self) -> Option<u16> {
        self.head.status_code
    }

    /// Whether the connection may carry another message after this one.
    pub fn should_keep_alive(&self) -> bool {
        self.head.keep_alive
    }

    pub fn is_upgrade(&self) -> bool {
        self.head.upgrade
    }

    /// Declared `Content-Length` of the current message, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.facts.content_length
    }

    /// Body framing of the current message; `None` before headers-complete.
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    /// Bytes still owed by the current fixed-length body or chunk.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// The last fault, if the parser is in the error state.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ----- state machine --------------------------------------------------

    fn run<H: Handler + ?Sized>(
        &mut self,
        h: &mut H,
        data: &[u8],
    ) -> Result<Outcome, ParseError> {
        let mut i = 0;

        loop {
            // ----- Transitions that consume nothing -----
            match self.state {
                State::HeadersDone => {
                    if let Some(outcome) = self.headers_done(h, i)? {
                        return Ok(outcome);
                    }
                    continue;
                }
                State::MessageDone => {
                    let next = if self.head.upgrade {
                        State::Upgraded
                    } else if self.head.keep_alive {
                        State::Start
                    } else {
                        State::Closed
                    };
                    self.state = next;
                    trace!("message complete");
                    let control = dispatch(h, Event::MessageComplete, i)?;
                    if next == State::Upgraded {
                        return Ok(Outcome::Upgrade { offset: i });
                    }
                    if control == Control::Pause {
                        return Ok(paused(i));
                    }
                    continue;
                }
                State::Upgraded => return Ok(Outcome::Upgrade { offset: i }),
                _ => {}
            }

            if i >= data.len() {
                break;
            }

            // ----- Bulk paths for body states -----
            match self.state {
                State::Body | State::ChunkData => {
                    let available = (data.len() - i) as u64;
                    let n = available.min(self.remaining) as usize;
                    let fragment = &data[i..i + n];
                    self.remaining -= n as u64;
                    i += n;
                    if self.remaining == 0 {
                        self.state = match self.state {
                            State::Body => State::MessageDone,
                            _ => State::ChunkDataCr,
                        };
                    }
                    emit!(h, Event::Body(fragment), i - n, i);
                    continue;
                }
                State::BodyUntilClose => {
                    let fragment = &data[i..];
                    let at = i;
                    i = data.len();
                    emit!(h, Event::Body(fragment), at, i);
                    continue;
                }
                _ => {}
            }

            // ----- Byte-by-byte path -----
            let byte = data[i];

            match self.state {
                // ===================== START =====================
                State::Start => {
                    if byte == b'\r' || byte == b'\n' {
                        i += 1;
                        continue;
                    }
                    self.clear_message();
                    self.state = match self.kind {
                        MessageType::Request => {
                            self.token_start = Some(i);
                            State::ReqMethod
                        }
                        MessageType::Response => State::VersionConst(0),
                    };
                    trace!(kind = ?self.kind, "message begin");
                    // The byte is re-read in the new state.
                    emit!(h, Event::MessageBegin, i, i);
                    continue;
                }

                State::Closed => {
                    if byte != b'\r' && byte != b'\n' {
                        return Err(err(
                            ErrorCode::ClosedConnection,
                            "Data after `Connection: close`",
                            i,
                        ));
                    }
                }

                // ===================== REQUEST LINE =====================
                State::ReqMethod => {
                    let at = self.token_start.unwrap_or(0);
                    if byte == b' ' {
                        match self.method.method() {
                            Some(method) => {
                                self.head.method = Some(method);
                                self.state = State::ReqUrlStart;
                            }
                            None => {
                                return Err(err(
                                    ErrorCode::InvalidMethod,
                                    "Invalid method encountered",
                                    at,
                                ));
                            }
                        }
                    } else if !self.method.push(byte) {
                        return Err(err(
                            ErrorCode::InvalidMethod,
                            "Invalid method encountered",
                            at,
                        ));
                    }
                }

                State::ReqUrlStart => {
                    if is_url_byte(byte) {
                        self.span_len = 0;
                        self.state = State::ReqUrl;
                        continue;
                    }
                    return Err(err(
                        ErrorCode::InvalidUrl,
                        "Unexpected start char in url",
                        i,
                    ));
                }

                State::ReqUrl => {
                    if is_url_byte(byte) {
                        self.mark.get_or_insert(i);
                        self.span_len += 1;
                        if self.span_len > self.config.max_url_len {
                            return Err(err(
                                ErrorCode::HeaderOverflow,
                                "Request target too long",
                                i,
                            ));
                        }
                    } else if byte == b' ' || byte == b'\r' {
                        let fragment = self.close_span(data, i);
                        self.url.extend_from_slice(fragment);
                        self.state = if byte == b' ' {
                            State::VersionConst(0)
                        } else if self.config.allow_http09 {
                            State::ReqHttp09Lf
                        } else {
                            return Err(err(
                                ErrorCode::InvalidVersion,
                                "Missing HTTP version",
                                i,
                            ));
                        };
                        if !fragment.is_empty() {
                            emit!(h, Event::Url(fragment), i, i + 1);
                        }
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    } else {
                        return Err(err(
                            ErrorCode::InvalidUrl,
                            "Invalid characters in url",
                            i,
                        ));
                    }
                }

                State::ReqHttp09Lf => {
                    if byte != b'\n' {
                        return Err(err(ErrorCode::LfExpected, "Expected LF after CR", i));
                    }
                    self.head.version = HttpVersion::HTTP_09;
                    self.state = State::HeadersDone;
                }

                State::ReqLineCr => match byte {
                    b'\r' => self.state = State::StartLineLf,
                    b'\n' => {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    }
                    _ => {
                        return Err(err(
                            ErrorCode::InvalidVersion,
                            "Expected CRLF after version",
                            i,
                        ));
                    }
                },

                // ===================== VERSION =====================
                State::VersionConst(n) => {
                    if byte != HTTP_CONSTANT[n as usize] {
                        return Err(err(ErrorCode::InvalidConstant, "Expected HTTP/", i));
                    }
                    self.state = if n as usize + 1 == HTTP_CONSTANT.len() {
                        State::VersionMajor
                    } else {
                        State::VersionConst(n + 1)
                    };
                }

                State::VersionMajor => {
                    if byte != b'1' {
                        return Err(err(ErrorCode::InvalidVersion, "Invalid HTTP version", i));
                    }
                    self.major = 1;
                    self.state = State::VersionDot;
                }

                State::VersionDot => {
                    if byte != b'.' {
                        return Err(err(ErrorCode::InvalidVersion, "Invalid HTTP version", i));
                    }
                    self.state = State::VersionMinor;
                }

                State::VersionMinor => {
                    let version = match byte {
                        b'0'..=b'9' => HttpVersion::new(self.major, byte - b'0'),
                        _ => {
                            return Err(err(
                                ErrorCode::InvalidVersion,
                                "Invalid HTTP version",
                                i,
                            ));
                        }
                    };
                    if !version.is_supported() {
                        return Err(err(ErrorCode::InvalidVersion, "Invalid HTTP version", i));
                    }
                    self.head.version = version;
                    self.state = match self.kind {
                        MessageType::Request => State::ReqLineCr,
                        MessageType::Response => State::ResStatusSpace,
                    };
                }

                // ===================== STATUS LINE =====================
                State::ResStatusSpace => {
                    if byte != b' ' {
                        return Err(err(
                            ErrorCode::InvalidVersion,
                            "Expected space after version",
                            i,
                        ));
                    }
                    self.state = State::ResStatusCode(0);
                }

                State::ResStatusCode(n) => {
                    if !byte.is_ascii_digit() {
                        return Err(err(ErrorCode::InvalidStatus, "Invalid status code", i));
                    }
                    self.status = self.status * 10 + u16::from(byte - b'0');
                    self.state = if n == 2 {
                        self.head.status_code = Some(self.status);
                        State::ResStatusEnd
                    } else {
                        State::ResStatusCode(n + 1)
                    };
                }

                State::ResStatusEnd => match byte {
                    b' ' => {
                        self.span_len = 0;
                        self.state = State::ResReason;
                    }
                    b'\r' => self.state = State::StartLineLf,
                    b'\n' => {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    }
                    _ => {
                        return Err(err(ErrorCode::InvalidStatus, "Invalid status code", i));
                    }
                },

                State::ResReason => {
                    if byte == b'\r' {
                        let fragment = self.close_span(data, i);
                        self.reason.extend_from_slice(fragment);
                        self.state = State::StartLineLf;
                        if !fragment.is_empty() {
                            emit!(h, Event::Status(fragment), i, i + 1);
                        }
                    } else if is_reason_byte(byte) {
                        self.mark.get_or_insert(i);
                        self.span_len += 1;
                        if self.span_len > self.config.max_header_value_len {
                            return Err(err(ErrorCode::HeaderOverflow, "Header overflow", i));
                        }
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    } else {
                        return Err(err(
                            ErrorCode::InvalidStatus,
                            "Invalid response status",
                            i,
                        ));
                    }
                }

                State::StartLineLf => {
                    if byte != b'\n' {
                        return Err(err(ErrorCode::LfExpected, "Expected LF after CR", i));
                    }
                    self.state = State::HeaderLineStart;
                }

                // ===================== HEADERS =====================
                State::HeaderLineStart => {
                    if is_ows(byte) && self.header_pending {
                        // obs-fold: the value continues on this line.
                        self.state = State::HeaderFoldOws;
                    } else if byte == b'\r' {
                        self.finish_header(i)?;
                        self.state = State::HeadersAlmostDone;
                    } else if is_tchar(byte) {
                        self.finish_header(i)?;
                        if self.header_count >= self.config.max_headers_count {
                            return Err(err(ErrorCode::HeaderOverflow, "Too many headers", i));
                        }
                        self.span_len = 0;
                        self.state = State::HeaderField;
                        continue;
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    } else {
                        return Err(err(
                            ErrorCode::InvalidHeaderToken,
                            "Invalid header token",
                            i,
                        ));
                    }
                }

                State::HeaderField => {
                    if is_tchar(byte) {
                        self.mark.get_or_insert(i);
                        self.span_len += 1;
                        if self.span_len > self.config.max_header_name_len {
                            return Err(err(ErrorCode::HeaderOverflow, "Header overflow", i));
                        }
                    } else if byte == b':' {
                        let fragment = self.close_span(data, i);
                        self.field.extend_from_slice(fragment);
                        if self.field.is_empty() {
                            return Err(err(
                                ErrorCode::InvalidHeaderToken,
                                "Invalid header token",
                                i,
                            ));
                        }
                        self.header_kind = if self.in_trailers {
                            HeaderKind::General
                        } else {
                            HeaderKind::classify(&self.field)
                        };
                        self.value.clear();
                        self.pending_ws.clear();
                        self.value_emitted = false;
                        self.cl_acc = None;
                        self.header_pending = true;
                        self.span_len = 0;
                        self.state = State::HeaderValueStart;
                        if !fragment.is_empty() {
                            emit!(h, Event::HeaderField(fragment), i, i + 1);
                        }
                    } else {
                        return Err(err(
                            ErrorCode::InvalidHeaderToken,
                            "Invalid header token",
                            i,
                        ));
                    }
                }

                State::HeaderValueStart => {
                    if is_ows(byte) {
                        // Leading OWS is not part of the value.
                    } else if byte == b'\r' {
                        if self.header_kind == HeaderKind::ContentLength
                            && self.cl_acc.is_none()
                        {
                            return Err(err(
                                ErrorCode::InvalidContentLength,
                                "Invalid character in Content-Length",
                                i,
                            ));
                        }
                        self.state = State::HeaderValueLf;
                        if !self.value_emitted {
                            self.value_emitted = true;
                            emit!(h, Event::HeaderValue(&[]), i, i + 1);
                        }
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    } else if is_field_content_byte(byte) {
                        self.state = State::HeaderValue;
                        continue;
                    } else {
                        return Err(err(
                            ErrorCode::InvalidHeaderToken,
                            "Invalid header value char",
                            i,
                        ));
                    }
                }

                State::HeaderValue => {
                    let mark = *self.mark.get_or_insert(i);
                    if byte == b'\r' {
                        let end = self.ws_from.take().unwrap_or(i);
                        self.mark = None;
                        let fragment = &data[mark..end];
                        self.pending_ws.clear();
                        self.value.extend_from_slice(fragment);
                        self.state = State::HeaderValueLf;
                        if !fragment.is_empty() || !self.value_emitted {
                            self.value_emitted = true;
                            emit!(h, Event::HeaderValue(fragment), i, i + 1);
                        }
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    } else if is_field_content_byte(byte) {
                        if is_ows(byte) {
                            self.ws_from.get_or_insert(i);
                        } else {
                            let after_ws = self.ws_from.is_some() || !self.pending_ws.is_empty();
                            if self.header_kind == HeaderKind::ContentLength {
                                self.push_content_length(byte, after_ws, i)?;
                            }
                            self.ws_from = None;
                            if !self.pending_ws.is_empty() {
                                // Whitespace held back from an earlier call is
                                // interior after all: deliver it together with
                                // this call's whitespace before `byte`.
                                self.pending_ws.extend_from_slice(&data[mark..i]);
                                self.mark = Some(i);
                                self.value.extend_from_slice(&self.pending_ws);
                                self.value_emitted = true;
                                let control =
                                    dispatch(h, Event::HeaderValue(&self.pending_ws), i)?;
                                self.pending_ws.clear();
                                if control == Control::Pause {
                                    // `byte` is counted when it is fed again.
                                    return Ok(paused(i));
                                }
                            }
                        }
                        self.span_len += 1;
                        if self.span_len > self.config.max_header_value_len {
                            return Err(err(ErrorCode::HeaderOverflow, "Header overflow", i));
                        }
                    } else {
                        return Err(err(
                            ErrorCode::InvalidHeaderToken,
                            "Invalid header value char",
                            i,
                        ));
                    }
                }

                State::HeaderValueLf => {
                    if byte != b'\n' {
                        return Err(err(ErrorCode::LfExpected, "Expected LF after CR", i));
                    }
                    self.state = State::HeaderLineStart;
                }

                State::HeaderFoldOws => {
                    if is_ows(byte) {
                        // Skip the fold's whitespace.
                    } else if byte == b'\r' {
                        self.state = State::HeaderValueLf;
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    } else if is_field_content_byte(byte) {
                        if self.value.is_empty() {
                            self.state = State::HeaderValueStart;
                        } else {
                            // The fold reads as a single SP.
                            self.pending_ws.clear();
                            self.pending_ws.push(b' ');
                            self.state = State::HeaderValue;
                        }
                        continue;
                    } else {
                        return Err(err(
                            ErrorCode::InvalidHeaderToken,
                            "Invalid header value char",
                            i,
                        ));
                    }
                }

                State::HeadersAlmostDone => {
                    if byte != b'\n' {
                        return Err(err(ErrorCode::LfExpected, "Expected LF after CR", i));
                    }
                    if self.in_trailers {
                        self.state = State::MessageDone;
                        emit!(h, Event::ChunkComplete, i, i + 1);
                    } else {
                        self.state = State::HeadersDone;
                    }
                }

                // ===================== CHUNKED ENCODING =====================
                State::ChunkSizeStart => match hex_value(byte) {
                    Some(digit) => {
                        self.remaining = u64::from(digit);
                        self.state = State::ChunkSize;
                    }
                    None => {
                        return Err(err(
                            ErrorCode::InvalidChunkSize,
                            "Invalid character in chunk size",
                            i,
                        ));
                    }
                },

                State::ChunkSize => {
                    if let Some(digit) = hex_value(byte) {
                        self.remaining = framing::push_hex(self.remaining, digit).ok_or_else(
                            || err(ErrorCode::InvalidChunkSize, "Chunk size overflow", i),
                        )?;
                    } else if byte == b';' {
                        self.state = State::ChunkExt;
                    } else if byte == b'\r' {
                        self.state = State::ChunkSizeLf;
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    } else {
                        return Err(err(
                            ErrorCode::InvalidChunkSize,
                            "Invalid character in chunk size",
                            i,
                        ));
                    }
                }

                State::ChunkExt => {
                    // RFC 9112 §7.1.1: chunk extensions are ignored.
                    if byte == b'\r' {
                        self.state = State::ChunkSizeLf;
                    } else if byte == b'\n' {
                        return Err(err(ErrorCode::CrExpected, "Expected CR before LF", i));
                    }
                }

                State::ChunkSizeLf => {
                    if byte != b'\n' {
                        return Err(err(ErrorCode::LfExpected, "Expected LF after CR", i));
                    }
                    let size = self.remaining;
                    if size == 0 {
                        self.in_trailers = true;
                        self.header_pending = false;
                        self.state = State::HeaderLineStart;
                    } else {
                        self.state = State::ChunkData;
                    }
                    emit!(h, Event::ChunkHeader(size), i, i + 1);
                }

                State::ChunkDataCr => {
                    if byte != b'\r' {
                        return Err(err(
                            ErrorCode::CrExpected,
                            "Expected CRLF after chunk data",
                            i,
                        ));
                    }
                    self.state = State::ChunkDataLf;
                }

                State::ChunkDataLf => {
                    if byte != b'\n' {
                        return Err(err(ErrorCode::LfExpected, "Expected LF after CR", i));
                    }
                    self.state = State::ChunkSizeStart;
                    emit!(h, Event::ChunkComplete, i, i + 1);
                }

                // Handled by the bulk paths or the epsilon transitions above.
                State::HeadersDone
                | State::MessageDone
                | State::Upgraded
                | State::Body
                | State::BodyUntilClose
                | State::ChunkData => {
                    unreachable!("handled before the byte-by-byte path");
                }

                State::Error => {
                    return Err(err(ErrorCode::Internal, "Parser is in the error state", i));
                }
            }

            i += 1;
        }

        self.flush_span(h, data)
    }

    /// Deliver the part of an open span that lies in this buffer.
    fn flush_span<H: Handler + ?Sized>(
        &mut self,
        h: &mut H,
        data: &[u8],
    ) -> Result<Outcome, ParseError> {
        let len = data.len();
        let Some(mark) = self.mark.take() else {
            return Ok(Outcome::Ok);
        };

        let event = match self.state {
            State::ReqUrl => {
                self.url.extend_from_slice(&data[mark..]);
                Event::Url(&data[mark..])
            }
            State::ResReason => {
                self.reason.extend_from_slice(&data[mark..]);
                Event::Status(&data[mark..])
            }
            State::HeaderField => {
                self.field.extend_from_slice(&data[mark..]);
                Event::HeaderField(&data[mark..])
            }
            State::HeaderValue => {
                // Trailing whitespace may turn out to end the value; hold it back.
                let end = self.ws_from.take().unwrap_or(len);
                self.pending_ws.extend_from_slice(&data[end..]);
                if end == mark {
                    return Ok(Outcome::Ok);
                }
                self.value.extend_from_slice(&data[mark..end]);
                self.value_emitted = true;
                Event::HeaderValue(&data[mark..end])
            }
            _ => return Ok(Outcome::Ok),
        };

        emit!(h, event, len, len);
        Ok(Outcome::Ok)
    }

    fn close_span<'d>(&mut self, data: &'d [u8], end: usize) -> &'d [u8] {
        match self.mark.take() {
            Some(start) => &data[start..end],
            None => &[],
        }
    }

    fn push_content_length(&mut self, byte: u8, after_ws: bool, at: usize) -> Result<(), ParseError> {
        if !byte.is_ascii_digit() || after_ws {
            return Err(err(
                ErrorCode::InvalidContentLength,
                "Invalid character in Content-Length",
                at,
            ));
        }
        let acc = self.cl_acc.unwrap_or(0);
        let next = framing::push_decimal(acc, byte)
            .ok_or_else(|| err(ErrorCode::InvalidContentLength, "Content-Length overflow", at))?;
        self.cl_acc = Some(next);
        Ok(())
    }

    /// Store the header whose value just ended and fold it into the framing facts.
    fn finish_header(&mut self, at: usize) -> Result<(), ParseError> {
        if !self.header_pending {
            return Ok(());
        }
        self.header_pending = false;
        self.header_count += 1;

        if !self.in_trailers {
            match self.header_kind {
                HeaderKind::ContentLength => {
                    let length = self.cl_acc.unwrap_or(0);
                    self.facts
                        .add_content_length(length)
                        .map_err(|e| err(e.code, e.reason, at))?;
                }
                HeaderKind::TransferEncoding => self.facts.add_transfer_encoding(&self.value),
                HeaderKind::Connection => self.facts.add_connection(&self.value),
                HeaderKind::Upgrade => self.facts.upgrade_header = true,
                HeaderKind::General => {}
            }
            self.head.headers.push(Header {
                name: String::from_utf8_lossy(&self.field).into_owned(),
                value: String::from_utf8_lossy(&self.value).into_owned(),
            });
        }

        self.field.clear();
        self.value.clear();
        Ok(())
    }

    /// Resolve framing and dispatch `HeadersComplete` at offset `at`.
    ///
    /// Returns `Some` when parsing must stop here.
    fn headers_done<H: Handler + ?Sized>(
        &mut self,
        h: &mut H,
        at: usize,
    ) -> Result<Option<Outcome>, ParseError> {
        let start = StartLine {
            kind: self.kind,
            version: self.head.version,
            method: self.head.method,
            status_code: self.head.status_code,
        };
        let framing = framing::resolve(&start, &self.facts, false)
            .map_err(|e| err(e.code, e.reason, at))?;

        self.head.url = String::from_utf8_lossy(&self.url).into_owned();
        if self.kind == MessageType::Response {
            self.head.status_message = Some(String::from_utf8_lossy(&self.reason).into_owned());
        }
        self.head.upgrade = start.is_upgrade(&self.facts);
        self.head.keep_alive = framing::keep_alive(self.head.version, &self.facts, framing);
        self.head.content_length = self.facts.content_length;
        self.head.chunked = framing == Framing::Chunked;

        let control = dispatch(h, Event::HeadersComplete(&self.head), at)?;

        let framing = if control == Control::SkipBody {
            self.head.keep_alive = framing::keep_alive(self.head.version, &self.facts, Framing::None);
            Framing::None
        } else {
            framing
        };
        trace!(?framing, "headers complete");

        self.framing = Some(framing);
        self.state = match framing {
            Framing::None => State::MessageDone,
            Framing::Length(n) => {
                self.remaining = n;
                State::Body
            }
            Framing::Chunked => State::ChunkSizeStart,
            Framing::UntilClose => State::BodyUntilClose,
        };

        if control == Control::Pause {
            return Ok(Some(paused(at)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Collector;

    fn request_parser() -> Parser {
        Parser::new(MessageType::Request, ParserConfig::default())
    }

    #[test]
    fn header_value_trailing_ws_split_across_calls() {
        let mut p = request_parser();
        let mut c = Collector::new(MessageType::Request).with_events();
        assert_eq!(p.execute(&mut c, b"GET / HTTP/1.1\r\nX-A: a  "), Ok(Outcome::Ok));
        assert_eq!(p.execute(&mut c, b" b \t"), Ok(Outcome::Ok));
        assert_eq!(p.execute(&mut c, b"\r\n\r\n"), Ok(Outcome::Ok));
        assert_eq!(c.messages()[0].header_value("X-A"), Some("a   b"));
    }

    #[test]
    fn obs_fold_reads_as_single_space() {
        let mut p = request_parser();
        let mut c = Collector::new(MessageType::Request);
        let raw = b"GET / HTTP/1.1\r\nX-Long: first\r\n   second\r\nHost: h\r\n\r\n";
        assert_eq!(p.execute(&mut c, raw), Ok(Outcome::Ok));
        let msg = &c.messages()[0];
        assert_eq!(msg.header_value("X-Long"), Some("first second"));
        assert_eq!(msg.header_value("Host"), Some("h"));
    }

    #[test]
    fn method_split_across_calls_reports_offset_zero() {
        let mut p = request_parser();
        let mut c = Collector::new(MessageType::Request);
        assert_eq!(p.execute(&mut c, b"PO"), Ok(Outcome::Ok));
        let e = p.execute(&mut c, b"ZT / HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(e.code(), ErrorCode::InvalidMethod);
        assert_eq!(e.offset(), 0);
    }

    #[test]
    fn error_is_sticky_until_reset() {
        let mut p = request_parser();
        let mut c = Collector::new(MessageType::Request);
        let e = p.execute(&mut c, b"GET / HTTP/1.1\r\nBad Header\r\n").unwrap_err();
        assert_eq!(p.execute(&mut c, b"GET / HTTP/1.1\r\n\r\n"), Err(e.clone()));
        assert_eq!(p.error(), Some(&e));
        p.reset();
        assert!(p.error().is_none());
        assert_eq!(p.execute(&mut c, b"GET / HTTP/1.1\r\n\r\n"), Ok(Outcome::Ok));
    }

    #[test]
    fn framing_is_fixed_after_headers() {
        let mut p = request_parser();
        let mut c = Collector::new(MessageType::Request);
        assert_eq!(p.framing(), None);
        p.execute(&mut c, b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nab")
            .unwrap();
        assert_eq!(p.framing(), Some(Framing::Length(4)));
        assert_eq!(p.remaining(), 2);
    }
}
