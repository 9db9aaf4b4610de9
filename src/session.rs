//! Per-connection parsing sessions, the engine handle that creates them, and
//! a handle-based pool for callers that keep many sessions alive at once.

use tracing::{debug, trace};

use crate::error::{ParseError, PoolError};
use crate::event::Handler;
use crate::parser::{Outcome, Parser, ParserConfig};
use crate::types::{HttpVersion, Method, MessageType};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Shared parser configuration. Every session is created from an engine.
///
/// The engine holds no mutable state; any number of sessions may come from
/// one engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: ParserConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Create a session parsing messages of `kind` and dispatching to `handler`.
    pub fn session<H: Handler>(&self, kind: MessageType, handler: H) -> Session<H> {
        trace!(?kind, "session created");
        Session {
            parser: Parser::new(kind, self.config.clone()),
            handler,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connection's parsing state, bound to the handler that receives its events.
///
/// ```rust
/// use h1stream::{Collector, Engine, MessageType, Outcome};
///
/// let engine = Engine::new();
/// let mut session = engine.session(MessageType::Response, Collector::new(MessageType::Response));
///
/// assert_eq!(session.execute(b"HTTP/1.1 200 OK\r\nContent-Le"), Ok(Outcome::Ok));
/// assert_eq!(session.execute(b"ngth: 2\r\n\r\nhi"), Ok(Outcome::Ok));
///
/// let msg = &session.handler().messages()[0];
/// assert_eq!(msg.head.status_code, Some(200));
/// assert_eq!(msg.body_as_str(), Some("hi"));
/// ```
#[derive(Debug)]
pub struct Session<H: Handler> {
    parser: Parser,
    handler: H,
}

impl<H: Handler> Session<H> {
    /// Feed the next bytes of the stream.
    ///
    /// # Errors
    ///
    /// See [`Parser::execute`].
    pub fn execute(&mut self, data: &[u8]) -> Result<Outcome, ParseError> {
        self.parser.execute(&mut self.handler, data)
    }

    /// Signal end of input.
    ///
    /// # Errors
    ///
    /// See [`Parser::finish`].
    pub fn finish(&mut self) -> Result<(), ParseError> {
        self.parser.finish(&mut self.handler)
    }

    /// See [`Parser::pause`].
    pub fn pause(&mut self) {
        self.parser.pause();
    }

    /// See [`Parser::resume`].
    pub fn resume(&mut self) {
        self.parser.resume();
    }

    /// See [`Parser::resume_after_upgrade`].
    pub fn resume_after_upgrade(&mut self) {
        self.parser.resume_after_upgrade();
    }

    /// Back to the initial state, keeping the handler and the allocations.
    pub fn reset(&mut self) {
        self.parser.reset();
    }

    pub fn message_type(&self) -> MessageType {
        self.parser.message_type()
    }

    pub fn version(&self) -> HttpVersion {
        self.parser.version()
    }

    pub fn method(&self) -> Option<Method> {
        self.parser.method()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.parser.status_code()
    }

    pub fn should_keep_alive(&self) -> bool {
        self.parser.should_keep_alive()
    }

    pub fn is_upgrade(&self) -> bool {
        self.parser.is_upgrade()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.parser.content_length()
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.parser.error()
    }

    pub fn is_paused(&self) -> bool {
        self.parser.is_paused()
    }

    /// The underlying state machine, for read-only inspection.
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

// ---------------------------------------------------------------------------
// SessionPool
// ---------------------------------------------------------------------------

/// Opaque reference to a session inside a [`SessionPool`].
///
/// A handle stays valid until its session is destroyed. Slots are reused,
/// but a reused slot gets a new generation, so old handles are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot<H: Handler> {
    generation: u32,
    session: Option<Session<H>>,
}

/// Arena of sessions addressed by [`SessionHandle`].
///
/// ```rust
/// use h1stream::{Collector, Engine, MessageType, PoolError, SessionPool};
///
/// let mut pool = SessionPool::new(Engine::new());
/// let h = pool.allocate(MessageType::Request, Collector::new(MessageType::Request)).unwrap();
/// pool.execute(h, b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// pool.destroy(h).unwrap();
/// assert_eq!(pool.execute(h, b"GET"), Err(PoolError::StaleHandle));
/// ```
#[derive(Debug)]
pub struct SessionPool<H: Handler> {
    engine: Engine,
    slots: Vec<Slot<H>>,
    free: Vec<u32>,
    capacity: Option<usize>,
    live: usize,
}

impl<H: Handler> SessionPool<H> {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            slots: Vec::new(),
            free: Vec::new(),
            capacity: None,
            live: 0,
        }
    }

    /// Limit the number of live sessions.
    pub fn with_capacity_limit(mut self, limit: usize) -> Self {
        self.capacity = Some(limit);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Create a session and return its handle.
    ///
    /// # Errors
    ///
    /// [`PoolError::Exhausted`] when the capacity limit is reached.
    pub fn allocate(&mut self, kind: MessageType, handler: H) -> Result<SessionHandle, PoolError> {
        if let Some(limit) = self.capacity {
            if self.live >= limit {
                return Err(PoolError::Exhausted(limit));
            }
        }
        let session = self.engine.session(kind, handler);

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index =
                    u32::try_from(self.slots.len()).map_err(|_| PoolError::Exhausted(self.live))?;
                self.slots.push(Slot {
                    generation: 0,
                    session: None,
                });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.session = Some(session);
        self.live += 1;
        Ok(SessionHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Drop the session and return its handler. The handle becomes stale.
    ///
    /// # Errors
    ///
    /// [`PoolError::StaleHandle`] if the handle is not live.
    pub fn destroy(&mut self, handle: SessionHandle) -> Result<H, PoolError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(PoolError::StaleHandle)?;
        let session = slot.session.take().ok_or(PoolError::StaleHandle)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        debug!(index = handle.index, "session destroyed");
        Ok(session.into_handler())
    }

    pub fn get(&self, handle: SessionHandle) -> Result<&Session<H>, PoolError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_ref())
            .ok_or(PoolError::StaleHandle)
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Result<&mut Session<H>, PoolError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.session.as_mut())
            .ok_or(PoolError::StaleHandle)
    }

    pub fn execute(&mut self, handle: SessionHandle, data: &[u8]) -> Result<Outcome, PoolError> {
        Ok(self.get_mut(handle)?.execute(data)?)
    }

    pub fn finish(&mut self, handle: SessionHandle) -> Result<(), PoolError> {
        Ok(self.get_mut(handle)?.finish()?)
    }

    pub fn pause(&mut self, handle: SessionHandle) -> Result<(), PoolError> {
        self.get_mut(handle)?.pause();
        Ok(())
    }

    pub fn resume(&mut self, handle: SessionHandle) -> Result<(), PoolError> {
        self.get_mut(handle)?.resume();
        Ok(())
    }

    pub fn resume_after_upgrade(&mut self, handle: SessionHandle) -> Result<(), PoolError> {
        self.get_mut(handle)?.resume_after_upgrade();
        Ok(())
    }

    pub fn reset(&mut self, handle: SessionHandle) -> Result<(), PoolError> {
        self.get_mut(handle)?.reset();
        Ok(())
    }

    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
