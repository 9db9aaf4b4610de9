use std::fmt;

use thiserror::Error;

use crate::event::EventKind;

/// Stable numeric status codes reported by the parser.
///
/// `Ok`, `Paused` and `PausedUpgrade` are statuses rather than faults; every
/// other code identifies a class of [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Ok = 0,
    Internal = 1,
    /// Reserved; no parse path reports it.
    Strict = 2,
    LfExpected = 3,
    UnexpectedContentLength = 4,
    ClosedConnection = 5,
    InvalidMethod = 6,
    InvalidUrl = 7,
    InvalidConstant = 8,
    InvalidVersion = 9,
    InvalidHeaderToken = 10,
    InvalidContentLength = 11,
    InvalidChunkSize = 12,
    InvalidStatus = 13,
    InvalidEofState = 14,
    InvalidTransferEncoding = 15,
    CbMessageBegin = 16,
    CbHeadersComplete = 17,
    CbMessageComplete = 18,
    CbChunkHeader = 19,
    CbChunkComplete = 20,
    Paused = 21,
    PausedUpgrade = 22,
    User = 24,
    CrExpected = 25,
    HeaderOverflow = 31,
}

const ALL_CODES: [ErrorCode; 26] = [
    ErrorCode::Ok,
    ErrorCode::Internal,
    ErrorCode::Strict,
    ErrorCode::LfExpected,
    ErrorCode::UnexpectedContentLength,
    ErrorCode::ClosedConnection,
    ErrorCode::InvalidMethod,
    ErrorCode::InvalidUrl,
    ErrorCode::InvalidConstant,
    ErrorCode::InvalidVersion,
    ErrorCode::InvalidHeaderToken,
    ErrorCode::InvalidContentLength,
    ErrorCode::InvalidChunkSize,
    ErrorCode::InvalidStatus,
    ErrorCode::InvalidEofState,
    ErrorCode::InvalidTransferEncoding,
    ErrorCode::CbMessageBegin,
    ErrorCode::CbHeadersComplete,
    ErrorCode::CbMessageComplete,
    ErrorCode::CbChunkHeader,
    ErrorCode::CbChunkComplete,
    ErrorCode::Paused,
    ErrorCode::PausedUpgrade,
    ErrorCode::User,
    ErrorCode::CrExpected,
    ErrorCode::HeaderOverflow,
];

impl ErrorCode {
    /// The numeric value of this code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look a code up by its numeric value.
    pub fn from_code(code: u8) -> Option<Self> {
        ALL_CODES.iter().copied().find(|c| c.code() == code)
    }

    /// Symbolic, locale-independent name of the code.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Internal => "INTERNAL",
            Self::Strict => "STRICT",
            Self::LfExpected => "LF_EXPECTED",
            Self::UnexpectedContentLength => "UNEXPECTED_CONTENT_LENGTH",
            Self::ClosedConnection => "CLOSED_CONNECTION",
            Self::InvalidMethod => "INVALID_METHOD",
            Self::InvalidUrl => "INVALID_URL",
            Self::InvalidConstant => "INVALID_CONSTANT",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::InvalidHeaderToken => "INVALID_HEADER_TOKEN",
            Self::InvalidContentLength => "INVALID_CONTENT_LENGTH",
            Self::InvalidChunkSize => "INVALID_CHUNK_SIZE",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidEofState => "INVALID_EOF_STATE",
            Self::InvalidTransferEncoding => "INVALID_TRANSFER_ENCODING",
            Self::CbMessageBegin => "CB_MESSAGE_BEGIN",
            Self::CbHeadersComplete => "CB_HEADERS_COMPLETE",
            Self::CbMessageComplete => "CB_MESSAGE_COMPLETE",
            Self::CbChunkHeader => "CB_CHUNK_HEADER",
            Self::CbChunkComplete => "CB_CHUNK_COMPLETE",
            Self::Paused => "PAUSED",
            Self::PausedUpgrade => "PAUSED_UPGRADE",
            Self::User => "USER",
            Self::CrExpected => "CR_EXPECTED",
            Self::HeaderOverflow => "HEADER_OVERFLOW",
        }
    }

    /// `true` for the codes that stop parsing without being a fault.
    pub fn is_pause(self) -> bool {
        matches!(self, Self::Paused | Self::PausedUpgrade)
    }

    /// The code reported when a handler aborts while handling `kind`.
    pub(crate) fn for_abort(kind: EventKind) -> Self {
        match kind {
            EventKind::MessageBegin => Self::CbMessageBegin,
            EventKind::HeadersComplete => Self::CbHeadersComplete,
            EventKind::MessageComplete => Self::CbMessageComplete,
            EventKind::ChunkHeader => Self::CbChunkHeader,
            EventKind::ChunkComplete => Self::CbChunkComplete,
            EventKind::Url
            | EventKind::Status
            | EventKind::HeaderField
            | EventKind::HeaderValue
            | EventKind::Body => Self::User,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parse fault: what went wrong and where.
///
/// `offset` is relative to the start of the buffer handed to the `execute`
/// call that failed, not to the start of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} ({code} at offset {offset})")]
pub struct ParseError {
    code: ErrorCode,
    reason: &'static str,
    offset: usize,
}

impl ParseError {
    pub(crate) fn new(code: ErrorCode, reason: &'static str, offset: usize) -> Self {
        Self {
            code,
            reason,
            offset,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.code.name()
    }

    /// Human readable explanation. Wording is not stable; match on
    /// [`ParseError::code`] instead.
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Errors raised by [`SessionPool`](crate::SessionPool) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The handle refers to a destroyed session or was never issued by this pool.
    #[error("stale or unknown session handle")]
    StaleHandle,
    /// No more sessions can be allocated.
    #[error("session pool exhausted ({0} sessions)")]
    Exhausted(usize),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_numbers() {
        for code in ALL_CODES {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ErrorCode::from_code(23), None);
        assert_eq!(ErrorCode::from_code(200), None);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = ALL_CODES.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_CODES.len());
    }

    #[test]
    fn display_includes_reason_and_offset() {
        let err = ParseError::new(ErrorCode::InvalidMethod, "Invalid method encountered", 4);
        assert_eq!(
            err.to_string(),
            "Invalid method encountered (INVALID_METHOD at offset 4)"
        );
    }

    #[test]
    fn only_pause_codes_are_pauses() {
        assert!(ErrorCode::Paused.is_pause());
        assert!(ErrorCode::PausedUpgrade.is_pause());
        assert!(!ErrorCode::User.is_pause());
        assert!(!ErrorCode::Ok.is_pause());
    }
}
