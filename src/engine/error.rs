use crate::model::{BookingId, Minute, Span};
use crate::protocol::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(BookingId),
    Conflict(BookingId),
    OutsideWeek { start: Minute, end: Minute },
    EmptySpan(Span),
    EmptyName(&'static str),
    LimitExceeded(&'static str),
    Internal(String),
}

impl EngineError {
    /// Wire error kind reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) | EngineError::OutsideWeek { .. } => ErrorKind::Conflict,
            EngineError::EmptySpan(_)
            | EngineError::EmptyName(_)
            | EngineError::LimitExceeded(_) => ErrorKind::BadRequest,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::OutsideWeek { start, end } => {
                write!(f, "shifted booking [{start}, {end}) leaves the week")
            }
            EngineError::EmptySpan(span) => {
                write!(f, "booking must end after it starts: [{}, {})", span.start, span.end)
            }
            EngineError::EmptyName(what) => write!(f, "{what} name must not be empty"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
