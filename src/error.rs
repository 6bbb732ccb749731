use std::fmt;

/// Wire-level error taxonomy (spec §4.4 / §7).
///
/// `MotorFault` and `Internal` are reserved for forward compatibility: no
/// current code path emits them, but clients are expected to tolerate them.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorCode {
    UnknownCmd,
    UnknownPv,
    InvalidValue,
    MotorFault,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::UnknownCmd => "UNKNOWN_CMD",
            ErrorCode::UnknownPv => "UNKNOWN_PV",
            ErrorCode::InvalidValue => "INVALID_VALUE",
            ErrorCode::MotorFault => "MOTOR_FAULT",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Failure to parse a request line into a [`crate::protocol::Command`].
#[derive(thiserror::Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("malformed request line")]
pub struct ParseError;

impl ParseError {
    #[inline]
    pub fn code(self) -> ErrorCode {
        ErrorCode::UnknownCmd
    }
}

/// Failure while executing an already-parsed command against the registry.
#[derive(thiserror::Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum DispatchError {
    #[error("no such process variable or motor")]
    UnknownPv,
    #[error("value rejected: out of range, non-writable, or beyond motor limits")]
    InvalidValue,
}

impl DispatchError {
    #[inline]
    pub fn code(self) -> ErrorCode {
        match self {
            DispatchError::UnknownPv => ErrorCode::UnknownPv,
            DispatchError::InvalidValue => ErrorCode::InvalidValue,
        }
    }
}
