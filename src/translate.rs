//! Maps the library's per-operation error codes onto the crate taxonomy.
//!
//! Every progress operation (handshake, read, write, shutdown) returns the
//! library's result; the accompanying [`ErrorCode`] says what kind of wait
//! or failure it was. The two would-block codes become [`Progress`] values
//! and never reach the caller as errors.

use std::io;

use openssl::error::ErrorStack;
use openssl::ssl::{self, ErrorCode};

use crate::error::Error;

/// Outcome of one library call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress<T> {
    /// The call completed.
    Ready(T),
    /// More inbound bytes are needed before retrying.
    WantRead,
    /// Outbound bytes must be flushed before retrying.
    WantWrite,
    /// The peer sent close_notify.
    PeerClosed,
}

/// Translate a library result.
pub(crate) fn translate<T>(result: Result<T, ssl::Error>) -> Result<Progress<T>, Error> {
    match result {
        Ok(v) => Ok(Progress::Ready(v)),
        Err(e) => classify(e.code(), e.io_error(), e.ssl_error()),
    }
}

/// Classify a failed call from its error code and attached causes.
pub(crate) fn classify<T>(
    code: ErrorCode,
    io_err: Option<&io::Error>,
    stack: Option<&ErrorStack>,
) -> Result<Progress<T>, Error> {
    match code {
        ErrorCode::WANT_READ => Ok(Progress::WantRead),
        ErrorCode::WANT_WRITE => Ok(Progress::WantWrite),
        ErrorCode::ZERO_RETURN => Ok(Progress::PeerClosed),
        ErrorCode::SYSCALL => match io_err {
            Some(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Progress::WantRead),
            Some(e) => Err(protocol(code, e.to_string())),
            None => match stack {
                Some(stack) if !stack.errors().is_empty() => Err(from_stack(code, stack)),
                _ => Err(protocol(code, "unexpected end of stream".to_string())),
            },
        },
        _ => match stack {
            Some(stack) => Err(from_stack(code, stack)),
            None => Err(protocol(code, "unspecified library failure".to_string())),
        },
    }
}

fn from_stack(code: ErrorCode, stack: &ErrorStack) -> Error {
    let detail = stack.to_string();
    let exhausted = stack
        .errors()
        .iter()
        .any(|e| e.reason().is_some_and(is_exhaustion_reason));
    if exhausted {
        Error::ResourceExhaustion(detail)
    } else {
        protocol(code, detail)
    }
}

fn protocol(code: ErrorCode, detail: String) -> Error {
    Error::Protocol {
        code: code.as_raw(),
        detail,
    }
}

/// Library-wide reason strings for allocation failures.
fn is_exhaustion_reason(reason: &str) -> bool {
    reason.contains("malloc failure") || reason.contains("out of memory")
}

/// Classify a setup-time library failure (context or connection creation).
pub(crate) fn setup_error(stack: ErrorStack) -> Error {
    let exhausted = stack
        .errors()
        .iter()
        .any(|e| e.reason().is_some_and(is_exhaustion_reason));
    if exhausted {
        Error::ResourceExhaustion(stack.to_string())
    } else {
        Error::Library(stack)
    }
}
