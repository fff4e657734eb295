//! The two error kinds that are allowed to cross a bus boundary:
//! [`GatewayError`], posted when a request never got a resource off the
//! ground, and [`IdentifiableError`], posted when a previously created
//! resource has failed or been invalidated. Everything else on a response
//! bus is a success response or a notification — there is no third error
//! type.

use std::io;

/// Coarse classification every error carries, independent of which
/// gateway raised it. Callers branch on this rather than matching message
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Binding, connecting, or spawning never completed.
    Bind,
    Connect,
    Spawn,
    /// A live resource's underlying I/O failed.
    Io,
    /// The resource was already gone when the operation was attempted.
    Closed,
    /// The gateway itself is shutting down (`Kill`).
    ShuttingDown,
}

/// A request could not start: the resource never came into existence, so
/// no id was ever allocated for it.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {source}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub operation: &'static str,
    #[source]
    pub source: io::Error,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, operation: &'static str, source: io::Error) -> Self {
        Self {
            kind,
            operation,
            source,
        }
    }
}

/// A previously created resource has failed or been invalidated; the id is
/// no longer valid after this is observed.
#[derive(Debug, thiserror::Error)]
#[error("resource {id} failed: {operation}: {source}")]
pub struct IdentifiableError {
    pub id: u64,
    pub kind: ErrorKind,
    pub operation: &'static str,
    #[source]
    pub source: io::Error,
}

impl IdentifiableError {
    pub fn new(id: u64, kind: ErrorKind, operation: &'static str, source: io::Error) -> Self {
        Self {
            id,
            kind,
            operation,
            source,
        }
    }

    /// An `IdentifiableError` raised by `Kill` rather than a genuine
    /// failure — the source is a synthetic "gateway shutting down" error so
    /// the variant stays uniform, but `kind` lets callers skip logging it
    /// as a fault.
    pub fn shutdown(id: u64, operation: &'static str) -> Self {
        Self {
            id,
            kind: ErrorKind::ShuttingDown,
            operation,
            source: io::Error::new(io::ErrorKind::Other, "gateway killed"),
        }
    }
}

/// Classify a raw I/O error into an [`ErrorKind`], mirroring the mapping a
/// dispatch site performs before it ever lets an `io::Error` escape onto a
/// bus.
pub fn classify_io_error(error: &io::Error) -> ErrorKind {
    match error.kind() {
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => ErrorKind::Closed,
        _ => ErrorKind::Io,
    }
}
