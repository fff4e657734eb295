//! Notifications the Process Gateway posts back onto a caller's response
//! bus. Mirrors [`crate::request::ProcessRequest`]'s external half.

use natkit_core::{GatewayError, IdentifiableError, ResourceId};

/// Which of a child's two output streams a [`ProcessEvent::ReadProcess`]
/// carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub enum ProcessEvent {
    /// A process was spawned and is now tracked under this id.
    CreateProcessResponse(ResourceId),
    /// Spawning never produced a process; no id was allocated.
    Error(GatewayError),
    /// A chunk read from the child's stdout or stderr.
    ReadProcess(ResourceId, StreamKind, Vec<u8>),
    /// Every buffer queued ahead of the stdin writer has been flushed to
    /// the child's stdin. Fires once per drain cycle, same hysteresis as
    /// the network gateway's write-empty notifications.
    WriteEmptyProcess(ResourceId),
    /// The child exited and its status code was available.
    ExitProcess(ResourceId, i32),
    /// The resource is no longer valid: either the child exited without a
    /// status code (killed by a signal) or the gateway is shutting down.
    IdentifiableError(IdentifiableError),
}
