//! Requests accepted on a Process Gateway's bus. The first four variants
//! are the external surface; the last three are posted by a process's own
//! worker threads back onto the same bus — "back-edges via messages, not
//! call-backs".

use natkit_core::{Bus, ResourceId};

use crate::event::{ProcessEvent, StreamKind};

#[derive(Debug)]
pub enum ProcessRequest {
    /// Spawn `executable` with `args`, piping stdin/stdout/stderr.
    CreateProcess {
        executable: String,
        args: Vec<String>,
        response_bus: Bus<ProcessEvent>,
    },
    /// Enqueue `bytes` for the process's stdin writer. Silently dropped if
    /// `id` names no live process.
    WriteProcess { id: ResourceId, bytes: Vec<u8> },
    /// Begin terminating the process named by `id`. Idempotent.
    CloseProcess { id: ResourceId },
    /// Terminate the gateway: kill and reap every tracked process before
    /// the gateway thread exits.
    Kill,

    /// Posted by a stdout/stderr reader thread for each chunk it reads.
    Read {
        id: ResourceId,
        stream: StreamKind,
        bytes: Vec<u8>,
    },
    /// Posted by the stdin writer once it has drained its queue.
    WriteEmpty { id: ResourceId },
    /// Posted by the exit waiter once `wait()` returns, whether the
    /// process exited on its own or was killed by `CloseProcess`/`Kill`.
    Terminated {
        id: ResourceId,
        exit_code: Option<i32>,
    },
}
