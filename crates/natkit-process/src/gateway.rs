//! The Process Gateway: a supervisor thread that owns no file descriptor
//! directly. Each tracked child gets four worker threads (stdin writer,
//! stdout reader, stderr reader, exit waiter); all four talk back to the
//! gateway thread exclusively by posting [`ProcessRequest`]s onto the same
//! bus external callers use, so the gateway's own state is still only ever
//! touched from its single thread.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use natkit_core::bus::{channel, Bus, Disconnected, Inbox, RecvOutcome};
use natkit_core::error::ErrorKind;
use natkit_core::{GatewayError, IdentifiableError, ResourceId, ResourceIdAllocator};

use crate::entry::{ProcessEntry, ProcessState};
use crate::event::{ProcessEvent, StreamKind};
use crate::request::ProcessRequest;

/// How often the exit waiter wakes to check whether the child has exited
/// on its own, between checks for a kill request. `std::process::Child`
/// offers no "wait with timeout", so this is the idiomatic synchronous
/// substitute.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Size of a single stdout/stderr read. Chunk boundaries are not
/// meaningful to callers; this only bounds one syscall's worth of data.
const READ_CHUNK: usize = 8192;

/// The caller-facing handle to a running Process Gateway.
#[derive(Clone)]
pub struct ProcessGatewayHandle {
    requests: Bus<ProcessRequest>,
}

impl ProcessGatewayHandle {
    /// Send a request to the gateway. Never blocks; fails only once the
    /// gateway thread has exited.
    pub fn send(&self, request: ProcessRequest) -> Result<(), Disconnected> {
        self.requests.send(request)
    }
}

/// Owns nothing itself — starts the supervisor thread and hands back a
/// handle to it.
pub struct ProcessGateway;

impl ProcessGateway {
    /// Start the supervisor on a dedicated thread. The thread runs until a
    /// `Kill` request is processed, at which point every tracked process
    /// and its worker threads have already been torn down.
    pub fn spawn() -> (ProcessGatewayHandle, JoinHandle<()>) {
        let (requests, inbox) = channel();
        let handle = ProcessGatewayHandle {
            requests: requests.clone(),
        };
        let join = thread::spawn(move || run(requests, inbox));
        (handle, join)
    }
}

struct Supervisor {
    requests: Bus<ProcessRequest>,
    entries: HashMap<ResourceId, ProcessEntry>,
    ids: ResourceIdAllocator,
}

fn run(requests: Bus<ProcessRequest>, inbox: Inbox<ProcessRequest>) {
    let mut supervisor = Supervisor {
        requests,
        entries: HashMap::new(),
        ids: ResourceIdAllocator::new(),
    };
    loop {
        let request = match inbox.recv() {
            Some(request) => request,
            None => return,
        };
        if let ProcessRequest::Kill = request {
            supervisor.kill();
            return;
        }
        supervisor.handle_request(request);
    }
}

impl Supervisor {
    fn handle_request(&mut self, request: ProcessRequest) {
        match request {
            ProcessRequest::CreateProcess {
                executable,
                args,
                response_bus,
            } => self.create_process(executable, args, response_bus),
            ProcessRequest::WriteProcess { id, bytes } => {
                if let Some(entry) = self.entries.get(&id) {
                    let _ = entry.stdin_tx.send(bytes);
                }
            }
            ProcessRequest::CloseProcess { id } => self.close_process(id),
            ProcessRequest::Read { id, stream, bytes } => {
                if let Some(entry) = self.entries.get(&id) {
                    let _ = entry
                        .response_bus
                        .send(ProcessEvent::ReadProcess(id, stream, bytes));
                }
            }
            ProcessRequest::WriteEmpty { id } => {
                if let Some(entry) = self.entries.get(&id) {
                    let _ = entry.response_bus.send(ProcessEvent::WriteEmptyProcess(id));
                }
            }
            ProcessRequest::Terminated { id, exit_code } => self.terminated(id, exit_code),
            ProcessRequest::Kill => unreachable!("Kill is handled in run()"),
        }
    }

    fn create_process(
        &mut self,
        executable: String,
        args: Vec<String>,
        response_bus: Bus<ProcessEvent>,
    ) {
        let mut command = Command::new(&executable);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let _ = response_bus.send(ProcessEvent::Error(GatewayError::new(
                    ErrorKind::Spawn,
                    "create_process.spawn",
                    err,
                )));
                return;
            }
        };

        let id = self.ids.allocate();
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let (stdin_tx, stdin_inbox) = channel::<Vec<u8>>();
        let (kill_tx, kill_inbox) = channel::<()>();

        let stdin_handle = {
            let requests = self.requests.clone();
            thread::spawn(move || stdin_writer_loop(id, stdin, stdin_inbox, requests))
        };
        let stdout_handle = {
            let requests = self.requests.clone();
            thread::spawn(move || reader_loop(id, StreamKind::Stdout, stdout, requests))
        };
        let stderr_handle = {
            let requests = self.requests.clone();
            thread::spawn(move || reader_loop(id, StreamKind::Stderr, stderr, requests))
        };
        let exit_handle = {
            let requests = self.requests.clone();
            thread::spawn(move || exit_waiter_loop(id, child, kill_inbox, requests))
        };

        let _ = response_bus.send(ProcessEvent::CreateProcessResponse(id));
        self.entries.insert(
            id,
            ProcessEntry {
                id,
                response_bus,
                state: ProcessState::Running,
                stdin_tx,
                kill_tx,
                stdin_handle,
                stdout_handle,
                stderr_handle,
                exit_handle,
            },
        );
    }

    fn close_process(&mut self, id: ResourceId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.state == ProcessState::Running {
                entry.state = ProcessState::Terminating;
                let _ = entry.kill_tx.send(());
            }
        }
        // An unknown or already-terminating id is a silent no-op, matching
        // the network gateway's Close contract.
    }

    /// An exit waiter posted this once `Child::wait` returned, whether the
    /// process exited on its own (spontaneous exit) or was killed via
    /// `CloseProcess`/`Kill`. Both paths converge here.
    fn terminated(&mut self, id: ResourceId, exit_code: Option<i32>) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        // The exit waiter is the thread that sent this message, so it has
        // already returned; the reader threads exit on their own once the
        // child's pipes close. Dropping stdin_tx disconnects the writer's
        // inbox so it unblocks from `recv()`.
        entry.exit_handle.join().ok();
        entry.stdout_handle.join().ok();
        entry.stderr_handle.join().ok();
        drop(entry.stdin_tx);
        entry.stdin_handle.join().ok();

        match exit_code {
            Some(code) => {
                let _ = entry.response_bus.send(ProcessEvent::ExitProcess(id, code));
            }
            None => {
                let _ = entry.response_bus.send(ProcessEvent::IdentifiableError(
                    IdentifiableError::new(
                        id,
                        ErrorKind::Closed,
                        "terminated",
                        std::io::Error::new(
                            std::io::ErrorKind::Other,
                            "process exited without a status code",
                        ),
                    ),
                ));
            }
        }
    }

    fn kill(&mut self) {
        let ids: Vec<_> = self.entries.keys().copied().collect();
        for id in ids {
            let Some(entry) = self.entries.remove(&id) else {
                continue;
            };
            let _ = entry.kill_tx.send(());
            entry.exit_handle.join().ok();
            entry.stdout_handle.join().ok();
            entry.stderr_handle.join().ok();
            drop(entry.stdin_tx);
            entry.stdin_handle.join().ok();
            let _ = entry
                .response_bus
                .send(ProcessEvent::IdentifiableError(IdentifiableError::shutdown(
                    id, "kill",
                )));
        }
    }
}

/// Blocks on its inbox, writes whatever arrives, then drains anything
/// queued behind it before posting a single `WriteEmpty` for the cycle —
/// the same hysteresis the network gateway uses for write-empty
/// notifications, just driven by a dedicated thread instead of a
/// selector.
fn stdin_writer_loop(
    id: ResourceId,
    mut stdin: std::process::ChildStdin,
    inbox: Inbox<Vec<u8>>,
    requests: Bus<ProcessRequest>,
) {
    loop {
        let Some(first) = inbox.recv() else {
            return;
        };
        if stdin.write_all(&first).is_err() {
            return;
        }
        for more in inbox.try_iter() {
            if stdin.write_all(&more).is_err() {
                return;
            }
        }
        let _ = requests.send(ProcessRequest::WriteEmpty { id });
    }
}

/// Reads until EOF (the child closed this stream, whether by exiting or
/// by choice) or a genuine I/O error, posting one `Read` request per
/// chunk.
fn reader_loop(
    id: ResourceId,
    stream: StreamKind,
    mut reader: impl Read,
    requests: Bus<ProcessRequest>,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if requests
                    .send(ProcessRequest::Read {
                        id,
                        stream,
                        bytes: buf[..n].to_vec(),
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return,
        }
    }
}

/// Owns the `Child` for its whole lifetime: this is the only thread that
/// ever calls `kill` or `wait` on it. Polls for a spontaneous exit between
/// checks for a kill request, since `Child` has no "wait with timeout".
fn exit_waiter_loop(
    id: ResourceId,
    mut child: Child,
    kill_inbox: Inbox<()>,
    requests: Bus<ProcessRequest>,
) {
    loop {
        match kill_inbox.recv_timeout(EXIT_POLL_INTERVAL) {
            RecvOutcome::Message(()) => {
                let _ = child.kill();
                break;
            }
            RecvOutcome::Disconnected => break,
            RecvOutcome::Timeout => match child.try_wait() {
                Ok(Some(_status)) => break,
                Ok(None) => continue,
                Err(_) => break,
            },
        }
    }
    let exit_code = child.wait().ok().and_then(|status| status.code());
    let _ = requests.send(ProcessRequest::Terminated { id, exit_code });
}
