use std::time::Duration;

use natkit_core::bus::channel;
use natkit_process::{ProcessEvent, ProcessGateway, ProcessRequest, StreamKind};

fn recv_timeout(inbox: &natkit_core::bus::Inbox<ProcessEvent>) -> ProcessEvent {
    match inbox.recv_timeout(Duration::from_secs(5)) {
        natkit_core::bus::RecvOutcome::Message(event) => event,
        natkit_core::bus::RecvOutcome::Timeout => panic!("timed out waiting for event"),
        natkit_core::bus::RecvOutcome::Disconnected => panic!("bus disconnected unexpectedly"),
    }
}

#[test]
fn cat_echoes_stdin_to_stdout() {
    let (handle, _join) = ProcessGateway::spawn();
    let (response_bus, inbox) = channel();

    handle
        .send(ProcessRequest::CreateProcess {
            executable: "cat".to_string(),
            args: Vec::new(),
            response_bus: response_bus.clone(),
        })
        .unwrap();
    let id = match recv_timeout(&inbox) {
        ProcessEvent::CreateProcessResponse(id) => id,
        other => panic!("unexpected event: {other:?}"),
    };

    handle
        .send(ProcessRequest::WriteProcess {
            id,
            bytes: b"hello\n".to_vec(),
        })
        .unwrap();

    // WriteEmpty and the echoed read can arrive in either order: the
    // writer thread and `cat`'s own scheduling are independent.
    let mut saw_write_empty = false;
    let mut saw_read = false;
    while !saw_write_empty || !saw_read {
        match recv_timeout(&inbox) {
            ProcessEvent::WriteEmptyProcess(got_id) => {
                assert_eq!(got_id, id);
                saw_write_empty = true;
            }
            ProcessEvent::ReadProcess(got_id, StreamKind::Stdout, bytes) => {
                assert_eq!(got_id, id);
                assert_eq!(bytes, b"hello\n");
                saw_read = true;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    handle.send(ProcessRequest::CloseProcess { id }).unwrap();
    match recv_timeout(&inbox) {
        ProcessEvent::ExitProcess(got_id, _code) => assert_eq!(got_id, id),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn spawn_failure_reports_error_without_allocating_id() {
    let (handle, _join) = ProcessGateway::spawn();
    let (response_bus, inbox) = channel();

    handle
        .send(ProcessRequest::CreateProcess {
            executable: "natkit-nonexistent-binary-xyz".to_string(),
            args: Vec::new(),
            response_bus,
        })
        .unwrap();

    match recv_timeout(&inbox) {
        ProcessEvent::Error(_) => {}
        other => panic!("expected Error, got {other:?}"),
    }
}

#[test]
fn spontaneous_exit_converges_to_terminated() {
    let (handle, _join) = ProcessGateway::spawn();
    let (response_bus, inbox) = channel();

    handle
        .send(ProcessRequest::CreateProcess {
            executable: "true".to_string(),
            args: Vec::new(),
            response_bus,
        })
        .unwrap();
    let id = match recv_timeout(&inbox) {
        ProcessEvent::CreateProcessResponse(id) => id,
        other => panic!("unexpected event: {other:?}"),
    };

    // No Close-Process was ever sent; the process exits on its own.
    match recv_timeout(&inbox) {
        ProcessEvent::ExitProcess(got_id, code) => {
            assert_eq!(got_id, id);
            assert_eq!(code, 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn kill_terminates_every_live_process() {
    let (handle, join) = ProcessGateway::spawn();
    let (response_bus, inbox) = channel();

    let mut ids = Vec::new();
    for _ in 0..3 {
        handle
            .send(ProcessRequest::CreateProcess {
                executable: "sleep".to_string(),
                args: vec!["30".to_string()],
                response_bus: response_bus.clone(),
            })
            .unwrap();
        match recv_timeout(&inbox) {
            ProcessEvent::CreateProcessResponse(id) => ids.push(id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    handle.send(ProcessRequest::Kill).unwrap();
    join.join().unwrap();

    let mut seen = Vec::new();
    while seen.len() < ids.len() {
        match recv_timeout(&inbox) {
            ProcessEvent::IdentifiableError(err) => seen.push(err.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    seen.sort_unstable();
    let mut expected = ids.clone();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}
