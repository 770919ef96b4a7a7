//! Integration tests driving the daemon through the real bridge client.
//!
//! The bridge is blocking, so each client runs under `spawn_blocking` while
//! the daemon serves on the test runtime.

#![allow(clippy::unwrap_used)] // unwrap is acceptable in tests

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;

use vfsx::{Bridge, BridgeConfig, FileSystem, Intercepted, LocalFs, Mode, Verdict};
use vfsx_daemon::{DecisionServer, PolicyFile, ServerError};

static INIT_TRACING: Once = Once::new();

fn init_tracing() {
    INIT_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("vfsx_daemon=debug,vfsx=debug")
            .with_test_writer()
            .init();
    });
}

struct Fixture {
    _dir: tempfile::TempDir,
    socket: PathBuf,
    share: PathBuf,
    server: DecisionServer,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a daemon whose policy allows the share but keeps `readonly/` read-only.
fn start_daemon() -> Fixture {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("vfsx.sock");
    let share = dir.path().join("share");
    std::fs::create_dir_all(share.join("readonly")).unwrap();
    std::fs::write(share.join("readonly").join("keep.txt"), b"keep").unwrap();

    let root = share.to_string_lossy();
    let policy = PolicyFile::from_json(&format!(
        r#"{{
            "default": "deny",
            "rules": [
                {{ "action": "deny", "access": "write", "pattern": "{root}/readonly/**" }},
                {{ "action": "allow", "access": "all", "pattern": "{root}/**" }}
            ]
        }}"#
    ))
    .unwrap()
    .into_policy()
    .unwrap();

    let server = DecisionServer::new(&socket, Arc::new(policy));
    let listener = server.bind().unwrap();
    let handle = tokio::spawn(server.clone().serve(listener));

    Fixture {
        _dir: dir,
        socket,
        share,
        server,
        handle,
    }
}

fn client(socket: &Path, share: &Path, mode: Mode) -> Intercepted<LocalFs> {
    let config = BridgeConfig {
        socket_path: socket.to_path_buf(),
        mode,
        diagnostic_log: None,
    };
    Intercepted::new(
        LocalFs::new(share),
        Bridge::new(&config),
        share.to_string_lossy().into_owned(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gate_client_against_policy() {
    let fixture = start_daemon();
    let (socket, share) = (fixture.socket.clone(), fixture.share.clone());

    let work = tokio::task::spawn_blocking(move || {
        let mut fs = client(&socket, &share, Mode::Gate);
        fs.connect("share", "alice").unwrap();

        let mut file = fs.create("notes.txt").unwrap();
        fs.write(&mut file, b"hello").unwrap();
        fs.close(file).unwrap();

        let err = fs.unlink("readonly/keep.txt").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(eperm()));
        let err = fs.rename("notes.txt", "readonly/notes.txt").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);

        let mut file = fs.open("readonly/keep.txt", 0, 0).unwrap();
        let mut buf = [0u8; 4];
        fs.read(&mut file, &mut buf).unwrap();
        assert_eq!(&buf, b"keep");
        fs.close(file).unwrap();

        fs.disconnect();
        assert_eq!(fs.bridge().state(), vfsx::ConnectionState::Disconnected);
    });
    timeout(Duration::from_secs(10), work).await.unwrap().unwrap();

    assert!(fixture.share.join("readonly").join("keep.txt").exists());
    assert!(fixture.share.join("notes.txt").exists());
    assert!(fixture.server.sessions().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_audit_client_is_never_blocked() {
    let fixture = start_daemon();
    let (socket, share) = (fixture.socket.clone(), fixture.share.clone());
    let root = share.to_string_lossy().into_owned();

    let work = tokio::task::spawn_blocking(move || {
        let mut fs = client(&socket, &share, Mode::Audit);
        fs.connect("share", "bob").unwrap();
        fs.unlink("readonly/keep.txt").unwrap();
        fs.mkdir("readonly/sub", 0o755).unwrap();
        assert_eq!(fs.bridge().last_errno(), Some(eperm()));
    });
    timeout(Duration::from_secs(10), work).await.unwrap().unwrap();

    assert!(!fixture.share.join("readonly").join("keep.txt").exists());
    assert_eq!(fixture.server.sessions().get(&root).unwrap().operations, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sessions_are_shared_across_connections() {
    let fixture = start_daemon();
    let root = fixture.share.to_string_lossy().into_owned();

    let mut workers = Vec::new();
    for _ in 0..3 {
        let (socket, share) = (fixture.socket.clone(), fixture.share.clone());
        workers.push(tokio::task::spawn_blocking(move || {
            let mut fs = client(&socket, &share, Mode::Gate);
            fs.connect("share", "carol").unwrap();
            fs.opendir(".").unwrap();
        }));
    }
    for worker in workers {
        timeout(Duration::from_secs(10), worker).await.unwrap().unwrap();
    }

    let session = fixture.server.sessions().get(&root).unwrap();
    assert_eq!(session.operations, 6);
    assert_eq!(fixture.server.sessions().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_operation_reply() {
    let fixture = start_daemon();
    let socket = fixture.socket.clone();

    let verdict = tokio::task::spawn_blocking(move || {
        use std::io::{Read, Write};
        let mut stream = std::os::unix::net::UnixStream::connect(&socket).unwrap();
        let mut frame = [0u8; vfsx::MSG_OUT_SIZE];
        frame[..12].copy_from_slice(b"mknod:/srv:x");
        stream.write_all(&frame).unwrap();
        let mut reply = [0u8; vfsx::MSG_IN_SIZE];
        stream.read_exact(&mut reply).unwrap();
        vfsx::wire::decode_reply(&reply)
    });
    let verdict = timeout(Duration::from_secs(10), verdict).await.unwrap().unwrap();
    assert_eq!(verdict, Verdict::NOT_IMPLEMENTED);
}

fn eperm() -> i32 {
    Verdict::DENIED.errno().unwrap()
}
