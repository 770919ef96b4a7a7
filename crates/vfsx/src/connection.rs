//! The single outbound connection to the decision process.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::error::BridgeError;
use crate::verdict::Verdict;
use crate::wire::{self, MSG_IN_SIZE, WireMessage};

/// Whether the bridge currently holds an open socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket is open
    Disconnected,
    /// A socket is open and reused for every request
    Connected,
}

/// Owns the Unix stream to the decision process.
///
/// The stream is opened lazily on first use and dropped on any I/O failure,
/// so the next request reconnects. All calls block without a timeout.
#[derive(Debug)]
pub struct ConnectionManager {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
}

impl ConnectionManager {
    /// Create a disconnected manager for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            stream: None,
        }
    }

    /// The socket path the manager connects to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Connect if not already connected.
    pub fn ensure_connected(&mut self) -> Result<(), BridgeError> {
        self.stream().map(|_| ())
    }

    /// Send one request frame and wait for its reply.
    ///
    /// Any failure closes the connection before the error is returned.
    pub fn send_and_receive(&mut self, message: &WireMessage) -> Result<Verdict, BridgeError> {
        let frame = message.to_frame();
        let result = {
            let stream = self.stream()?;
            exchange(stream, &frame)
        };

        match result {
            Ok(verdict) => {
                tracing::trace!(message = %message, verdict = %verdict, "received reply");
                Ok(verdict)
            }
            Err(err) => {
                tracing::warn!(error = %err, "exchange with decision process failed");
                self.stream = None;
                Err(err)
            }
        }
    }

    /// Close the socket, whatever the current state.
    pub fn close_connection(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!(socket = %self.socket_path.display(), "closing connection normally");
        }
    }

    fn stream(&mut self) -> Result<&mut UnixStream, BridgeError> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => match UnixStream::connect(&self.socket_path) {
                Ok(stream) => {
                    tracing::info!(socket = %self.socket_path.display(), "connect succeeded");
                    stream
                }
                Err(source) => {
                    tracing::info!(
                        socket = %self.socket_path.display(),
                        error = %source,
                        "connect failed"
                    );
                    return Err(BridgeError::Connect {
                        path: self.socket_path.clone(),
                        source,
                    });
                }
            },
        };
        Ok(self.stream.insert(stream))
    }
}

/// Write the whole frame, then read one reply of at most [`MSG_IN_SIZE`] bytes.
///
/// A short reply is zero-padded before decoding. Only one `read` is issued, so
/// a reply the peer splits across writes is cut at the first segment and the
/// remainder is taken as the verdict of the next request on this connection.
fn exchange(stream: &mut UnixStream, frame: &[u8]) -> Result<Verdict, BridgeError> {
    stream.write_all(frame).map_err(BridgeError::Send)?;

    let mut reply = [0u8; MSG_IN_SIZE];
    let read = loop {
        match stream.read(&mut reply) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => break other,
        }
    };
    match read.map_err(BridgeError::Receive)? {
        0 => Err(BridgeError::Closed),
        _ => Ok(wire::decode_reply(&reply)),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    use crate::operation::FsRequest;
    use crate::wire::MSG_OUT_SIZE;

    fn message(request: FsRequest<'_>) -> WireMessage {
        wire::encode(&request.describe("/srv"))
    }

    #[test]
    fn test_starts_disconnected() {
        let manager = ConnectionManager::new("/nonexistent/vfsx-socket");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.socket_path(), Path::new("/nonexistent/vfsx-socket"));
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConnectionManager::new(dir.path().join("missing.sock"));

        let err = manager.ensure_connected().unwrap_err();
        assert!(matches!(err, BridgeError::Connect { .. }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let err = manager
            .send_and_receive(&message(FsRequest::Connect))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Connect { .. }));
    }

    #[test]
    fn test_round_trip_reuses_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vfsx.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frames = Vec::new();
            for reply in [b"0\0\0", b"-2\0"] {
                let mut frame = [0u8; MSG_OUT_SIZE];
                stream.read_exact(&mut frame).unwrap();
                frames.push(frame.to_vec());
                stream.write_all(reply).unwrap();
            }
            frames
        });

        let mut manager = ConnectionManager::new(&path);
        let first = manager
            .send_and_receive(&message(FsRequest::Connect))
            .unwrap();
        assert_eq!(first, Verdict::ALLOW);
        assert_eq!(manager.state(), ConnectionState::Connected);

        let second = manager
            .send_and_receive(&message(FsRequest::Unlink { path: "a.txt" }))
            .unwrap();
        assert_eq!(second, Verdict::DENIED);

        let frames = server.join().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with(b"connect:/srv\0"));
        assert!(frames[1].starts_with(b"unlink:/srv:a.txt\0"));
        assert!(frames[1][17..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_short_reply_is_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vfsx.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frame = [0u8; MSG_OUT_SIZE];
            stream.read_exact(&mut frame).unwrap();
            stream.write_all(b"5").unwrap();
        });

        let mut manager = ConnectionManager::new(&path);
        let verdict = manager
            .send_and_receive(&message(FsRequest::Connect))
            .unwrap();
        assert_eq!(verdict, Verdict::new(5));
        server.join().unwrap();
    }

    #[test]
    fn test_split_reply_shifts_into_next_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vfsx.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frame = [0u8; MSG_OUT_SIZE];
            stream.read_exact(&mut frame).unwrap();
            stream.write_all(b"-").unwrap();
            thread::sleep(std::time::Duration::from_millis(200));
            stream.write_all(b"2\0").unwrap();
            stream.read_exact(&mut frame).unwrap();
        });

        let mut manager = ConnectionManager::new(&path);
        let first = manager
            .send_and_receive(&message(FsRequest::Connect))
            .unwrap();
        assert_eq!(first, Verdict::ALLOW);

        let second = manager
            .send_and_receive(&message(FsRequest::Unlink { path: "a.txt" }))
            .unwrap();
        assert_eq!(second, Verdict::new(2));
        server.join().unwrap();
    }

    #[test]
    fn test_peer_close_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vfsx.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frame = [0u8; MSG_OUT_SIZE];
            stream.read_exact(&mut frame).unwrap();
            // Drop without replying
        });

        let mut manager = ConnectionManager::new(&path);
        manager.ensure_connected().unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);

        let err = manager
            .send_and_receive(&message(FsRequest::Connect))
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Closed | BridgeError::Receive(_) | BridgeError::Send(_)
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        server.join().unwrap();
    }

    #[test]
    fn test_close_is_unconditional() {
        let mut manager = ConnectionManager::new("/nonexistent/vfsx-socket");
        manager.close_connection();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
