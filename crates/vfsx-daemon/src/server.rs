//! Unix socket server answering bridge requests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use vfsx::wire::{self, MSG_OUT_SIZE};
use vfsx::Verdict;

use crate::policy::{self, PolicyHandler};
use crate::session::SessionRegistry;

/// Errors starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A stale socket file could not be removed
    #[error("remove existing socket at {path}: {source}")]
    RemoveStale {
        /// Socket path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Binding the socket failed
    #[error("bind {path}: {source}")]
    Bind {
        /// Socket path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Accepting a connection failed
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// The decision process: one listener, one task per bridge connection.
#[derive(Clone)]
pub struct DecisionServer {
    socket_path: PathBuf,
    handler: Arc<dyn PolicyHandler>,
    sessions: Arc<SessionRegistry>,
}

impl std::fmt::Debug for DecisionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionServer")
            .field("socket_path", &self.socket_path)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl DecisionServer {
    /// Create a server for the given socket path and policy.
    pub fn new(socket_path: impl Into<PathBuf>, handler: Arc<dyn PolicyHandler>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// The socket path the server binds.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sessions currently open.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Bind the socket, replacing a stale socket file.
    pub fn bind(&self) -> Result<UnixListener, ServerError> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|source| ServerError::RemoveStale {
                path: self.socket_path.clone(),
                source,
            })?;
        }
        UnixListener::bind(&self.socket_path).map_err(|source| ServerError::Bind {
            path: self.socket_path.clone(),
            source,
        })
    }

    /// Bind and serve until an accept error.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        tracing::info!(socket = %self.socket_path.display(), "decision process listening");
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: UnixListener) -> Result<(), ServerError> {
        loop {
            let (stream, _addr) = listener.accept().await.map_err(ServerError::Accept)?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(err) = server.handle_connection(stream).await {
                    tracing::warn!(error = %err, "connection ended with error");
                }
            });
        }
    }

    /// Answer frames on one connection until the bridge closes it.
    async fn handle_connection(&self, mut stream: UnixStream) -> io::Result<()> {
        tracing::debug!("bridge connected");
        let mut frame = [0u8; MSG_OUT_SIZE];
        loop {
            match stream.read_exact(&mut frame).await {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("bridge disconnected");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
            let verdict = self.respond(&frame);
            stream.write_all(&wire::encode_reply(verdict)).await?;
        }
    }

    /// Decide on one request frame.
    ///
    /// Malformed frames get [`Verdict::ERROR`], unknown operations
    /// [`Verdict::NOT_IMPLEMENTED`].
    pub fn respond(&self, frame: &[u8]) -> Verdict {
        let request = match wire::parse_message(frame) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "rejecting malformed frame");
                return Verdict::ERROR;
            }
        };

        let session = self.sessions.observe(&request);
        let verdict = policy::evaluate(self.handler.as_ref(), &request);
        if request.kind().is_none() {
            tracing::info!(operation = %request.operation, "operation not implemented");
        }
        tracing::info!(
            operation = %request.operation,
            root = %request.root_path,
            args = ?request.args,
            seq = session.operations,
            %verdict,
            "request"
        );
        verdict
    }
}
