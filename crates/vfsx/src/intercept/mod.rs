//! Interception of host filesystem operations.
//!
//! [`FileSystem`] models the host's downstream ("next") operations.
//! [`Intercepted`] wraps any implementation and routes every call through a
//! [`Bridge`] according to its [`Mode`]:
//!
//! - **Gate**: the operation is described to the decision process first and
//!   only runs if it is not denied. A deny surfaces as `EPERM`.
//! - **Audit**: the operation runs first; if it succeeded it is reported.
//!   The operation's own result is always returned unchanged.
//!
//! Since `Intercepted` is itself a `FileSystem`, interceptors can be chained.

mod local;

use std::io::{self, SeekFrom};

pub use local::{LocalFile, LocalFs};

use crate::bridge::{Bridge, Mode};
use crate::operation::FsRequest;

/// A file handle that knows which path it was opened with.
pub trait OpenFile {
    /// Path of the file relative to the share root.
    fn base_name(&self) -> &str;
}

/// The operations a file server performs on a share.
///
/// Paths are relative to the share root.
pub trait FileSystem {
    /// Handle returned by `opendir`
    type Dir;
    /// Handle returned by `open`/`create`
    type File: OpenFile;

    /// A client connects to the share.
    fn connect(&mut self, service: &str, user: &str) -> io::Result<()>;

    /// A client disconnects from the share.
    fn disconnect(&mut self);

    /// Open a directory for listing.
    fn opendir(&mut self, path: &str) -> io::Result<Self::Dir>;

    /// Create a directory.
    fn mkdir(&mut self, path: &str, mode: u32) -> io::Result<()>;

    /// Remove an empty directory.
    fn rmdir(&mut self, path: &str) -> io::Result<()>;

    /// Open a file with `open(2)` flags.
    fn open(&mut self, path: &str, flags: i32, mode: u32) -> io::Result<Self::File>;

    /// Close a file.
    fn close(&mut self, file: Self::File) -> io::Result<()>;

    /// Create (or truncate) a file.
    fn create(&mut self, path: &str) -> io::Result<Self::File>;

    /// Read at the current offset.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> io::Result<usize>;

    /// Write at the current offset.
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> io::Result<usize>;

    /// Read at an explicit offset.
    fn pread(&mut self, file: &mut Self::File, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write at an explicit offset.
    fn pwrite(&mut self, file: &mut Self::File, data: &[u8], offset: u64) -> io::Result<usize>;

    /// Reposition the file offset.
    fn lseek(&mut self, file: &mut Self::File, pos: SeekFrom) -> io::Result<u64>;

    /// Rename a file or directory.
    fn rename(&mut self, from: &str, to: &str) -> io::Result<()>;

    /// Delete a file.
    fn unlink(&mut self, path: &str) -> io::Result<()>;
}

/// A [`FileSystem`] whose operations pass through a [`Bridge`].
#[derive(Debug)]
pub struct Intercepted<F> {
    inner: F,
    bridge: Bridge,
    root_path: String,
}

impl<F: FileSystem> Intercepted<F> {
    /// Wrap `inner`, describing its operations under `root_path`.
    pub fn new(inner: F, bridge: Bridge, root_path: impl Into<String>) -> Self {
        Self {
            inner,
            bridge,
            root_path: root_path.into(),
        }
    }

    /// The share root sent with every message.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// The bridge used for every operation.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Get a reference to the wrapped filesystem.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Get a mutable reference to the wrapped filesystem.
    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    /// Unwrap into the filesystem and its bridge.
    pub fn into_parts(self) -> (F, Bridge) {
        (self.inner, self.bridge)
    }

    /// Run `op` on the wrapped filesystem under the bridge's mode.
    fn dispatch<T>(
        &mut self,
        request: FsRequest<'_>,
        op: impl FnOnce(&mut F) -> io::Result<T>,
    ) -> io::Result<T> {
        let descriptor = request.describe(&self.root_path);
        match self.bridge.mode() {
            Mode::Gate => {
                if let Some(err) = self.bridge.intercept(&descriptor).denial() {
                    tracing::debug!(
                        operation = %descriptor.kind(),
                        root = %self.root_path,
                        "operation denied"
                    );
                    return Err(err);
                }
                op(&mut self.inner)
            }
            Mode::Audit => {
                let result = op(&mut self.inner);
                if result.is_ok() {
                    self.bridge.intercept(&descriptor);
                }
                result
            }
        }
    }
}

impl<F: FileSystem> FileSystem for Intercepted<F> {
    type Dir = F::Dir;
    type File = F::File;

    fn connect(&mut self, service: &str, user: &str) -> io::Result<()> {
        self.dispatch(FsRequest::Connect, |fs| fs.connect(service, user))
    }

    fn disconnect(&mut self) {
        let _ = self.dispatch(FsRequest::Disconnect, |fs| {
            fs.disconnect();
            Ok(())
        });
    }

    fn opendir(&mut self, path: &str) -> io::Result<Self::Dir> {
        self.dispatch(FsRequest::Opendir { path }, |fs| fs.opendir(path))
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> io::Result<()> {
        self.dispatch(FsRequest::Mkdir { path, mode }, |fs| fs.mkdir(path, mode))
    }

    fn rmdir(&mut self, path: &str) -> io::Result<()> {
        self.dispatch(FsRequest::Rmdir { path }, |fs| fs.rmdir(path))
    }

    fn open(&mut self, path: &str, flags: i32, mode: u32) -> io::Result<Self::File> {
        self.dispatch(FsRequest::Open { path, flags, mode }, |fs| {
            fs.open(path, flags, mode)
        })
    }

    fn close(&mut self, file: Self::File) -> io::Result<()> {
        let path = file.base_name().to_string();
        self.dispatch(FsRequest::Close { path: &path }, |fs| fs.close(file))
    }

    fn create(&mut self, path: &str) -> io::Result<Self::File> {
        self.dispatch(FsRequest::Create { path }, |fs| fs.create(path))
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> io::Result<usize> {
        let path = file.base_name().to_string();
        self.dispatch(FsRequest::Read { path: &path }, |fs| fs.read(file, buf))
    }

    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> io::Result<usize> {
        let path = file.base_name().to_string();
        self.dispatch(FsRequest::Write { path: &path }, |fs| fs.write(file, data))
    }

    fn pread(&mut self, file: &mut Self::File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let path = file.base_name().to_string();
        self.dispatch(FsRequest::Pread { path: &path }, |fs| {
            fs.pread(file, buf, offset)
        })
    }

    fn pwrite(&mut self, file: &mut Self::File, data: &[u8], offset: u64) -> io::Result<usize> {
        let path = file.base_name().to_string();
        self.dispatch(FsRequest::Pwrite { path: &path }, |fs| {
            fs.pwrite(file, data, offset)
        })
    }

    fn lseek(&mut self, file: &mut Self::File, pos: SeekFrom) -> io::Result<u64> {
        let path = file.base_name().to_string();
        self.dispatch(FsRequest::Lseek { path: &path }, |fs| fs.lseek(file, pos))
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
        self.dispatch(FsRequest::Rename { from, to }, |fs| fs.rename(from, to))
    }

    fn unlink(&mut self, path: &str) -> io::Result<()> {
        self.dispatch(FsRequest::Unlink { path }, |fs| fs.unlink(path))
    }
}
