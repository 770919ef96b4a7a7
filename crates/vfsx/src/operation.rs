//! Intercepted operations and the descriptors built for them.
//!
//! [`FsRequest::describe`] is the single table mapping each intercepted
//! operation to its wire message tail:
//!
//! | operation                       | tail                      |
//! |---------------------------------|---------------------------|
//! | connect, disconnect             | (none)                    |
//! | opendir, rmdir, close, create   | `<path>`                  |
//! | read, write, pread, pwrite      | `<path>`                  |
//! | lseek, unlink                   | `<path>`                  |
//! | mkdir                           | `<path>,<mode>`           |
//! | open                            | `<path>,<flags>,<mode>`   |
//! | rename                          | `<oldpath>,<newpath>`     |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of filesystem operation being intercepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// A client connected to a share
    Connect,
    /// A client disconnected from a share
    Disconnect,
    /// Opening a directory for listing
    Opendir,
    /// Creating a directory
    Mkdir,
    /// Removing a directory
    Rmdir,
    /// Opening a file
    Open,
    /// Closing a file
    Close,
    /// Creating a file
    Create,
    /// Reading file contents
    Read,
    /// Writing file contents
    Write,
    /// Reading at an offset
    Pread,
    /// Writing at an offset
    Pwrite,
    /// Repositioning a file offset
    Lseek,
    /// Renaming/moving a file or directory
    Rename,
    /// Deleting a file
    Unlink,
}

impl OpKind {
    /// Every intercepted operation, in call-site order.
    pub const ALL: [OpKind; 15] = [
        OpKind::Connect,
        OpKind::Disconnect,
        OpKind::Opendir,
        OpKind::Mkdir,
        OpKind::Rmdir,
        OpKind::Open,
        OpKind::Close,
        OpKind::Create,
        OpKind::Read,
        OpKind::Write,
        OpKind::Pread,
        OpKind::Pwrite,
        OpKind::Lseek,
        OpKind::Rename,
        OpKind::Unlink,
    ];

    /// The operation name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Connect => "connect",
            OpKind::Disconnect => "disconnect",
            OpKind::Opendir => "opendir",
            OpKind::Mkdir => "mkdir",
            OpKind::Rmdir => "rmdir",
            OpKind::Open => "open",
            OpKind::Close => "close",
            OpKind::Create => "create",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Pread => "pread",
            OpKind::Pwrite => "pwrite",
            OpKind::Lseek => "lseek",
            OpKind::Rename => "rename",
            OpKind::Unlink => "unlink",
        }
    }

    /// Look up an operation by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Returns true if this operation leaves the share unmodified.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            OpKind::Connect
                | OpKind::Disconnect
                | OpKind::Opendir
                | OpKind::Open
                | OpKind::Close
                | OpKind::Read
                | OpKind::Pread
                | OpKind::Lseek
        )
    }

    /// Returns true if this operation modifies the share.
    pub fn is_write(&self) -> bool {
        !self.is_read_only()
    }

    /// Returns true if sending this operation ends the bridge connection.
    pub fn closes_connection(&self) -> bool {
        matches!(self, OpKind::Disconnect)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown operation name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for OpKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// One extra argument in a message tail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    /// A path or other text argument
    Str(String),
    /// A numeric argument (flags, modes)
    Int(i64),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => f.write_str(s),
            Arg::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Int(n)
    }
}

impl From<i32> for Arg {
    fn from(n: i32) -> Self {
        Arg::Int(n.into())
    }
}

impl From<u32> for Arg {
    fn from(n: u32) -> Self {
        Arg::Int(n.into())
    }
}

/// Everything the bridge needs to describe one intercepted call.
///
/// Built fresh per call and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationDescriptor {
    kind: OpKind,
    root_path: String,
    primary_path: Option<String>,
    extra: Vec<Arg>,
}

impl OperationDescriptor {
    /// A descriptor with no tail (`connect`, `disconnect`).
    pub fn new(kind: OpKind, root_path: impl Into<String>) -> Self {
        Self {
            kind,
            root_path: root_path.into(),
            primary_path: None,
            extra: Vec::new(),
        }
    }

    /// A descriptor whose tail starts with `primary_path`.
    pub fn with_path(
        kind: OpKind,
        root_path: impl Into<String>,
        primary_path: impl Into<String>,
        extra: Vec<Arg>,
    ) -> Self {
        Self {
            kind,
            root_path: root_path.into(),
            primary_path: Some(primary_path.into()),
            extra,
        }
    }

    /// The operation kind.
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// The operation name as sent on the wire.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The share root the operation runs under.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// The first path of the tail, if the operation has one.
    pub fn primary_path(&self) -> Option<&str> {
        self.primary_path.as_deref()
    }

    /// Arguments following the primary path.
    pub fn extra_args(&self) -> &[Arg] {
        &self.extra
    }
}

/// An intercepted call with the arguments that feed its wire message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsRequest<'a> {
    /// `connect:<root>`
    Connect,
    /// `disconnect:<root>`
    Disconnect,
    /// `opendir:<root>:<path>`
    Opendir {
        /// Directory being opened
        path: &'a str,
    },
    /// `mkdir:<root>:<path>,<mode>`
    Mkdir {
        /// Directory being created
        path: &'a str,
        /// Permission bits
        mode: u32,
    },
    /// `rmdir:<root>:<path>`
    Rmdir {
        /// Directory being removed
        path: &'a str,
    },
    /// `open:<root>:<path>,<flags>,<mode>`
    Open {
        /// File being opened
        path: &'a str,
        /// `open(2)` flags
        flags: i32,
        /// Permission bits
        mode: u32,
    },
    /// `close:<root>:<path>`
    Close {
        /// File being closed
        path: &'a str,
    },
    /// `create:<root>:<path>`
    Create {
        /// File being created
        path: &'a str,
    },
    /// `read:<root>:<path>`
    Read {
        /// File being read
        path: &'a str,
    },
    /// `write:<root>:<path>`
    Write {
        /// File being written
        path: &'a str,
    },
    /// `pread:<root>:<path>`
    Pread {
        /// File being read
        path: &'a str,
    },
    /// `pwrite:<root>:<path>`
    Pwrite {
        /// File being written
        path: &'a str,
    },
    /// `lseek:<root>:<path>`
    Lseek {
        /// File being repositioned
        path: &'a str,
    },
    /// `rename:<root>:<from>,<to>`
    Rename {
        /// Current path
        from: &'a str,
        /// New path
        to: &'a str,
    },
    /// `unlink:<root>:<path>`
    Unlink {
        /// File being deleted
        path: &'a str,
    },
}

impl FsRequest<'_> {
    /// The operation kind of this request.
    pub fn kind(&self) -> OpKind {
        match self {
            FsRequest::Connect => OpKind::Connect,
            FsRequest::Disconnect => OpKind::Disconnect,
            FsRequest::Opendir { .. } => OpKind::Opendir,
            FsRequest::Mkdir { .. } => OpKind::Mkdir,
            FsRequest::Rmdir { .. } => OpKind::Rmdir,
            FsRequest::Open { .. } => OpKind::Open,
            FsRequest::Close { .. } => OpKind::Close,
            FsRequest::Create { .. } => OpKind::Create,
            FsRequest::Read { .. } => OpKind::Read,
            FsRequest::Write { .. } => OpKind::Write,
            FsRequest::Pread { .. } => OpKind::Pread,
            FsRequest::Pwrite { .. } => OpKind::Pwrite,
            FsRequest::Lseek { .. } => OpKind::Lseek,
            FsRequest::Rename { .. } => OpKind::Rename,
            FsRequest::Unlink { .. } => OpKind::Unlink,
        }
    }

    /// Build the descriptor for this request under `root_path`.
    pub fn describe(&self, root_path: &str) -> OperationDescriptor {
        let kind = self.kind();
        match *self {
            FsRequest::Connect | FsRequest::Disconnect => OperationDescriptor::new(kind, root_path),
            FsRequest::Mkdir { path, mode } => {
                OperationDescriptor::with_path(kind, root_path, path, vec![mode.into()])
            }
            FsRequest::Open { path, flags, mode } => {
                OperationDescriptor::with_path(kind, root_path, path, vec![flags.into(), mode.into()])
            }
            FsRequest::Rename { from, to } => {
                OperationDescriptor::with_path(kind, root_path, from, vec![to.into()])
            }
            FsRequest::Opendir { path }
            | FsRequest::Rmdir { path }
            | FsRequest::Close { path }
            | FsRequest::Create { path }
            | FsRequest::Read { path }
            | FsRequest::Write { path }
            | FsRequest::Pread { path }
            | FsRequest::Pwrite { path }
            | FsRequest::Lseek { path }
            | FsRequest::Unlink { path } => {
                OperationDescriptor::with_path(kind, root_path, path, Vec::new())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in OpKind::ALL {
            assert_eq!(OpKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.name().parse::<OpKind>().unwrap(), kind);
        }
        assert!(OpKind::from_name("chmod").is_none());
        assert_eq!(
            "chmod".parse::<OpKind>(),
            Err(UnknownOperation("chmod".to_string()))
        );
    }

    #[test]
    fn test_operation_classification() {
        assert!(OpKind::Read.is_read_only());
        assert!(OpKind::Opendir.is_read_only());
        assert!(OpKind::Connect.is_read_only());

        assert!(OpKind::Write.is_write());
        assert!(OpKind::Unlink.is_write());
        assert!(OpKind::Rename.is_write());
        assert!(OpKind::Mkdir.is_write());
    }

    #[test]
    fn test_only_disconnect_closes_connection() {
        for kind in OpKind::ALL {
            assert_eq!(kind.closes_connection(), kind == OpKind::Disconnect);
        }
    }

    #[test]
    fn test_describe_connect_has_no_tail() {
        let desc = FsRequest::Connect.describe("/srv/share");
        assert_eq!(desc.name(), "connect");
        assert_eq!(desc.root_path(), "/srv/share");
        assert!(desc.primary_path().is_none());
        assert!(desc.extra_args().is_empty());
    }

    #[test]
    fn test_describe_open_carries_flags_and_mode() {
        let desc = FsRequest::Open {
            path: "docs/a.txt",
            flags: 66,
            mode: 0o644,
        }
        .describe("/srv/share");
        assert_eq!(desc.kind(), OpKind::Open);
        assert_eq!(desc.primary_path(), Some("docs/a.txt"));
        assert_eq!(desc.extra_args(), &[Arg::Int(66), Arg::Int(420)]);
    }

    #[test]
    fn test_describe_rename_carries_both_paths() {
        let desc = FsRequest::Rename {
            from: "old.txt",
            to: "new.txt",
        }
        .describe("/srv");
        assert_eq!(desc.primary_path(), Some("old.txt"));
        assert_eq!(desc.extra_args(), &[Arg::Str("new.txt".to_string())]);
    }

    #[test]
    fn test_request_kinds_cover_every_operation() {
        let requests = [
            FsRequest::Connect,
            FsRequest::Disconnect,
            FsRequest::Opendir { path: "d" },
            FsRequest::Mkdir { path: "d", mode: 0 },
            FsRequest::Rmdir { path: "d" },
            FsRequest::Open {
                path: "f",
                flags: 0,
                mode: 0,
            },
            FsRequest::Close { path: "f" },
            FsRequest::Create { path: "f" },
            FsRequest::Read { path: "f" },
            FsRequest::Write { path: "f" },
            FsRequest::Pread { path: "f" },
            FsRequest::Pwrite { path: "f" },
            FsRequest::Lseek { path: "f" },
            FsRequest::Rename { from: "a", to: "b" },
            FsRequest::Unlink { path: "f" },
        ];
        let kinds: Vec<OpKind> = requests.iter().map(FsRequest::kind).collect();
        assert_eq!(kinds, OpKind::ALL.to_vec());
    }
}
