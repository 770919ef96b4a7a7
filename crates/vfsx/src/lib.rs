//! VFSX: filesystem operation bridge
//!
//! VFSX sits between a file server's filesystem layer and an external decision
//! process listening on a Unix socket. Each intercepted operation is encoded
//! as a fixed 512-byte text frame (`op:root[:args]`), sent over one persistent
//! connection, and answered with a 3-byte verdict. In gate mode a deny verdict
//! blocks the operation with `EPERM`; in audit mode successful operations are
//! only reported.

mod bridge;
mod config;
mod connection;
mod diagnostics;
mod error;
mod intercept;
mod operation;
mod verdict;

pub mod wire;

pub use bridge::{Bridge, Decision, Mode, Outcome, decide};
pub use config::{BridgeConfig, DEFAULT_SOCKET_PATH, ENV_LOG, ENV_MODE, ENV_SOCKET};
pub use connection::{ConnectionManager, ConnectionState};
pub use diagnostics::DiagnosticLog;
pub use error::{BridgeError, ConfigError};
pub use intercept::{FileSystem, Intercepted, LocalFile, LocalFs, OpenFile};
pub use operation::{Arg, FsRequest, OpKind, OperationDescriptor, UnknownOperation};
pub use verdict::Verdict;
pub use wire::{MSG_IN_SIZE, MSG_OUT_SIZE, ParsedMessage, WireError, WireMessage};
