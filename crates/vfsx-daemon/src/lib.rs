//! VFSX decision daemon
//!
//! A reference decision process for the VFSX bridge. It listens on a Unix
//! socket, parses each 512-byte request frame, tracks one session per share
//! root, and answers with the verdict of a glob-rule policy.
//!
//! ```text
//! Bridge                                   Daemon
//! │                                           │
//! │  "open:/srv/share:a.txt,0,0\0\0..."       │
//! │ ─────────────────────────────────────────>│
//! │                                  policy check
//! │                  "0\0\0"                  │
//! │<───────────────────────────────────────── │
//! ```

mod config;
mod policy;
mod server;
mod session;

pub use config::{Access, Action, PolicyFile, PolicyFileError, RuleSpec};
pub use policy::{
    AllowAllPolicy, DenyAllPolicy, Policy, PolicyBuilder, PolicyHandler, evaluate, join_path,
};
pub use server::{DecisionServer, ServerError};
pub use session::{Session, SessionRegistry};
