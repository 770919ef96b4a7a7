//! Decision codes returned by the external decision process.

use std::fmt;
use std::io;

/// The decoded reply of the decision process.
///
/// `0`, `-1` and `-2` carry protocol meaning. Every other value is a
/// host-defined informational code and is passed through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Verdict(i32);

impl Verdict {
    /// The operation may proceed untouched.
    pub const ALLOW: Verdict = Verdict(0);
    /// The decision process failed to handle the operation.
    pub const ERROR: Verdict = Verdict(-1);
    /// The caller is not authorized to perform the operation.
    pub const DENIED: Verdict = Verdict(-2);
    /// The decision process has no handler for the operation.
    pub const NOT_IMPLEMENTED: Verdict = Verdict(-3);

    /// Wrap a raw code.
    pub const fn new(code: i32) -> Self {
        Verdict(code)
    }

    /// The raw code.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Returns true for the transparent verdict.
    pub fn is_allow(self) -> bool {
        self == Self::ALLOW
    }

    /// Returns true for the error verdict.
    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }

    /// Returns true for the authorization-failure verdict.
    pub fn is_denied(self) -> bool {
        self == Self::DENIED
    }

    /// The errno a host should report for this verdict, if any.
    pub fn errno(self) -> Option<i32> {
        match self {
            Self::ERROR => Some(libc::EIO),
            Self::DENIED => Some(libc::EPERM),
            _ => None,
        }
    }

    /// The host-facing error for this verdict, if any.
    pub fn to_io_error(self) -> Option<io::Error> {
        self.errno().map(io::Error::from_raw_os_error)
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Self::ALLOW
    }
}

impl From<i32> for Verdict {
    fn from(code: i32) -> Self {
        Verdict(code)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
