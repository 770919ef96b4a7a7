//! The bridge client: encode, exchange, decide.
//!
//! ## Fail-open
//!
//! When the decision process cannot be reached, or the exchange fails
//! midway, the bridge answers [`Decision::Proceed`]. A gate is therefore
//! only as strong as the availability of the process behind the socket:
//! stopping that process, or breaking the socket, silently turns every
//! check into an allow. Hosts that need enforcement must supervise the
//! decision process themselves.

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::diagnostics::DiagnosticLog;
use crate::error::ConfigError;
use crate::operation::OperationDescriptor;
use crate::verdict::Verdict;
use crate::wire;

/// When the decision process is consulted relative to the real operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ask first; run the operation only if it is not denied
    #[default]
    Gate,
    /// Run the operation, then report it
    Audit,
}

impl Mode {
    /// The mode name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Gate => "gate",
            Mode::Audit => "audit",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gate" => Ok(Mode::Gate),
            "audit" => Ok(Mode::Audit),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

/// Whether a gated operation may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Run the operation
    Proceed,
    /// Fail the operation with a permission error
    Deny,
}

impl Decision {
    /// Returns true if the operation may run.
    pub fn is_proceed(&self) -> bool {
        matches!(self, Decision::Proceed)
    }
}

/// What one interception produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// What the call-site should do
    pub decision: Decision,
    /// The decoded reply, or `None` if the decision process was unreachable
    pub verdict: Option<Verdict>,
}

impl Outcome {
    /// The host-facing error a call-site should raise for this outcome.
    ///
    /// Only a deny blocks an operation; an error verdict still proceeds and
    /// is reported through [`Bridge::last_errno`].
    pub fn denial(&self) -> Option<io::Error> {
        match self.decision {
            Decision::Deny => Some(io::Error::from_raw_os_error(libc::EPERM)),
            Decision::Proceed => None,
        }
    }
}

/// Map a verdict to a decision.
///
/// Only [`Verdict::DENIED`] denies. Error and informational codes proceed.
pub fn decide(verdict: Verdict) -> Decision {
    if verdict.is_denied() {
        Decision::Deny
    } else {
        Decision::Proceed
    }
}

/// One bridge instance with its own connection.
///
/// Calls are strictly sequential; the bridge holds no locks and is meant to
/// be owned by a single worker.
#[derive(Debug)]
pub struct Bridge {
    mode: Mode,
    connection: ConnectionManager,
    diagnostics: Option<DiagnosticLog>,
    last_errno: Option<i32>,
}

impl Bridge {
    /// Create a disconnected bridge from configuration.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            mode: config.mode,
            connection: ConnectionManager::new(&config.socket_path),
            diagnostics: config.diagnostic_log.as_ref().map(DiagnosticLog::new),
            last_errno: None,
        }
    }

    /// Create a bridge from defaults plus `VFSX_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = BridgeConfig::default().with_env_overrides()?;
        Ok(Self::new(&config))
    }

    /// The fixed mode of this bridge.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current state of the connection.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The decision process socket path.
    pub fn socket_path(&self) -> &Path {
        self.connection.socket_path()
    }

    /// The errno raised by the last reply, if it carried one.
    ///
    /// `EIO` after an error verdict, `EPERM` after a deny.
    pub fn last_errno(&self) -> Option<i32> {
        self.last_errno
    }

    /// Forward one operation to the decision process and decide on it.
    ///
    /// Never fails: an unreachable decision process yields
    /// [`Decision::Proceed`]. A `disconnect` operation always leaves the
    /// bridge disconnected once its message has been exchanged.
    pub fn intercept(&mut self, descriptor: &OperationDescriptor) -> Outcome {
        let message = wire::encode(descriptor);
        if message.is_truncated() {
            tracing::debug!(
                operation = %descriptor.kind(),
                len = message.len(),
                "message truncated to frame size"
            );
        }
        if let Some(log) = &self.diagnostics {
            log.record(&message);
        }

        let verdict = match self.connection.send_and_receive(&message) {
            Ok(verdict) => Some(verdict),
            Err(err) => {
                tracing::debug!(
                    operation = %descriptor.kind(),
                    error = %err,
                    "decision process unavailable, proceeding"
                );
                None
            }
        };

        if descriptor.kind().closes_connection() {
            self.connection.close_connection();
        }

        self.last_errno = verdict.and_then(Verdict::errno);
        let decision = match verdict {
            Some(verdict) => {
                if verdict.is_error() {
                    tracing::warn!(message = %message, "decision process reported an error");
                } else if !verdict.is_allow() && !verdict.is_denied() {
                    tracing::debug!(message = %message, verdict = %verdict, "informational verdict");
                }
                decide(verdict)
            }
            None => Decision::Proceed,
        };

        tracing::debug!(
            mode = %self.mode,
            message = %message,
            decision = ?decision,
            "intercepted operation"
        );
        Outcome { decision, verdict }
    }
}
