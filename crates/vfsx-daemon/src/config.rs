//! JSON policy files.
//!
//! ```json
//! {
//!   "default": "deny",
//!   "rules": [
//!     { "action": "deny",  "access": "write", "pattern": "/srv/share/readonly/**" },
//!     { "action": "allow", "access": "all",   "pattern": "/srv/share/**" }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{Policy, PolicyBuilder};

/// Errors loading a policy file.
#[derive(Debug, Error)]
pub enum PolicyFileError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// File is not a valid policy document
    #[error("invalid policy: {0}")]
    Json(#[from] serde_json::Error),
    /// A rule carries a pattern glob can't compile
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        /// The offending pattern
        pattern: String,
        /// Underlying error
        #[source]
        source: glob::PatternError,
    },
}

/// Whether a rule allows or denies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Let matching operations through
    Allow,
    /// Fail matching operations with a deny verdict
    #[default]
    Deny,
}

/// Which operations a rule covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    /// connect, disconnect, opendir, open, close, read, pread, lseek
    Read,
    /// mkdir, rmdir, create, write, pwrite, rename, unlink
    Write,
    /// Every operation
    #[default]
    All,
}

/// One rule of a policy file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Allow or deny
    pub action: Action,
    /// Operation group, all by default
    #[serde(default)]
    pub access: Access,
    /// Glob over `<root>/<path>`
    pub pattern: String,
}

/// A policy as stored on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyFile {
    /// Verdict when no rule matches
    pub default: Action,
    /// Rules in evaluation order
    pub rules: Vec<RuleSpec>,
}

impl PolicyFile {
    /// Parse a policy document.
    pub fn from_json(json: &str) -> Result<Self, PolicyFileError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyFileError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Compile into a [`Policy`], rejecting invalid patterns.
    pub fn into_policy(self) -> Result<Policy, PolicyFileError> {
        let mut builder = match self.default {
            Action::Allow => PolicyBuilder::allow_by_default(),
            Action::Deny => PolicyBuilder::new(),
        };
        for rule in self.rules {
            if let Err(source) = glob::Pattern::new(&rule.pattern) {
                return Err(PolicyFileError::Pattern {
                    pattern: rule.pattern,
                    source,
                });
            }
            let pattern = rule.pattern.as_str();
            builder = match (rule.action, rule.access) {
                (Action::Allow, Access::Read) => builder.allow_read(pattern),
                (Action::Allow, Access::Write) => builder.allow_write(pattern),
                (Action::Allow, Access::All) => builder.allow_all(pattern),
                (Action::Deny, Access::Read) => builder.deny_read(pattern),
                (Action::Deny, Access::Write) => builder.deny_write(pattern),
                (Action::Deny, Access::All) => builder.deny_all(pattern),
            };
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::policy::PolicyHandler;
    use vfsx::{OpKind, Verdict};

    #[test]
    fn test_policy_file_rules() {
        let file = PolicyFile::from_json(
            r#"{
                "default": "deny",
                "rules": [
                    { "action": "deny", "access": "write", "pattern": "/srv/share/ro/**" },
                    { "action": "allow", "pattern": "/srv/share/**" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(file.rules[1].access, Access::All);

        let policy = file.into_policy().unwrap();
        assert_eq!(policy.check("/srv/share/ro/a", OpKind::Unlink), Verdict::DENIED);
        assert_eq!(policy.check("/srv/share/ro/a", OpKind::Read), Verdict::ALLOW);
        assert_eq!(policy.check("/srv/share/b", OpKind::Write), Verdict::ALLOW);
        assert_eq!(policy.check("/etc/passwd", OpKind::Read), Verdict::DENIED);
    }

    #[test]
    fn test_empty_document_denies() {
        let policy = PolicyFile::from_json("{}").unwrap().into_policy().unwrap();
        assert!(policy.is_empty());
        assert_eq!(policy.default_verdict(), Verdict::DENIED);
    }

    #[test]
    fn test_allow_default() {
        let policy = PolicyFile::from_json(r#"{"default":"allow"}"#)
            .unwrap()
            .into_policy()
            .unwrap();
        assert_eq!(policy.check("/x", OpKind::Unlink), Verdict::ALLOW);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = PolicyFile::from_json(r#"{"rules":[{"action":"allow","pattern":"/a/["}]}"#)
            .unwrap()
            .into_policy()
            .unwrap_err();
        assert!(matches!(err, PolicyFileError::Pattern { pattern, .. } if pattern == "/a/["));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"default":"allow","rules":[]}"#).unwrap();
        assert_eq!(PolicyFile::load(&path).unwrap().default, Action::Allow);

        let err = PolicyFile::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, PolicyFileError::Io(_)));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PolicyFile::load(&path).unwrap_err(),
            PolicyFileError::Json(_)
        ));
    }
}
