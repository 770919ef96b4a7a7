//! Policy handlers that turn requests into verdicts.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use vfsx::{OpKind, ParsedMessage, Verdict};

/// Trait for policy handlers that judge bridge requests.
///
/// Handlers are called for every request of every connection and must be
/// fast and non-blocking.
pub trait PolicyHandler: Send + Sync {
    /// Judge one operation on one path.
    ///
    /// `path` is the share root joined with the operation's path, or the root
    /// itself for `connect`/`disconnect`.
    fn check(&self, path: &str, operation: OpKind) -> Verdict;
}

impl PolicyHandler for Arc<dyn PolicyHandler> {
    fn check(&self, path: &str, operation: OpKind) -> Verdict {
        (**self).check(path, operation)
    }
}

/// Allows every operation.
#[derive(Clone, Debug, Default)]
pub struct AllowAllPolicy;

impl PolicyHandler for AllowAllPolicy {
    fn check(&self, _path: &str, _operation: OpKind) -> Verdict {
        Verdict::ALLOW
    }
}

/// Denies every operation.
#[derive(Clone, Debug, Default)]
pub struct DenyAllPolicy;

impl PolicyHandler for DenyAllPolicy {
    fn check(&self, _path: &str, _operation: OpKind) -> Verdict {
        Verdict::DENIED
    }
}

/// Evaluate a parsed request against a handler.
///
/// Unknown operations get [`Verdict::NOT_IMPLEMENTED`]. A rename is allowed
/// only if both its source and destination are; any other verdict for either
/// path is returned as is. Paths climbing above the share root are denied
/// without consulting the handler.
pub fn evaluate(handler: &dyn PolicyHandler, request: &ParsedMessage) -> Verdict {
    let Some(kind) = request.kind() else {
        return Verdict::NOT_IMPLEMENTED;
    };

    match kind {
        OpKind::Connect | OpKind::Disconnect => handler.check(&request.root_path, kind),
        OpKind::Rename => {
            let from = request.args.first().map_or("", String::as_str);
            let to = request.args.get(1).map_or("", String::as_str);
            let verdict = check_path(handler, &request.root_path, from, kind);
            if !verdict.is_allow() {
                return verdict;
            }
            check_path(handler, &request.root_path, to, kind)
        }
        _ => check_path(
            handler,
            &request.root_path,
            request.primary_path().unwrap_or(""),
            kind,
        ),
    }
}

fn check_path(handler: &dyn PolicyHandler, root: &str, path: &str, kind: OpKind) -> Verdict {
    match join_path(root, path) {
        Some(joined) => handler.check(&joined, kind),
        None => {
            tracing::warn!(root, path, operation = %kind, "path escapes the share root");
            Verdict::DENIED
        }
    }
}

/// Join a share root and a share-relative path, resolving `.` and `..`
/// lexically.
///
/// Returns `None` if the path climbs above the root. The root is treated as
/// absolute and a leading `/` on the path is ignored.
pub fn join_path(root: &str, path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(root).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    let base = parts.len();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir if parts.len() > base => {
                parts.pop();
            }
            Component::ParentDir => return None,
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    let mut joined = PathBuf::from("/");
    joined.extend(parts);
    Some(joined.to_string_lossy().into_owned())
}

fn read_ops() -> Vec<OpKind> {
    OpKind::ALL.into_iter().filter(OpKind::is_read_only).collect()
}

fn write_ops() -> Vec<OpKind> {
    OpKind::ALL.into_iter().filter(OpKind::is_write).collect()
}

/// A rule in a policy.
#[derive(Clone, Debug)]
struct PolicyRule {
    pattern: glob::Pattern,
    /// Operations this rule applies to (None = all operations)
    operations: Option<Vec<OpKind>>,
    allow: bool,
}

impl PolicyRule {
    fn matches(&self, path: &str, operation: OpKind) -> bool {
        if !self.pattern.matches(path) {
            return false;
        }
        match &self.operations {
            Some(ops) => ops.contains(&operation),
            None => true,
        }
    }
}

/// A configurable policy built from glob rules.
///
/// Rules are evaluated in order; the first matching rule decides. If no rule
/// matches, the default verdict applies (deny unless built otherwise).
#[derive(Clone, Debug)]
pub struct Policy {
    rules: Vec<PolicyRule>,
    default_verdict: Verdict,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_verdict: Verdict::DENIED,
        }
    }
}

impl Policy {
    /// Create an empty deny-by-default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules in the policy.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the policy has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The verdict used when no rule matches.
    pub fn default_verdict(&self) -> Verdict {
        self.default_verdict
    }
}

impl PolicyHandler for Policy {
    fn check(&self, path: &str, operation: OpKind) -> Verdict {
        for rule in &self.rules {
            if rule.matches(path, operation) {
                let verdict = if rule.allow {
                    Verdict::ALLOW
                } else {
                    Verdict::DENIED
                };
                tracing::trace!(path, %operation, pattern = %rule.pattern, %verdict, "rule matched");
                return verdict;
            }
        }
        self.default_verdict
    }
}

/// Builder for creating policies with a fluent API.
///
/// # Example
///
/// ```rust
/// use vfsx_daemon::{PolicyBuilder, PolicyHandler};
/// use vfsx::{OpKind, Verdict};
///
/// let policy = PolicyBuilder::new()
///     .deny_write("/srv/share/readonly/**")
///     .allow_all("/srv/share/**")
///     .build();
///
/// assert_eq!(policy.check("/srv/share/a.txt", OpKind::Write), Verdict::ALLOW);
/// assert_eq!(policy.check("/srv/share/readonly/a.txt", OpKind::Unlink), Verdict::DENIED);
/// ```
///
/// Invalid glob patterns are skipped.
#[derive(Clone, Debug, Default)]
pub struct PolicyBuilder {
    rules: Vec<PolicyRule>,
    default_allow: bool,
}

impl PolicyBuilder {
    /// Create a new policy builder with deny-by-default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new policy builder with allow-by-default.
    pub fn allow_by_default() -> Self {
        Self {
            rules: Vec::new(),
            default_allow: true,
        }
    }

    /// Allow read operations matching the pattern.
    ///
    /// A pattern ending in `/**` also covers the base directory itself, so
    /// `/srv/share/**` allows `connect` on `/srv/share`.
    pub fn allow_read(self, pattern: &str) -> Self {
        self.push_with_base(pattern, Some(read_ops()), true)
    }

    /// Allow write operations matching the pattern.
    ///
    /// Like [`allow_read`](Self::allow_read), `/**` also covers the base.
    pub fn allow_write(self, pattern: &str) -> Self {
        self.push_with_base(pattern, Some(write_ops()), true)
    }

    /// Allow all operations matching the pattern.
    pub fn allow_all(self, pattern: &str) -> Self {
        self.push_with_base(pattern, None, true)
    }

    /// Deny read operations matching the pattern.
    pub fn deny_read(self, pattern: &str) -> Self {
        self.push(pattern, Some(read_ops()), false)
    }

    /// Deny write operations matching the pattern.
    pub fn deny_write(self, pattern: &str) -> Self {
        self.push(pattern, Some(write_ops()), false)
    }

    /// Deny all operations matching the pattern.
    pub fn deny_all(self, pattern: &str) -> Self {
        self.push(pattern, None, false)
    }

    /// Build the policy.
    pub fn build(self) -> Policy {
        Policy {
            rules: self.rules,
            default_verdict: if self.default_allow {
                Verdict::ALLOW
            } else {
                Verdict::DENIED
            },
        }
    }

    fn push_with_base(self, pattern: &str, operations: Option<Vec<OpKind>>, allow: bool) -> Self {
        match pattern.strip_suffix("/**") {
            Some(base) if !base.is_empty() => self
                .push(base, operations.clone(), allow)
                .push(pattern, operations, allow),
            _ => self.push(pattern, operations, allow),
        }
    }

    fn push(mut self, pattern: &str, operations: Option<Vec<OpKind>>, allow: bool) -> Self {
        match glob::Pattern::new(pattern) {
            Ok(pattern) => self.rules.push(PolicyRule {
                pattern,
                operations,
                allow,
            }),
            Err(err) => tracing::warn!(pattern, error = %err, "skipping invalid pattern"),
        }
        self
    }
}
