//! Wire format shared by the bridge and the decision process.
//!
//! A request is a fixed 512-byte frame holding `op:root[:tail]` followed by
//! NUL padding. A reply is a fixed 3-byte frame holding a left-justified
//! ASCII decimal verdict.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::operation::{OpKind, OperationDescriptor};
use crate::verdict::Verdict;

/// Size of a request frame in bytes.
pub const MSG_OUT_SIZE: usize = 512;
/// Size of a reply frame in bytes.
pub const MSG_IN_SIZE: usize = 3;
/// Maximum message content; the last frame byte is always a terminator.
pub const MAX_MESSAGE_LEN: usize = MSG_OUT_SIZE - 1;

/// Errors when decoding a request frame.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WireError {
    /// The frame holds no message
    #[error("empty message")]
    Empty,
    /// The message lacks a required field
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// An encoded request, bounded to [`MAX_MESSAGE_LEN`] bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct WireMessage {
    bytes: Vec<u8>,
    truncated: bool,
}

impl WireMessage {
    /// The message content without padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The message content as text, replacing invalid UTF-8 left by truncation.
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the message has no content.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns true if content was dropped to fit the frame.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The full NUL-padded frame written to the socket.
    pub fn to_frame(&self) -> [u8; MSG_OUT_SIZE] {
        let mut frame = [0u8; MSG_OUT_SIZE];
        frame[..self.bytes.len()].copy_from_slice(&self.bytes);
        frame
    }
}

impl fmt::Debug for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireMessage")
            .field("message", &self.as_str_lossy())
            .field("truncated", &self.truncated)
            .finish()
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str_lossy())
    }
}

/// Encode a descriptor into a request message.
///
/// Fields are not escaped, so a path containing `:` or `,` yields an
/// ambiguous message. Content past an embedded NUL or past
/// [`MAX_MESSAGE_LEN`] bytes is dropped.
pub fn encode(descriptor: &OperationDescriptor) -> WireMessage {
    let mut text = format!("{}:{}", descriptor.name(), descriptor.root_path());
    if let Some(path) = descriptor.primary_path() {
        text.push(':');
        text.push_str(path);
        for arg in descriptor.extra_args() {
            text.push(',');
            text.push_str(&arg.to_string());
        }
    }

    let mut bytes = text.into_bytes();
    let mut truncated = false;
    if let Some(nul) = bytes.iter().position(|&b| b == 0) {
        bytes.truncate(nul);
        truncated = true;
    }
    if bytes.len() > MAX_MESSAGE_LEN {
        bytes.truncate(MAX_MESSAGE_LEN);
        truncated = true;
    }

    WireMessage { bytes, truncated }
}

/// Decode a reply frame into a verdict.
///
/// Parsing is permissive: optional leading whitespace and sign, then digits
/// up to the first non-digit. Anything unparseable decodes to `0`.
pub fn decode_reply(reply: &[u8]) -> Verdict {
    let reply = &reply[..reply.len().min(MSG_IN_SIZE)];
    let mut bytes = reply
        .iter()
        .copied()
        .take_while(|&b| b != 0)
        .skip_while(u8::is_ascii_whitespace)
        .peekable();

    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };

    let magnitude = bytes
        .take_while(u8::is_ascii_digit)
        .fold(0i32, |acc, d| acc.saturating_mul(10).saturating_add(i32::from(d - b'0')));

    Verdict::new(if negative { -magnitude } else { magnitude })
}

/// Encode a verdict into a reply frame.
///
/// Codes wider than three characters are cut to fit.
pub fn encode_reply(verdict: Verdict) -> [u8; MSG_IN_SIZE] {
    let mut frame = [0u8; MSG_IN_SIZE];
    let text = verdict.to_string();
    let len = text.len().min(MSG_IN_SIZE);
    frame[..len].copy_from_slice(&text.as_bytes()[..len]);
    frame
}

/// A request message as seen by the decision process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Operation name, possibly unknown to this crate
    pub operation: String,
    /// Share root the operation runs under
    pub root_path: String,
    /// Tail fields split on `,`
    pub args: Vec<String>,
}

impl ParsedMessage {
    /// The operation kind, if the name is known.
    pub fn kind(&self) -> Option<OpKind> {
        OpKind::from_name(&self.operation)
    }

    /// The first tail field.
    pub fn primary_path(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Parse a request frame (or bare message) into its fields.
///
/// The frame is split on `:` into at most three fields, so a tail may carry
/// further colons but a root path may not.
pub fn parse_message(frame: &[u8]) -> Result<ParsedMessage, WireError> {
    let end = frame.iter().position(|&b| b == 0).unwrap_or(frame.len());
    let text = String::from_utf8_lossy(&frame[..end]);
    if text.is_empty() {
        return Err(WireError::Empty);
    }

    let mut fields = text.splitn(3, ':');
    let operation = fields.next().unwrap_or_default();
    if operation.is_empty() {
        return Err(WireError::Malformed("missing operation".to_string()));
    }
    let Some(root_path) = fields.next() else {
        return Err(WireError::Malformed(format!(
            "missing root path in '{}'",
            text
        )));
    };
    let args = match fields.next() {
        Some(tail) if !tail.is_empty() => tail.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    Ok(ParsedMessage {
        operation: operation.to_string(),
        root_path: root_path.to_string(),
        args,
    })
}
