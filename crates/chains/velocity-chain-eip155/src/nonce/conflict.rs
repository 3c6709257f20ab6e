//! Recognizing nonce conflicts in arbitrarily nested errors.
//!
//! Nodes report rejected transactions in many shapes: a bare code, a message,
//! or the real cause buried under `error`, `info`, or `cause`. Anything that
//! implements [`ErrorNode`] can be inspected by a [`NonceConflictClassifier`],
//! which searches the whole error graph for a known nonce-conflict code or
//! message fragment.
//!
//! The search terminates on cyclic graphs and on graphs deeper than the
//! configured depth.

use alloy_transport::TransportError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

/// An error that exposes the fields used to recognize nonce conflicts.
pub trait ErrorNode {
    /// Machine-readable error code, e.g. `NONCE_EXPIRED`.
    fn code(&self) -> Option<Cow<'_, str>> {
        None
    }

    fn short_message(&self) -> Option<Cow<'_, str>> {
        None
    }

    fn message(&self) -> Option<Cow<'_, str>> {
        None
    }

    /// Errors wrapped by this one, in the order they should be inspected.
    fn nested(&self) -> Vec<&dyn ErrorNode> {
        Vec::new()
    }

    /// Concrete type name. Together with the address it identifies a node.
    #[doc(hidden)]
    fn node_kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A structured error as reported by a node or a client library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Box<ErrorDetail>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Box<ErrorDetail>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorDetail>>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_short_message(mut self, short_message: impl Into<String>) -> Self {
        self.short_message = Some(short_message.into());
        self
    }

    pub fn with_error(mut self, error: ErrorDetail) -> Self {
        self.error = Some(Box::new(error));
        self
    }

    pub fn with_info(mut self, info: ErrorDetail) -> Self {
        self.info = Some(Box::new(info));
        self
    }

    pub fn with_cause(mut self, cause: ErrorDetail) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .short_message
            .as_deref()
            .or(self.message.as_deref())
            .or(self.code.as_deref())
            .unwrap_or("unknown error");
        f.write_str(text)
    }
}

impl std::error::Error for ErrorDetail {}

impl ErrorNode for ErrorDetail {
    fn code(&self) -> Option<Cow<'_, str>> {
        self.code.as_deref().map(Cow::Borrowed)
    }

    fn short_message(&self) -> Option<Cow<'_, str>> {
        self.short_message.as_deref().map(Cow::Borrowed)
    }

    fn message(&self) -> Option<Cow<'_, str>> {
        self.message.as_deref().map(Cow::Borrowed)
    }

    fn nested(&self) -> Vec<&dyn ErrorNode> {
        [&self.error, &self.info, &self.cause]
            .into_iter()
            .flatten()
            .map(|nested| &**nested as &dyn ErrorNode)
            .collect()
    }
}

/// Raw JSON error objects, e.g. the `error` member of a JSON-RPC response.
///
/// Only objects carry fields; any other JSON value is an opaque leaf.
impl ErrorNode for serde_json::Value {
    fn code(&self) -> Option<Cow<'_, str>> {
        match self.get("code")? {
            serde_json::Value::String(code) => Some(Cow::Borrowed(code)),
            serde_json::Value::Number(code) => Some(Cow::Owned(code.to_string())),
            _ => None,
        }
    }

    fn short_message(&self) -> Option<Cow<'_, str>> {
        self.get("shortMessage")?.as_str().map(Cow::Borrowed)
    }

    fn message(&self) -> Option<Cow<'_, str>> {
        self.get("message")?.as_str().map(Cow::Borrowed)
    }

    fn nested(&self) -> Vec<&dyn ErrorNode> {
        ["error", "info", "cause"]
            .into_iter()
            .filter_map(|field| self.get(field))
            .filter(|nested| nested.is_object())
            .map(|nested| nested as &dyn ErrorNode)
            .collect()
    }
}

/// Errors returned by alloy transports and providers.
///
/// JSON-RPC error responses expose their numeric code, message, and raw
/// `data`; every other failure is inspected through its display text.
impl ErrorNode for TransportError {
    fn code(&self) -> Option<Cow<'_, str>> {
        self.as_error_resp()
            .map(|payload| Cow::Owned(payload.code.to_string()))
    }

    fn short_message(&self) -> Option<Cow<'_, str>> {
        let data = self.as_error_resp()?.data.as_ref()?;
        Some(Cow::Borrowed(data.get()))
    }

    fn message(&self) -> Option<Cow<'_, str>> {
        match self.as_error_resp() {
            Some(payload) => Some(Cow::Borrowed(payload.message.as_ref())),
            None => Some(Cow::Owned(self.to_string())),
        }
    }
}

/// Which codes and message fragments mark a nonce conflict.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NonceConflictConfig {
    /// Error codes matched exactly.
    pub codes: Vec<String>,
    /// Regular expressions matched case-insensitively against
    /// `"<short message> <message>"`.
    pub patterns: Vec<String>,
    /// Maximum nesting depth inspected below the top-level error.
    pub max_depth: usize,
}

impl Default for NonceConflictConfig {
    fn default() -> Self {
        Self {
            codes: DEFAULT_CODES.iter().map(|code| code.to_string()).collect(),
            patterns: DEFAULT_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

const DEFAULT_CODES: &[&str] = &["NONCE_EXPIRED", "REPLACEMENT_UNDERPRICED", "NONCE_TOO_LOW"];
const DEFAULT_PATTERNS: &[&str] = &[
    "nonce",
    "already been used",
    "replacement fee too low",
    "transaction underpriced",
];
const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum NonceConflictConfigError {
    #[error("Invalid nonce conflict pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Decides whether an error means "the nonce we used is stale".
#[derive(Debug, Clone)]
pub struct NonceConflictClassifier {
    codes: HashSet<String>,
    pattern: Option<Regex>,
    max_depth: usize,
}

impl NonceConflictClassifier {
    /// Whether `error`, or anything nested inside it, is a nonce conflict.
    pub fn is_nonce_conflict(&self, error: &dyn ErrorNode) -> bool {
        let mut visited: HashSet<(usize, &'static str)> = HashSet::new();
        let mut pending = vec![(error, 0usize)];
        while let Some((node, depth)) = pending.pop() {
            if depth > self.max_depth || !visited.insert(node_identity(node)) {
                continue;
            }
            if self.matches(node) {
                return true;
            }
            // Reversed so the first nested field is inspected first.
            pending.extend(node.nested().into_iter().rev().map(|n| (n, depth + 1)));
        }
        false
    }

    fn matches(&self, node: &dyn ErrorNode) -> bool {
        if let Some(code) = node.code() {
            if self.codes.contains(code.as_ref()) {
                return true;
            }
        }
        let Some(pattern) = &self.pattern else {
            return false;
        };
        let text = format!(
            "{} {}",
            node.short_message().unwrap_or_default(),
            node.message().unwrap_or_default()
        );
        pattern.is_match(&text)
    }
}

fn node_identity(node: &dyn ErrorNode) -> (usize, &'static str) {
    let address = std::ptr::from_ref(node).cast::<()>() as usize;
    (address, node.node_kind())
}

impl TryFrom<&NonceConflictConfig> for NonceConflictClassifier {
    type Error = NonceConflictConfigError;

    fn try_from(config: &NonceConflictConfig) -> Result<Self, Self::Error> {
        let pattern = if config.patterns.is_empty() {
            None
        } else {
            let alternation = config
                .patterns
                .iter()
                .map(|pattern| format!("(?:{pattern})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                RegexBuilder::new(&alternation)
                    .case_insensitive(true)
                    .build()?,
            )
        };
        Ok(Self {
            codes: config.codes.iter().cloned().collect(),
            pattern,
            max_depth: config.max_depth,
        })
    }
}

impl Default for NonceConflictClassifier {
    fn default() -> Self {
        Self::try_from(&NonceConflictConfig::default())
            .expect("default nonce conflict patterns are valid regular expressions")
    }
}
