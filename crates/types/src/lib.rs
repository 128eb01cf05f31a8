//! Serialized vocabulary shared by the apiflows engine and snapshot files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wildcard marker written in place of values that vary between equivalent runs.
pub const ANY: &str = "ANY";

/// HTTP methods handled by the stub layer, lower-cased as stored in points and stub keys.
pub const HTTP_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

/// Method written on message-queue points.
pub const METHOD_MQ: &str = "mq";

pub fn is_http_method(method: &str) -> bool {
    HTTP_METHODS.contains(&method)
}

/// Keys of the raw point mapping as written to snapshot files.
pub mod keys {
    pub const POINT: &str = "_point";
    pub const CONTEXT: &str = "_context";
    pub const SERVICE: &str = "_service";
    pub const META: &str = "_meta";
    pub const DATA: &str = "data";
    pub const METHOD: &str = "method";
    pub const HEADERS: &str = "headers";
    pub const PATH: &str = "path";
    pub const PATTERN: &str = "pattern";
    pub const PARAMS: &str = "params";
    pub const STATUS: &str = "status";
    pub const CONTENT: &str = "content";
    pub const RESPONSE_HEADERS: &str = "response_headers";
    pub const ROUTING_KEY: &str = "routing_key";
    pub const EXCHANGE: &str = "exchange";
    pub const ALIAS: &str = "alias";
    pub const PROMPT: &str = "prompt";
    pub const HASH: &str = "hash";
}

/// Role of a point inside a workflow. Fixed per point kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Input,
    Output,
    Assert,
    Log,
    Notification,
    Process,
    Context,
    Stub,
}

impl Role {
    /// Roles whose points kick off processing of a workflow.
    pub fn is_initial(self) -> bool {
        matches!(self, Role::Input | Role::Process)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Input => "input",
            Role::Output => "output",
            Role::Assert => "assert",
            Role::Log => "log",
            Role::Notification => "notification",
            Role::Process => "process",
            Role::Context => "context",
            Role::Stub => "stub",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant key of a stub endpoint: `"<status>-<alias>"`, e.g. `200-ok` or `404-not_found_ab12`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub status: u16,
    pub alias: String,
}

impl VariantKey {
    pub fn new(status: u16, alias: impl Into<String>) -> Self {
        Self {
            status,
            alias: alias.into(),
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.status, self.alias)
    }
}

impl FromStr for VariantKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (status, alias) = value
            .split_once('-')
            .ok_or_else(|| format!("stub variant '{}' must look like '<status>-<alias>'", value))?;
        let status = status
            .trim()
            .parse::<u16>()
            .map_err(|_| format!("stub variant '{}' has a non-numeric status", value))?;
        Ok(VariantKey::new(status, alias))
    }
}

/// Endpoint key inside a service: `"<method>#<path-or-pattern>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub method: String,
    pub pattern: String,
}

impl EndpointKey {
    pub fn new(method: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            pattern: pattern.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.method, self.pattern)
    }
}

impl FromStr for EndpointKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .split_once('#')
            .map(|(method, pattern)| EndpointKey::new(method, pattern))
            .ok_or_else(|| format!("stub endpoint '{}' must look like '<method>#<path>'", value))
    }
}
