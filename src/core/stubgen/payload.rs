#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use indexmap::IndexMap;
use serde_json::Value;

/// Supplies an example response body for an endpoint missing from the stub file.
pub trait PayloadSource {
    fn payload(&mut self, method: &str, url: &str) -> Result<Option<Value>, AppError>;
}

/// Never has a payload, so unknown endpoints fail and the stub file must be extended.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPayload;

impl PayloadSource for NoPayload {
    fn payload(&mut self, _method: &str, _url: &str) -> Result<Option<Value>, AppError> {
        Ok(None)
    }
}

/// Fixed payloads keyed by `"<METHOD> <url>"`.
#[derive(Debug, Default, Clone)]
pub struct StaticPayloads {
    payloads: IndexMap<String, Value>,
}

impl StaticPayloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, method: &str, url: &str, payload: Value) -> Self {
        self.payloads.insert(key(method, url), payload);
        self
    }
}

impl PayloadSource for StaticPayloads {
    fn payload(&mut self, method: &str, url: &str) -> Result<Option<Value>, AppError> {
        Ok(self.payloads.get(&key(method, url)).cloned())
    }
}

fn key(method: &str, url: &str) -> String {
    format!("{} {}", method.to_uppercase(), url)
}

/// Prompt text asking for a response example, used when no payload is available.
pub fn payload_prompt(method: &str, url: &str) -> String {
    format!(
        "Suggest response for http request: [{}] {}",
        method.to_uppercase(),
        url
    )
}
