#![allow(clippy::result_large_err)]

//! Transport seam: the HTTP call site hands every outbound request to a [`ResponseSource`]
//! and gets an already-built response back.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use futures::future::{self, Ready};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use url::{form_urlencoded, Url};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Outbound request as seen by the transport layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub params: Option<Value>,
    pub data: Option<Value>,
    pub headers: IndexMap<String, String>,
}

impl OutboundRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Build a request from raw wire parts. The body is decoded as JSON first and falls back
    /// to form-urlencoded pairs; the query string becomes `params`.
    pub fn from_wire(
        method: &str,
        url: &str,
        body: Option<&str>,
        headers: IndexMap<String, String>,
    ) -> Self {
        let data = body
            .filter(|body| !body.is_empty())
            .map(|body| match serde_json::from_str::<Value>(body) {
                Ok(decoded) => decoded,
                Err(_) => normalize_query(&parse_form(body)),
            })
            .filter(|data| !is_empty_value(data));
        let params = Some(normalize_query(&parse_form(&query_of(url))))
            .filter(|params| !is_empty_value(params));
        Self {
            method: method.to_string(),
            url: url.to_string(),
            params,
            data,
            headers,
        }
    }

    pub fn method_lowercase(&self) -> String {
        self.method.to_lowercase()
    }

    /// Query-string parameters merged with explicit `params`; explicit values win.
    pub fn effective_params(&self) -> Option<Value> {
        let mut merged = match normalize_query(&parse_form(&query_of(&self.url))) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Some(Value::Object(explicit)) = &self.params {
            for (key, value) in explicit {
                merged.insert(key.clone(), value.clone());
            }
        }
        (!merged.is_empty()).then_some(Value::Object(merged))
    }

    /// Request body with JSON text decoded.
    pub fn decoded_data(&self) -> Option<Value> {
        match &self.data {
            Some(Value::String(text)) => Some(
                serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.clone())),
            ),
            other => other.clone(),
        }
    }

    pub fn is_form_encoded(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, value)| name.eq_ignore_ascii_case(CONTENT_TYPE) && value == FORM_URLENCODED)
    }
}

/// Canned response returned to the transport call site.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    status: u16,
    body: String,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn from_content(status: u16, content: &Value) -> Result<Self, AppError> {
        Ok(Self::new(status, serde_json::to_string(content)?))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn json(&self) -> Result<Value, AppError> {
        serde_json::from_str(&self.body).map_err(|e| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("Mock response body is not JSON: {}", e),
            )
        })
    }
}

/// Answers outbound calls instead of the network.
pub trait ResponseSource {
    fn respond(&mut self, request: &OutboundRequest) -> Result<MockResponse, AppError>;

    /// Async call sites get a future that is ready on first poll.
    fn respond_ready(
        &mut self,
        request: &OutboundRequest,
    ) -> Ready<Result<MockResponse, AppError>> {
        future::ready(self.respond(request))
    }
}

/// Normalize query-like mappings for comparison: integers become strings, single-element lists
/// collapse to their element, empty lists and nulls are dropped. Non-mappings pass through.
pub fn normalize_query(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let normalized = map
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Array(items) if items.is_empty() => return None,
                Value::Array(items) if items.len() == 1 => int_to_string(&items[0]),
                Value::Array(items) => Value::Array(items.iter().map(stringify).collect()),
                Value::Null => return None,
                other => int_to_string(other),
            };
            Some((key.clone(), value))
        })
        .collect();
    Value::Object(normalized)
}

fn int_to_string(value: &Value) -> Value {
    match value {
        Value::Number(number) if number.is_i64() || number.is_u64() => {
            Value::String(number.to_string())
        }
        other => other.clone(),
    }
}

fn stringify(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

/// Parse `a=1&a=2&b=3` into `{"a": ["1", "2"], "b": ["3"]}`, keeping first-seen key order.
fn parse_form(input: &str) -> Value {
    let mut pairs: IndexMap<String, Vec<Value>> = IndexMap::new();
    for (key, value) in form_urlencoded::parse(input.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        pairs
            .entry(key.into_owned())
            .or_default()
            .push(Value::String(value.into_owned()));
    }
    Value::Object(
        pairs
            .into_iter()
            .map(|(key, values)| (key, Value::Array(values)))
            .collect(),
    )
}

fn query_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.query().unwrap_or_default().to_string(),
        Err(_) => url
            .split_once('?')
            .map(|(_, query)| query.split('#').next().unwrap_or_default().to_string())
            .unwrap_or_default(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_query_collapses_lists_and_stringifies_ints() {
        let normalized = normalize_query(&json!({
            "page": [2],
            "tags": ["a", "b"],
            "empty": [],
            "limit": 10,
            "gone": null,
            "name": "x"
        }));
        assert_eq!(
            normalized,
            json!({"page": "2", "tags": ["a", "b"], "limit": "10", "name": "x"})
        );
    }

    #[test]
    fn from_wire_decodes_json_body_and_query() {
        let request = OutboundRequest::from_wire(
            "POST",
            "https://api.github.com/repos?page=2&sort=asc",
            Some(r#"{"title": "bug"}"#),
            IndexMap::new(),
        );
        assert_eq!(request.data, Some(json!({"title": "bug"})));
        assert_eq!(request.params, Some(json!({"page": "2", "sort": "asc"})));
    }

    #[test]
    fn from_wire_decodes_form_body() {
        let request = OutboundRequest::from_wire(
            "post",
            "https://ipinfo.io/batch",
            Some("ip=1.1.1.1&ip=8.8.8.8&token=t"),
            IndexMap::new(),
        );
        assert_eq!(
            request.data,
            Some(json!({"ip": ["1.1.1.1", "8.8.8.8"], "token": "t"}))
        );
        assert_eq!(request.params, None);
    }

    #[test]
    fn explicit_params_override_query() {
        let request = OutboundRequest::new("get", "https://api.github.com/search?q=rust&page=1")
            .with_params(json!({"page": "3"}));
        assert_eq!(
            request.effective_params(),
            Some(json!({"q": "rust", "page": "3"}))
        );
    }

    #[test]
    fn decoded_data_parses_json_text() {
        let request = OutboundRequest::new("post", "/").with_data(json!("{\"a\": 1}"));
        assert_eq!(request.decoded_data(), Some(json!({"a": 1})));
        let request = OutboundRequest::new("post", "/").with_data(json!("plain"));
        assert_eq!(request.decoded_data(), Some(json!("plain")));
    }

    #[test]
    fn respond_ready_resolves_immediately() {
        struct Fixed;
        impl ResponseSource for Fixed {
            fn respond(&mut self, _: &OutboundRequest) -> Result<MockResponse, AppError> {
                MockResponse::from_content(201, &json!({"id": 1}))
            }
        }
        let response = tokio_test::block_on(Fixed.respond_ready(&OutboundRequest::new("get", "/")))
            .unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(response.json().unwrap(), json!({"id": 1}));
    }
}
