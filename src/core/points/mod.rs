#![allow(clippy::result_large_err)] // Point conversion returns AppError so snapshot defects keep their structured context.

//! Typed workflow points.
//!
//! A point is one interaction of the application under test: the inbound API call that
//! starts a workflow, outbound calls to external services, messages, logs, asserts and
//! custom processing steps. Every kind carries only the fields that mean something for it;
//! [`Point::raw`] and [`Point::from_raw`] convert to and from the mapping written in
//! snapshot files.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use apiflows_types::{is_http_method, keys, Role, ANY, METHOD_MQ};
use serde_json::{Map, Value};

/// Serialized mapping view of a point as stored in pipelines and snapshot files.
pub type RawPoint = Map<String, Value>;

/// Request and response fields shared by inbound and outbound HTTP points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpFields {
    pub method: String,
    pub path: String,
    /// Path template the literal path was matched against, once known.
    pub pattern: Option<String>,
    pub params: Option<Value>,
    pub data: Option<Value>,
    pub headers: Option<Value>,
    pub response_status: Option<u16>,
    pub response_content: Option<Value>,
    pub response_headers: Option<Value>,
}

impl HttpFields {
    fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_lowercase(),
            path: path.to_string(),
            ..Default::default()
        }
    }
}

/// Inbound API call that kicks off a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiPoint {
    pub http: HttpFields,
}

impl ApiPoint {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            http: HttpFields::new(method, path),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.http.data = Some(data);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.http.params = Some(params);
        self
    }

    pub fn with_headers(mut self, headers: Value) -> Self {
        self.http.headers = Some(headers);
        self
    }

    pub fn with_response(mut self, status: u16, content: Value) -> Self {
        self.http.response_status = Some(status);
        self.http.response_content = Some(content);
        self
    }
}

/// Outbound call to an external service, answered from stub data.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalApiPoint {
    pub service: String,
    pub http: HttpFields,
    pub called: bool,
}

impl ExternalApiPoint {
    pub fn new(service: &str, method: &str, path: &str) -> Self {
        Self {
            service: service.to_string(),
            http: HttpFields::new(method, path),
            called: false,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.http.data = Some(data);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.http.params = Some(params);
        self
    }

    pub fn with_headers(mut self, headers: Value) -> Self {
        self.http.headers = Some(headers);
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.http.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_response(mut self, status: u16, content: Value) -> Self {
        self.http.response_status = Some(status);
        self.http.response_content = Some(content);
        self
    }
}

/// Message consumed from or published to a broker.
#[derive(Debug, Clone, PartialEq)]
pub struct MqPoint {
    pub data: Option<Value>,
    pub exchange: Option<String>,
    pub routing_key: Option<String>,
    pub headers: Option<Value>,
    pub called: bool,
}

impl MqPoint {
    pub fn new(data: Value) -> Self {
        Self {
            data: Some(data),
            exchange: None,
            routing_key: None,
            headers: None,
            called: false,
        }
    }

    pub fn with_route(mut self, exchange: &str, routing_key: &str) -> Self {
        self.exchange = Some(exchange.to_string());
        self.routing_key = Some(routing_key.to_string());
        self
    }

    /// Inbound messages are addressed as `exchange/routing_key`.
    fn inbound_path(&self) -> String {
        format!(
            "{}/{}",
            self.exchange.as_deref().unwrap_or_default(),
            self.routing_key.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogPoint {
    /// Level and logger, e.g. `DEBUG:charset_normalizer`.
    pub level: String,
    pub message: String,
    /// Unformatted message template when it differs from the rendered message.
    pub pattern: Option<String>,
}

impl LogPoint {
    pub fn new(level: &str, message: &str) -> Self {
        Self {
            level: level.to_string(),
            message: message.to_string(),
            pattern: None,
        }
    }
}

/// Point addressed only by a name: asserts, context setups and custom process steps.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPoint {
    pub name: String,
}

/// A closed set of point kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Point {
    Api(ApiPoint),
    ExternalApi(ExternalApiPoint),
    InputMq(MqPoint),
    Mq(MqPoint),
    Notification { data: Value },
    Log(LogPoint),
    StubAlias { alias: String },
    Assert(NamedPoint),
    Context(NamedPoint),
    Process(NamedPoint),
}

impl From<ApiPoint> for Point {
    fn from(point: ApiPoint) -> Self {
        Point::Api(point)
    }
}

impl From<ExternalApiPoint> for Point {
    fn from(point: ExternalApiPoint) -> Self {
        Point::ExternalApi(point)
    }
}

impl From<LogPoint> for Point {
    fn from(point: LogPoint) -> Self {
        Point::Log(point)
    }
}

impl Point {
    pub fn api(method: &str, path: &str) -> Self {
        Point::Api(ApiPoint::new(method, path))
    }

    pub fn external_api(service: &str, method: &str, path: &str) -> Self {
        Point::ExternalApi(ExternalApiPoint::new(service, method, path))
    }

    pub fn input_mq(data: Value, exchange: &str, routing_key: &str) -> Self {
        Point::InputMq(MqPoint::new(data).with_route(exchange, routing_key))
    }

    pub fn mq(data: Value, exchange: &str, routing_key: &str) -> Self {
        Point::Mq(MqPoint::new(data).with_route(exchange, routing_key))
    }

    pub fn notification(data: Value) -> Self {
        Point::Notification { data }
    }

    pub fn log(level: &str, message: &str) -> Self {
        Point::Log(LogPoint::new(level, message))
    }

    pub fn stub_alias(alias: &str) -> Self {
        Point::StubAlias {
            alias: alias.to_string(),
        }
    }

    pub fn assert(name: &str) -> Self {
        Point::Assert(NamedPoint {
            name: name.to_string(),
        })
    }

    pub fn context(name: &str) -> Self {
        Point::Context(NamedPoint {
            name: name.to_string(),
        })
    }

    pub fn process(name: &str) -> Self {
        Point::Process(NamedPoint {
            name: name.to_string(),
        })
    }

    /// Kind tag written as `_point`.
    pub fn kind(&self) -> &'static str {
        match self {
            Point::Api(_) => "api",
            Point::ExternalApi(_) => "external_api",
            Point::InputMq(_) => "input_mq",
            Point::Mq(_) => "mq",
            Point::Notification { .. } => "notification",
            Point::Log(_) => "log",
            Point::StubAlias { .. } => "stub_alias",
            Point::Assert(_) => "assert",
            Point::Context(_) => "context",
            Point::Process(_) => "process",
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Point::Api(_) | Point::InputMq(_) => Role::Input,
            Point::ExternalApi(_) | Point::Mq(_) => Role::Output,
            Point::Notification { .. } => Role::Notification,
            Point::Log(_) => Role::Log,
            Point::StubAlias { .. } => Role::Stub,
            Point::Assert(_) => Role::Assert,
            Point::Context(_) => Role::Context,
            Point::Process(_) => Role::Process,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Point::Api(point) => Some(&point.http.method),
            Point::ExternalApi(point) => Some(&point.http.method),
            Point::InputMq(_) | Point::Mq(_) => Some(METHOD_MQ),
            Point::Log(point) => Some(&point.level),
            _ => None,
        }
    }

    pub fn service(&self) -> Option<&str> {
        match self {
            Point::ExternalApi(point) => Some(&point.service),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<String> {
        match self {
            Point::Api(point) => Some(point.http.path.clone()),
            Point::ExternalApi(point) => Some(point.http.path.clone()),
            Point::InputMq(point) => Some(point.inbound_path()),
            Point::Log(point) => Some(point.message.clone()),
            Point::Assert(point) | Point::Context(point) | Point::Process(point) => {
                Some(point.name.clone())
            }
            _ => None,
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        match self {
            Point::Api(point) => point.http.pattern.as_deref(),
            Point::ExternalApi(point) => point.http.pattern.as_deref(),
            Point::Log(point) => point.pattern.as_deref(),
            _ => None,
        }
    }

    pub fn http(&self) -> Option<&HttpFields> {
        match self {
            Point::Api(point) => Some(&point.http),
            Point::ExternalApi(point) => Some(&point.http),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Point::Api(point) => point.http.data.as_ref(),
            Point::ExternalApi(point) => point.http.data.as_ref(),
            Point::InputMq(point) | Point::Mq(point) => point.data.as_ref(),
            Point::Notification { data } => Some(data),
            _ => None,
        }
    }

    pub fn response_status(&self) -> Option<u16> {
        self.http().and_then(|http| http.response_status)
    }

    pub fn response_content(&self) -> Option<&Value> {
        self.http().and_then(|http| http.response_content.as_ref())
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Point::StubAlias { alias } => Some(alias),
            _ => None,
        }
    }

    pub fn called(&self) -> bool {
        match self {
            Point::ExternalApi(point) => point.called,
            Point::Mq(point) => point.called,
            _ => false,
        }
    }

    pub fn set_called(&mut self, called: bool) {
        match self {
            Point::ExternalApi(point) => point.called = called,
            Point::Mq(point) => point.called = called,
            _ => {}
        }
    }

    /// Output point answered by an HTTP stub.
    pub fn is_external_call(&self) -> bool {
        self.role() == Role::Output && self.method().map(is_http_method).unwrap_or(false)
    }

    /// Copy response fields returned by processing an initial point back onto it.
    pub fn apply_response(&mut self, response: &RawPoint) {
        let http = match self {
            Point::Api(point) => &mut point.http,
            Point::ExternalApi(point) => &mut point.http,
            _ => return,
        };
        if let Some(status) = response.get(keys::STATUS) {
            http.response_status = parse_status(status);
        }
        if let Some(content) = response.get(keys::CONTENT) {
            http.response_content = Some(content.clone());
        }
        if let Some(headers) = response.get(keys::RESPONSE_HEADERS) {
            http.response_headers = Some(headers.clone());
        }
    }

    /// Mapping view with only present, non-empty fields.
    pub fn raw(&self) -> RawPoint {
        let mut raw = RawPoint::new();
        raw.insert(keys::POINT.to_string(), Value::String(self.kind().to_string()));
        match self {
            Point::Api(point) => write_http(&mut raw, &point.http),
            Point::ExternalApi(point) => {
                put_str(&mut raw, keys::SERVICE, &point.service);
                write_http(&mut raw, &point.http);
            }
            Point::InputMq(point) => {
                put_str(&mut raw, keys::METHOD, METHOD_MQ);
                put_str(&mut raw, keys::PATH, &point.inbound_path());
                put_value(&mut raw, keys::DATA, point.data.as_ref());
                put_value(&mut raw, keys::HEADERS, point.headers.as_ref());
            }
            Point::Mq(point) => {
                put_str(&mut raw, keys::METHOD, METHOD_MQ);
                put_value(&mut raw, keys::DATA, point.data.as_ref());
                put_value(&mut raw, keys::HEADERS, point.headers.as_ref());
                if let Some(exchange) = &point.exchange {
                    put_str(&mut raw, keys::EXCHANGE, exchange);
                }
                if let Some(routing_key) = &point.routing_key {
                    put_str(&mut raw, keys::ROUTING_KEY, routing_key);
                }
            }
            Point::Notification { data } => put_value(&mut raw, keys::DATA, Some(data)),
            Point::Log(point) => {
                put_str(&mut raw, keys::METHOD, &point.level);
                put_str(&mut raw, keys::PATH, &point.message);
                if let Some(pattern) = &point.pattern {
                    put_str(&mut raw, keys::PATTERN, pattern);
                }
            }
            Point::StubAlias { alias } => put_str(&mut raw, keys::ALIAS, alias),
            Point::Assert(point) | Point::Context(point) | Point::Process(point) => {
                put_str(&mut raw, keys::PATH, &point.name)
            }
        }
        raw
    }

    /// Rebuild a point from its mapping view. `ANY` statuses become unknown statuses.
    pub fn from_raw(raw: &RawPoint) -> Result<Point, AppError> {
        let kind = str_field(raw, keys::POINT).ok_or_else(|| invalid(raw, "missing _point"))?;
        let point = match kind {
            "api" => Point::Api(ApiPoint {
                http: read_http(raw)?,
            }),
            "external_api" => Point::ExternalApi(ExternalApiPoint {
                service: str_field(raw, keys::SERVICE)
                    .ok_or_else(|| invalid(raw, "external_api requires _service"))?
                    .to_string(),
                http: read_http(raw)?,
                called: false,
            }),
            "input_mq" => {
                let path = str_field(raw, keys::PATH).unwrap_or_default();
                let (exchange, routing_key) = path.split_once('/').unwrap_or((path, ""));
                Point::InputMq(MqPoint {
                    data: raw.get(keys::DATA).cloned(),
                    exchange: non_empty(exchange),
                    routing_key: non_empty(routing_key),
                    headers: raw.get(keys::HEADERS).cloned(),
                    called: false,
                })
            }
            "mq" => Point::Mq(MqPoint {
                data: raw.get(keys::DATA).cloned(),
                exchange: str_field(raw, keys::EXCHANGE).map(str::to_string),
                routing_key: str_field(raw, keys::ROUTING_KEY).map(str::to_string),
                headers: raw.get(keys::HEADERS).cloned(),
                called: false,
            }),
            "notification" => Point::Notification {
                data: raw.get(keys::DATA).cloned().unwrap_or(Value::Null),
            },
            "log" => Point::Log(LogPoint {
                level: str_field(raw, keys::METHOD).unwrap_or_default().to_string(),
                message: str_field(raw, keys::PATH).unwrap_or_default().to_string(),
                pattern: str_field(raw, keys::PATTERN).map(str::to_string),
            }),
            "stub_alias" => Point::stub_alias(
                str_field(raw, keys::ALIAS)
                    .ok_or_else(|| invalid(raw, "stub_alias requires alias"))?,
            ),
            "assert" | "context" | "process" => {
                let name = str_field(raw, keys::PATH)
                    .ok_or_else(|| invalid(raw, "named point requires path"))?;
                match kind {
                    "assert" => Point::assert(name),
                    "context" => Point::context(name),
                    _ => Point::process(name),
                }
            }
            other => return Err(invalid(raw, &format!("unknown point kind '{}'", other))),
        };
        Ok(point)
    }
}

/// Parse a stored status; `ANY` and other non-numeric markers yield `None`.
pub fn parse_status(value: &Value) -> Option<u16> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(text) if text != ANY => text.parse().ok(),
        _ => None,
    }
}

/// Truthiness used for the mapping view: null, false, zero and empty values are dropped.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn write_http(raw: &mut RawPoint, http: &HttpFields) {
    put_value(raw, keys::DATA, http.data.as_ref());
    put_str(raw, keys::METHOD, &http.method);
    put_value(raw, keys::HEADERS, http.headers.as_ref());
    put_str(raw, keys::PATH, &http.path);
    if let Some(pattern) = &http.pattern {
        put_str(raw, keys::PATTERN, pattern);
    }
    put_value(raw, keys::PARAMS, http.params.as_ref());
    if let Some(status) = http.response_status {
        put_value(raw, keys::STATUS, Some(&Value::from(status)));
    }
    put_value(raw, keys::CONTENT, http.response_content.as_ref());
    put_value(raw, keys::RESPONSE_HEADERS, http.response_headers.as_ref());
}

fn read_http(raw: &RawPoint) -> Result<HttpFields, AppError> {
    let method = str_field(raw, keys::METHOD)
        .ok_or_else(|| invalid(raw, "http point requires method"))?;
    let pattern = str_field(raw, keys::PATTERN).map(str::to_string);
    let path = str_field(raw, keys::PATH)
        .map(str::to_string)
        .or_else(|| pattern.clone())
        .ok_or_else(|| invalid(raw, "http point requires path or pattern"))?;
    Ok(HttpFields {
        method: method.to_lowercase(),
        path,
        pattern,
        params: raw.get(keys::PARAMS).cloned(),
        data: raw.get(keys::DATA).cloned(),
        headers: raw.get(keys::HEADERS).cloned(),
        response_status: raw.get(keys::STATUS).and_then(parse_status),
        response_content: raw.get(keys::CONTENT).cloned(),
        response_headers: raw.get(keys::RESPONSE_HEADERS).cloned(),
    })
}

fn put_str(raw: &mut RawPoint, key: &str, value: &str) {
    if !value.is_empty() {
        raw.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn put_value(raw: &mut RawPoint, key: &str, value: Option<&Value>) {
    if let Some(value) = value.filter(|value| is_truthy(value)) {
        raw.insert(key.to_string(), value.clone());
    }
}

fn str_field<'a>(raw: &'a RawPoint, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn invalid(raw: &RawPoint, reason: &str) -> AppError {
    AppError::new(
        ErrorCategory::ValidationError,
        format!("invalid point {}: {}", Value::Object(raw.clone()), reason),
    )
    .with_code("POINT-000")
}
