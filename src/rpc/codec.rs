//! JSON-RPC envelope decoding and encoding
//!
//! Translates wire method names of the form `service_method` into the
//! `service.Method` dispatch keys used by the registry, and back.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Dispatch key of a registered handler, rendered as `service.Method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub service: String,
    pub method: String,
}

impl CallKey {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }

    /// Parses a wire method, splitting on the first underscore only.
    pub fn from_wire(wire_method: &str) -> Result<Self, RpcError> {
        let malformed = || RpcError::MalformedMethod(wire_method.to_string());

        let (service, method) = wire_method.split_once('_').ok_or_else(malformed)?;
        if service.is_empty() || method.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(service, upper_first(method)))
    }

    pub fn to_wire(&self) -> String {
        format!("{}_{}", self.service, lower_first(&self.method))
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// A decoded request, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalCall {
    pub key: CallKey,
    pub params: Vec<Value>,
    /// `None` when the request carried no `id` member at all.
    pub id: Option<Value>,
    pub wire_method: String,
}

/// A request that could not be decoded, along with whatever `id` could be
/// recovered so that the error envelope still echoes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub id: Option<Value>,
    pub error: RpcError,
}

impl Rejection {
    fn new(id: Option<Value>, error: RpcError) -> Self {
        Self { id, error }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

/// Outgoing envelope. Constructed only through [`encode_success`] and
/// [`encode_failure`], so exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WireResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub fn decode(body: &[u8]) -> Result<InternalCall, Rejection> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|err| Rejection::new(None, RpcError::InvalidJson(err.to_string())))?;

    let Value::Object(mut object) = payload else {
        return Err(Rejection::new(
            None,
            RpcError::InvalidRequest("request must be a JSON object"),
        ));
    };

    let id = object.remove("id");
    if !id.as_ref().map_or(true, is_valid_id) {
        return Err(Rejection::new(
            None,
            RpcError::InvalidRequest("id must be an integer, a string or null"),
        ));
    }

    match decode_object(object) {
        Ok((key, wire_method, params)) => Ok(InternalCall {
            key,
            params,
            id,
            wire_method,
        }),
        Err(error) => Err(Rejection::new(id, error)),
    }
}

fn decode_object(mut object: Map<String, Value>) -> Result<(CallKey, String, Vec<Value>), RpcError> {
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(RpcError::InvalidRequest("jsonrpc must be \"2.0\""));
    }

    let wire_method = match object.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(RpcError::InvalidRequest("method must be a string")),
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(RpcError::InvalidRequest("params must be an array")),
    };

    let key = CallKey::from_wire(&wire_method)?;
    Ok((key, wire_method, params))
}

pub fn encode_success(id: Option<Value>, result: Value) -> WireResponse {
    WireResponse {
        jsonrpc: JSONRPC_VERSION,
        id,
        result: Some(result),
        error: None,
    }
}

pub fn encode_failure(id: Option<Value>, err: &RpcError) -> WireResponse {
    WireResponse {
        jsonrpc: JSONRPC_VERSION,
        id,
        result: None,
        error: Some(WireError {
            code: err.code(),
            message: err.to_string(),
        }),
    }
}

fn is_valid_id(id: &Value) -> bool {
    match id {
        Value::Null | Value::String(_) => true,
        Value::Number(number) => number.is_i64() || number.is_u64(),
        _ => false,
    }
}

// Case mapping is ASCII-only so that one char always maps to one char and
// `to_wire` inverts `from_wire`.
fn upper_first(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => std::iter::once(first.to_ascii_uppercase())
            .chain(chars)
            .collect(),
        None => String::new(),
    }
}

fn lower_first(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => std::iter::once(first.to_ascii_lowercase())
            .chain(chars)
            .collect(),
        None => String::new(),
    }
}
