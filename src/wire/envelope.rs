/// Request and response envelopes
use crate::wire::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only protocol version this server speaks
pub const PROTOCOL_VERSION: u32 = 1;

/// Request kinds a client may send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    Login {
        provider: String,
        #[serde(default)]
        id_token: Option<String>,
        #[serde(default)]
        device_id: Option<String>,
    },
    Refresh {
        refresh_token: String,
    },
    Logout {
        refresh_token: String,
    },
}

impl RequestBody {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::Login { .. } => "Login",
            RequestBody::Refresh { .. } => "Refresh",
            RequestBody::Logout { .. } => "Logout",
        }
    }
}

/// A decoded request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub req_id: u64,
    pub ver: u32,
    pub body: RequestBody,
}

/// Envelope with the body left undecoded, so an unknown or malformed body
/// can still be answered under its request id
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    req_id: u64,
    ver: u32,
    body: serde_cbor::Value,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not an envelope at all; there is no request id to answer
    #[error("malformed envelope: {0}")]
    Envelope(String),

    /// Envelope readable, body or version not acceptable. `message` is what
    /// the client sees; `detail` only goes to the log.
    #[error("{message}: {detail}")]
    Body {
        req_id: u64,
        kind: String,
        message: String,
        detail: String,
    },
}

/// Longest body kind echoed back in an error message
const MAX_KIND_LEN: usize = 32;

/// Name of the request kind a raw body claims to be, if any
fn body_kind(body: &serde_cbor::Value) -> String {
    use serde_cbor::Value;

    let name = match body {
        Value::Map(map) if map.len() == 1 => match map.keys().next() {
            Some(Value::Text(name)) => Some(name.as_str()),
            _ => None,
        },
        Value::Text(name) => Some(name.as_str()),
        _ => None,
    };

    match name {
        Some(name) if !name.is_empty() => name.chars().take(MAX_KIND_LEN).collect(),
        _ => "request".to_string(),
    }
}

/// Decode a request payload.
///
/// `DecodeError::Body` keeps the request id so the caller can answer (and
/// cache) under it.
pub fn decode_request(payload: &[u8]) -> Result<RequestEnvelope, DecodeError> {
    let raw: RawEnvelope =
        serde_cbor::from_slice(payload).map_err(|e| DecodeError::Envelope(e.to_string()))?;

    let kind = body_kind(&raw.body);

    if raw.ver != PROTOCOL_VERSION {
        return Err(DecodeError::Body {
            req_id: raw.req_id,
            kind,
            message: format!("Unsupported protocol version {}", raw.ver),
            detail: format!("client sent version {}", raw.ver),
        });
    }

    let body = serde_cbor::value::from_value::<RequestBody>(raw.body).map_err(|e| {
        let message = match kind.as_str() {
            "Login" | "Refresh" | "Logout" => format!("Malformed {}", kind),
            _ => format!("Unhandled {}", kind),
        };
        DecodeError::Body {
            req_id: raw.req_id,
            kind: kind.clone(),
            message,
            detail: e.to_string(),
        }
    })?;

    Ok(RequestEnvelope {
        req_id: raw.req_id,
        ver: raw.ver,
        body,
    })
}

/// Outcome of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

/// Success payloads, one per request kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    Login {
        user_id: String,
        display_name: String,
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    },
    Refresh {
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    },
    Logout {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub req_id: u64,
    pub ver: u32,
    pub result: ErrorInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

impl ResponseEnvelope {
    pub fn ok(req_id: u64, body: ResponseBody) -> Self {
        Self {
            req_id,
            ver: PROTOCOL_VERSION,
            result: ErrorInfo {
                code: ErrorCode::Ok,
                message: String::new(),
            },
            body: Some(body),
        }
    }

    pub fn error(req_id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            req_id,
            ver: PROTOCOL_VERSION,
            result: ErrorInfo {
                code,
                message: message.into(),
            },
            body: None,
        }
    }
}

pub fn encode_response(envelope: &ResponseEnvelope) -> Result<Vec<u8>, serde_cbor::Error> {
    serde_cbor::to_vec(envelope)
}
