//! The typed response model.
//!
//! Every outgoing response is one variant of [`Response`], a closed sum
//! type with a single rendering operation, [`Response::write`]. Keeping
//! the set closed means rendering is exhaustively checked: adding a
//! variant without a rendering rule is a compile error.
//!
//! Rendering never fails for ordinary data. The only error a render can
//! return is a [`SinkError`] from the sink itself; a JSON body that
//! cannot be encoded downgrades the whole response to an
//! [`Response::InternalServerError`] carrying the encoding failure as
//! its cause.

use crate::sink::{ResponseSink, SinkError};
use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// An underlying failure attached to an error response.
pub type Cause = Box<dyn Error + Send + Sync>;

/// A serializable payload with its concrete type erased.
///
/// Encoding is deferred until the response is written, so constructing
/// an [`Response::Object`] can never fail; an unencodable payload
/// surfaces at render time instead.
pub struct ErasedJson {
    encode: Box<dyn Fn() -> Result<Vec<u8>, serde_json::Error> + Send + Sync>,
}

impl ErasedJson {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self { encode: Box::new(move || serde_json::to_vec(&value)) }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        (self.encode)()
    }
}

impl fmt::Debug for ErasedJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErasedJson")
    }
}

/// An outgoing HTTP response.
///
/// Variants are immutable once constructed; rendering writes to the
/// sink and never mutates the response.
#[derive(Debug)]
pub enum Response {
    /// Status, headers and opaque body bytes, written as-is.
    /// Header keys are passed through case-sensitive as provided; the
    /// order among multiple headers is unspecified.
    Raw { status: StatusCode, headers: HashMap<String, String>, body: Bytes },

    /// An arbitrary serializable value, JSON-encoded at write time.
    Object { status: StatusCode, headers: HashMap<String, String>, body: ErasedJson },

    /// Like [`Response::Object`], but constrained to a string-keyed
    /// mapping.
    Json { status: StatusCode, headers: HashMap<String, String>, body: serde_json::Map<String, Value> },

    /// A plain-text error: body is `message`, or `message: cause` when
    /// a cause is attached.
    Error { status: StatusCode, message: String, cause: Option<Cause> },

    /// Status 500 with the fixed message `internal server error`.
    InternalServerError { cause: Option<Cause> },

    /// Status 400 with the fixed message `bad request`.
    BadRequest { cause: Option<Cause> },

    /// Status 503 with the fixed body `service unavailable`.
    ServiceUnavailable,
}

impl Response {
    pub fn raw(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::Raw { status, headers: HashMap::new(), body: body.into() }
    }

    pub fn object(status: StatusCode, body: impl Serialize + Send + Sync + 'static) -> Self {
        Self::Object { status, headers: HashMap::new(), body: ErasedJson::new(body) }
    }

    pub fn json(status: StatusCode, body: serde_json::Map<String, Value>) -> Self {
        Self::Json { status, headers: HashMap::new(), body }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Error { status, message: message.into(), cause: None }
    }

    pub fn internal_server_error(cause: impl Into<Cause>) -> Self {
        Self::InternalServerError { cause: Some(cause.into()) }
    }

    pub fn bad_request(cause: impl Into<Cause>) -> Self {
        Self::BadRequest { cause: Some(cause.into()) }
    }

    /// Renders the response onto `sink`: status first, then headers,
    /// then the body, written once.
    ///
    /// Returns an error only if the sink itself fails. An Object/Json
    /// body that cannot be encoded renders an
    /// [`Response::InternalServerError`] carrying the encoding failure
    /// instead; the failure is never propagated upward.
    pub fn write(&self, sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
        match self {
            Self::Raw { status, headers, body } => write_plain(sink, *status, headers, body),
            Self::Object { status, headers: _, body } => write_encoded(sink, *status, body.encode()),
            Self::Json { status, headers: _, body } => write_encoded(sink, *status, serde_json::to_vec(body)),
            Self::Error { status, message, cause } => {
                write_plain(sink, *status, &HashMap::new(), error_body(message, cause).as_bytes())
            }
            Self::InternalServerError { cause } => write_plain(
                sink,
                StatusCode::INTERNAL_SERVER_ERROR,
                &HashMap::new(),
                error_body("internal server error", cause).as_bytes(),
            ),
            Self::BadRequest { cause } => {
                write_plain(sink, StatusCode::BAD_REQUEST, &HashMap::new(), error_body("bad request", cause).as_bytes())
            }
            Self::ServiceUnavailable => {
                write_plain(sink, StatusCode::SERVICE_UNAVAILABLE, &HashMap::new(), b"service unavailable")
            }
        }
    }
}

fn write_plain(
    sink: &mut dyn ResponseSink,
    status: StatusCode,
    headers: &HashMap<String, String>,
    body: &[u8],
) -> Result<(), SinkError> {
    sink.set_status(status);
    for (name, value) in headers {
        sink.set_header(name, value);
    }
    sink.write_body(body)
}

fn write_encoded(
    sink: &mut dyn ResponseSink,
    status: StatusCode,
    encoded: Result<Vec<u8>, serde_json::Error>,
) -> Result<(), SinkError> {
    match encoded {
        Ok(body) => {
            sink.set_status(status);
            sink.set_header("Content-Type", mime::APPLICATION_JSON.as_ref());
            sink.write_body(&body)
        }
        Err(failure) => Response::InternalServerError { cause: Some(Box::new(failure)) }.write(sink),
    }
}

fn error_body(message: &str, cause: &Option<Cause>) -> String {
    match cause {
        Some(cause) => format!("{message}: {cause}"),
        None => message.to_string(),
    }
}
