//! The response sink abstraction shared between the response model and
//! the host engine.
//!
//! A [`ResponseSink`] is the destination a [`Response`](crate::Response)
//! renders onto: a status code, any number of headers, then the body
//! bytes, applied in that order. The engine-facing implementation is
//! [`BufferedSink`], which accumulates everything into an
//! `http::Response` for the engine to put on the wire.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use std::io;
use thiserror::Error;
use tracing::warn;

/// Error produced when a sink cannot accept response data.
///
/// Rendering a response only fails when the sink itself fails; nothing
/// about the response data can produce this error.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// An abstract destination for one outgoing response.
///
/// Callers must apply operations in order: status first, then headers,
/// then the body. Only the body write can fail.
pub trait ResponseSink: Send {
    /// Sets the response status code.
    fn set_status(&mut self, status: StatusCode);

    /// Applies a single header. Keys are passed through case-sensitive
    /// as provided; what the engine does with them is its business.
    fn set_header(&mut self, name: &str, value: &str);

    /// Appends body bytes.
    fn write_body(&mut self, chunk: &[u8]) -> Result<(), SinkError>;
}

/// A [`ResponseSink`] that buffers the full response in memory.
///
/// This is the sink the server hands to the routing layer for every
/// request; once the callback chain returns, [`BufferedSink::into_response`]
/// yields the `http::Response` the engine writes out.
#[derive(Debug, Default)]
pub struct BufferedSink {
    status: Option<StatusCode>,
    headers: http::HeaderMap,
    body: Vec<u8>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the sink, producing the engine-level response.
    /// An untouched sink yields an empty 200.
    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseSink for BufferedSink {
    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "skipping invalid response header"),
        }
    }

    fn write_body(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }
}
