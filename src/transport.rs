//! Request/response exchange with an OData service.
//!
//! The crate ships no HTTP client. Callers plug one in by implementing
//! [`Transport`] (blocking) or [`AsyncTransport`]; the save pipeline builds an
//! [`ODataRequest`] with a fully written body and hands it over unchanged.

use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub headers: IndexMap<String, String>,
    pub body: Vec<u8>,
}

impl ODataRequest {
    #[must_use]
    pub fn new(method: HttpMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: IndexMap::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Body as UTF-8 text, lossy.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: Vec<u8>,
}

impl ODataResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: body.into(),
        }
    }

    /// A `204 No Content` response.
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(204, Vec::<u8>::new())
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 204 or an empty body.
    #[must_use]
    pub fn is_no_content(&self) -> bool {
        self.status == 204 || self.body.iter().all(u8::is_ascii_whitespace)
    }
}

/// Failure to exchange a request with the service.
///
/// These are propagated to the caller unchanged; the pipeline never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("request was cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Blocking transport.
pub trait Transport {
    fn send(&self, request: &ODataRequest) -> Result<ODataResponse, TransportError>;
}

/// Asynchronous transport. Cancellation is the implementation's concern.
#[allow(async_fn_in_trait)]
pub trait AsyncTransport {
    async fn send(&self, request: &ODataRequest) -> Result<ODataResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &ODataRequest) -> Result<ODataResponse, TransportError> {
        (**self).send(request)
    }
}
