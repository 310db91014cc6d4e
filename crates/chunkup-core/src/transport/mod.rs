//! The transport boundary.
//!
//! The scheduler never talks HTTP itself: it builds [`HttpRequest`]s and
//! hands them to a caller-supplied [`Transport`], which reports upload byte
//! progress and stops when the request's abort token fires.
//! [`CurlTransport`] is the bundled implementation.

mod curl_transport;

pub use curl_transport::CurlTransport;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::control::AbortToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// One part of a multipart/form-data body.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        data: Arc<[u8]>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

/// A fully built request. Cloned for every resend.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Value of the text form part `name`, or of query parameter `name` for GETs.
    pub fn field(&self, name: &str) -> Option<String> {
        match &self.body {
            RequestBody::Multipart(parts) => parts.iter().find_map(|p| match p {
                FormPart::Text { name: n, value } if n == name => Some(value.clone()),
                _ => None,
            }),
            RequestBody::Json(value) => value.get(name).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            RequestBody::Empty => {
                let query = self.url.split_once('?')?.1;
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
}

/// Upload progress callback: `(bytes sent, total bytes of the request body)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("curl: {0}")]
    Curl(#[from] ::curl::Error),
    #[error("build multipart form: {0}")]
    Form(#[from] ::curl::FormError),
    /// The abort token fired while the request was in flight.
    #[error("request aborted")]
    Aborted,
    #[error("transport task join: {0}")]
    Join(String),
    #[error("{0}")]
    Other(String),
}

/// Something that can issue cancellable HTTP requests with upload progress.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request` once. Implementations call `progress` while the body is
    /// being sent and return [`TransportError::Aborted`] promptly after
    /// `abort` fires.
    async fn send(
        &self,
        request: HttpRequest,
        progress: ProgressFn,
        abort: Arc<AbortToken>,
    ) -> Result<HttpResponse, TransportError>;
}
