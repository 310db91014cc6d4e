//! [`Transport`] on blocking curl `Easy` handles.
//!
//! Each request runs on the blocking pool. Upload progress and abort both go
//! through curl's progress callback: returning `false` from it makes curl stop
//! the transfer with an "aborted by callback" error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use curl::easy::{Easy, Form, List};

use super::{
    FormPart, HttpRequest, HttpResponse, Method, ProgressFn, RequestBody, Transport, TransportError,
};
use crate::config::{CurlConfig, UploadConfig};
use crate::control::AbortToken;

/// Transport backed by libcurl.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurlTransport {
    opts: CurlConfig,
}

impl CurlTransport {
    pub fn new(opts: CurlConfig) -> Self {
        Self { opts }
    }

    /// Transport using the `[curl]` section of `config`, or the defaults.
    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.curl_or_default())
    }
}

#[async_trait]
impl Transport for CurlTransport {
    async fn send(
        &self,
        request: HttpRequest,
        progress: ProgressFn,
        abort: Arc<AbortToken>,
    ) -> Result<HttpResponse, TransportError> {
        let opts = self.opts;
        tokio::task::spawn_blocking(move || perform(&request, opts, &progress, &abort))
            .await
            .map_err(|e| TransportError::Join(e.to_string()))?
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
        match part {
            FormPart::Text { name, value } => {
                form.part(name).contents(value.as_bytes()).add()?;
            }
            FormPart::File {
                name,
                filename,
                data,
            } => {
                form.part(name)
                    .buffer(filename, data.to_vec())
                    .content_type("application/octet-stream")
                    .add()?;
            }
        }
    }
    Ok(form)
}

fn perform(
    request: &HttpRequest,
    opts: CurlConfig,
    progress: &ProgressFn,
    abort: &AbortToken,
) -> Result<HttpResponse, TransportError> {
    let mut easy = Easy::new();
    easy.url(&request.url)?;
    easy.connect_timeout(Duration::from_secs(opts.connect_timeout_secs))?;
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(Duration::from_secs(opts.low_speed_time_secs))?;
    easy.timeout(Duration::from_secs(opts.timeout_secs))?;
    easy.progress(true)?;

    let mut headers = List::new();
    for (k, v) in &request.headers {
        headers.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    // No "Expect: 100-continue" round trip before chunk bodies.
    headers.append("Expect:")?;

    match (&request.body, request.method) {
        (RequestBody::Empty, Method::Get) => easy.get(true)?,
        (RequestBody::Empty, Method::Post) => {
            easy.post(true)?;
            easy.post_field_size(0)?;
        }
        (RequestBody::Json(value), _) => {
            let body = serde_json::to_vec(value).map_err(|e| TransportError::Other(e.to_string()))?;
            headers.append("Content-Type: application/json")?;
            easy.post(true)?;
            easy.post_fields_copy(&body)?;
        }
        (RequestBody::Multipart(parts), _) => easy.httppost(build_form(parts)?)?,
    }
    easy.http_headers(headers)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.progress_function(|_dltotal, _dlnow, ultotal, ulnow| {
            if abort.is_aborted() {
                return false;
            }
            if ultotal > 0.0 {
                progress(ulnow as u64, ultotal as u64);
            }
            true
        })?;
        if let Err(e) = transfer.perform() {
            if e.is_aborted_by_callback() || abort.is_aborted() {
                return Err(TransportError::Aborted);
            }
            return Err(TransportError::Curl(e));
        }
    }

    let status = easy.response_code()? as u16;
    Ok(HttpResponse { status })
}
