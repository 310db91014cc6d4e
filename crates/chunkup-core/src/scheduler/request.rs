//! Builders for the four protocol requests.
//!
//! Base fields come from the chunk or whole-file descriptor; injected fields
//! are merged over them, replacing a base field with the same key.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::{FieldInjector, RequestOptions};
use crate::retry::RequestError;
use crate::session::{Chunk, FileInformation, UploadSession};
use crate::transport::{FormPart, HttpRequest, Method, RequestBody};

use super::task::Stage;

/// Multipart field name of the chunk payload.
pub const FILE_FIELD: &str = "file";

fn field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn inject(injector: &Option<FieldInjector>, session: &UploadSession) -> Map<String, Value> {
    injector.as_ref().map(|f| f(session)).unwrap_or_default()
}

/// Merge `extra` over `base`: same keys are replaced in place, new keys appended.
fn merge_fields(
    mut base: Vec<(String, String)>,
    extra: Map<String, Value>,
) -> Vec<(String, String)> {
    for (key, value) in extra {
        let value = field_value(&value);
        match base.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => base.push((key, value)),
        }
    }
    base
}

fn info_body(info: &FileInformation, extra: Map<String, Value>) -> Value {
    let mut body = Map::new();
    body.insert("totalChunks".into(), info.total_chunks.into());
    body.insert("chunkSize".into(), info.chunk_size.into());
    body.insert("totalSize".into(), info.total_size.into());
    body.insert("filename".into(), info.filename.clone().into());
    body.insert("contentHash".into(), info.content_hash.clone().into());
    body.insert("relativePath".into(), info.relative_path.clone().into());
    body.extend(extra);
    Value::Object(body)
}

fn headers(opts: &RequestOptions) -> Vec<(String, String)> {
    opts.config
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn with_query(target: &str, fields: &[(String, String)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    let sep = if target.contains('?') { '&' } else { '?' };
    format!("{}{}{}", target, sep, query)
}

pub(crate) fn precheck_request(
    opts: &RequestOptions,
    session: &UploadSession,
    info: &FileInformation,
) -> HttpRequest {
    HttpRequest {
        method: Method::Post,
        url: opts.config.precheck_target.clone(),
        headers: headers(opts),
        body: RequestBody::Json(info_body(info, inject(&opts.injectors.precheck_data, session))),
    }
}

pub(crate) fn merge_request(
    opts: &RequestOptions,
    session: &UploadSession,
    info: &FileInformation,
) -> HttpRequest {
    HttpRequest {
        method: Method::Post,
        url: opts.config.merge_target.clone(),
        headers: headers(opts),
        body: RequestBody::Json(info_body(info, inject(&opts.injectors.merge_data, session))),
    }
}

pub(crate) fn test_request(
    opts: &RequestOptions,
    session: &UploadSession,
    chunk: &Chunk,
) -> HttpRequest {
    let fields = merge_fields(chunk.fields(), inject(&opts.injectors.data, session));
    HttpRequest {
        method: Method::Get,
        url: with_query(&opts.config.target, &fields),
        headers: headers(opts),
        body: RequestBody::Empty,
    }
}

/// Reads the chunk's bytes from the source; a read failure is not retried.
pub(crate) async fn upload_request(
    opts: &RequestOptions,
    session: &UploadSession,
    chunk: &Chunk,
) -> Result<HttpRequest, RequestError> {
    let data = session
        .source()
        .read_range(chunk.offset, chunk.current_size)
        .await
        .map_err(RequestError::Payload)?;
    let fields = merge_fields(chunk.fields(), inject(&opts.injectors.data, session));
    let mut parts: Vec<FormPart> = fields
        .into_iter()
        .map(|(name, value)| FormPart::Text { name, value })
        .collect();
    parts.push(FormPart::File {
        name: FILE_FIELD.to_string(),
        filename: chunk.filename.clone(),
        data: Arc::from(data),
    });
    Ok(HttpRequest {
        method: Method::Post,
        url: opts.config.target.clone(),
        headers: headers(opts),
        body: RequestBody::Multipart(parts),
    })
}

/// Build the request for `stage` of `session`.
pub(crate) async fn build_request(
    opts: &RequestOptions,
    session: &UploadSession,
    stage: Stage,
) -> Result<HttpRequest, RequestError> {
    match stage {
        Stage::Precheck | Stage::Merge => {
            let info = session
                .file_information()
                .ok_or(RequestError::MissingChunk(0))?;
            Ok(if stage == Stage::Precheck {
                precheck_request(opts, session, &info)
            } else {
                merge_request(opts, session, &info)
            })
        }
        Stage::Test(i) => {
            let chunk = session.chunk(i).ok_or(RequestError::MissingChunk(i))?;
            Ok(test_request(opts, session, &chunk))
        }
        Stage::Real(i) => {
            let chunk = session.chunk(i).ok_or(RequestError::MissingChunk(i))?;
            upload_request(opts, session, &chunk).await
        }
    }
}
