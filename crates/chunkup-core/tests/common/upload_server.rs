//! Minimal HTTP/1.1 upload server for integration tests.
//!
//! Implements the chunk protocol: `GET /upload` answers 204 when the chunk
//! is stored and 200 when it is missing, `POST /upload` stores a multipart
//! chunk, `POST /merge` concatenates the chunks and checks the content hash,
//! and `POST /precheck` answers 204 for files already merged.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chunkup_core::partition::content_hash;
use chunkup_core::session::FileInformation;

#[derive(Default)]
struct State {
    /// (content hash, chunk index) -> bytes.
    chunks: HashMap<(String, usize), Vec<u8>>,
    /// content hash -> merged file.
    merged: HashMap<String, Vec<u8>>,
    /// "METHOD /path" of every request, in arrival order.
    log: Vec<String>,
    /// Remaining chunk uploads to answer with 503.
    flaky_uploads: usize,
}

#[derive(Clone)]
pub struct UploadServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl UploadServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn merged(&self, hash: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().merged.get(hash).cloned()
    }

    /// Number of requests whose "METHOD /path" equals `route`.
    pub fn count(&self, route: &str) -> usize {
        self.state.lock().unwrap().log.iter().filter(|r| *r == route).count()
    }

    pub fn stored_chunks(&self, hash: &str) -> usize {
        self.state.lock().unwrap().chunks.keys().filter(|(h, _)| h == hash).count()
    }

    /// Answer the next `n` chunk uploads with 503 before storing anything.
    pub fn fail_next_uploads(&self, n: usize) {
        self.state.lock().unwrap().flaky_uploads = n;
    }
}

/// Starts the server on a background thread; it runs until the process exits.
pub fn start() -> UploadServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(State::default()));
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &state));
        }
    });
    UploadServer {
        base: format!("http://127.0.0.1:{}", port),
        state,
    }
}

struct Request {
    method: String,
    path: String,
    query: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 16 * 1024];
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut tmp).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
    };
    let head = std::str::from_utf8(&buf[..head_end]).ok()?;
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let mut request = Request {
        method,
        path: path.to_string(),
        query: query.to_string(),
        headers,
        body: buf[head_end + 4..].to_vec(),
    };
    let len: usize = request
        .header("Content-Length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while request.body.len() < len {
        let n = stream.read(&mut tmp).ok()?;
        if n == 0 {
            return None;
        }
        request.body.extend_from_slice(&tmp[..n]);
    }
    Some(request)
}

/// Text fields and the `file` part of a multipart/form-data body.
fn parse_multipart(body: &[u8], content_type: &str) -> (HashMap<String, String>, Vec<u8>) {
    let mut fields = HashMap::new();
    let mut file = Vec::new();
    let Some(boundary) = content_type.split("boundary=").nth(1) else {
        return (fields, file);
    };
    let delimiter = format!("--{}", boundary.trim_matches('"'));
    let mut rest = body;
    while let Some(start) = find(rest, delimiter.as_bytes()) {
        rest = &rest[start + delimiter.len()..];
        if rest.starts_with(b"--") {
            break;
        }
        let Some(head_end) = find(rest, b"\r\n\r\n") else {
            break;
        };
        let head = String::from_utf8_lossy(&rest[..head_end]).to_string();
        let content_start = head_end + 4;
        let Some(next) = find(&rest[content_start..], delimiter.as_bytes()) else {
            break;
        };
        // Content ends with the CRLF preceding the next delimiter.
        let content = &rest[content_start..content_start + next.saturating_sub(2)];
        let name = head
            .split("name=\"")
            .nth(1)
            .and_then(|s| s.split('"').next())
            .unwrap_or_default()
            .to_string();
        if head.contains("filename=") {
            file = content.to_vec();
        } else {
            fields.insert(name, String::from_utf8_lossy(content).to_string());
        }
        rest = &rest[content_start + next..];
    }
    (fields, file)
}

fn route(request: &Request, state: &Mutex<State>) -> u16 {
    let mut state = state.lock().unwrap();
    state.log.push(format!("{} {}", request.method, request.path));
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/upload") => {
            let query: HashMap<String, String> =
                url::form_urlencoded::parse(request.query.as_bytes())
                    .into_owned()
                    .collect();
            let index = query.get("chunkIndex").and_then(|v| v.parse().ok());
            match (query.get("contentHash"), index) {
                (Some(hash), Some(index))
                    if state.chunks.contains_key(&(hash.clone(), index)) =>
                {
                    204
                }
                (Some(_), Some(_)) => 200,
                _ => 400,
            }
        }
        ("POST", "/upload") => {
            if state.flaky_uploads > 0 {
                state.flaky_uploads -= 1;
                return 503;
            }
            let content_type = request.header("Content-Type").unwrap_or_default();
            let (fields, file) = parse_multipart(&request.body, content_type);
            let index = fields.get("chunkIndex").and_then(|v| v.parse::<usize>().ok());
            let size = fields.get("currentSize").and_then(|v| v.parse::<usize>().ok());
            match (fields.get("contentHash"), index, size) {
                (Some(hash), Some(index), Some(size)) if size == file.len() => {
                    state.chunks.insert((hash.clone(), index), file);
                    200
                }
                _ => 400,
            }
        }
        ("POST", "/precheck") => match serde_json::from_slice::<FileInformation>(&request.body) {
            Ok(info) if state.merged.contains_key(&info.content_hash) => 204,
            Ok(_) => 200,
            Err(_) => 400,
        },
        ("POST", "/merge") => {
            let Ok(info) = serde_json::from_slice::<FileInformation>(&request.body) else {
                return 400;
            };
            let mut file = Vec::with_capacity(info.total_size as usize);
            for index in 0..info.total_chunks {
                match state.chunks.get(&(info.content_hash.clone(), index)) {
                    Some(bytes) => file.extend_from_slice(bytes),
                    None => return 400,
                }
            }
            if file.len() as u64 != info.total_size || content_hash(&file) != info.content_hash {
                return 400;
            }
            state.merged.insert(info.content_hash, file);
            200
        }
        _ => 404,
    }
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let status = route(&request, state);
    let reason = match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Service Unavailable",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    );
    let _ = stream.write_all(response.as_bytes());
}
