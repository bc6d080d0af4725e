// HTTP transport: the only place that talks to the network. Everything
// above it (comic fetcher, wall pipeline) is written against the
// `Transport` trait so the sequencing logic can run against a scripted
// transport in tests.

use crate::errors::{AppError, AppResult};
use reqwest::blocking::{multipart, Client, Response};
use serde_json::Value;
use std::fs::File;
use std::path::Path;

/// Query parameters as sent on the wire, in insertion order.
pub type Query<'a> = [(&'a str, String)];

/// Blocking HTTP operations needed by the poster. Every method fails with
/// `AppError::Status` on a non-2xx response.
pub trait Transport {
    /// GET `url` with `query` and decode the body as JSON.
    fn get_json(&self, url: &str, query: &Query) -> AppResult<Value>;

    /// POST to `url` with `query` as URL parameters (no body) and decode
    /// the body as JSON.
    fn post_json(&self, url: &str, query: &Query) -> AppResult<Value>;

    /// GET `url` and return the raw body.
    fn get_bytes(&self, url: &str) -> AppResult<Vec<u8>>;

    /// POST the file at `path` as multipart field `field` and decode the
    /// body as JSON.
    fn upload_file(&self, url: &str, field: &str, path: &Path) -> AppResult<Value>;
}

/// reqwest-backed transport. No timeouts or retries are configured beyond
/// the client defaults.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("comic-poster/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpTransport { client })
    }

    /// Turn a non-success status into `AppError::Status`, keeping the
    /// start of the body for the error message.
    fn check(url: &str, res: Response) -> AppResult<Response> {
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            return Err(AppError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&txt, 300),
            });
        }
        Ok(res)
    }

    fn decode(url: &str, res: Response) -> AppResult<Value> {
        let res = Self::check(url, res)?;
        res.json::<Value>().map_err(|e| {
            if e.is_decode() {
                AppError::schema(url, format!("body is not JSON: {}", e))
            } else {
                AppError::Transport(e)
            }
        })
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &str, query: &Query) -> AppResult<Value> {
        let res = self.client.get(url).query(query).send()?;
        Self::decode(url, res)
    }

    fn post_json(&self, url: &str, query: &Query) -> AppResult<Value> {
        let res = self.client.post(url).query(query).send()?;
        Self::decode(url, res)
    }

    fn get_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        let res = Self::check(url, self.client.get(url).send()?)?;
        Ok(res.bytes()?.to_vec())
    }

    fn upload_file(&self, url: &str, field: &str, path: &Path) -> AppResult<Value> {
        let file = File::open(path).map_err(|e| AppError::filesystem(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image.png")
            .to_string();

        let part = multipart::Part::reader(file)
            .file_name(file_name)
            .mime_str(mime_for(path))?;
        let form = multipart::Form::new().part(field.to_string(), part);

        let res = self.client.post(url).multipart(form).send()?;
        Self::decode(url, res)
    }
}

/// Content type for an image file, guessed from its extension.
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
