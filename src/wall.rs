// Wall upload pipeline for the VK API.
//
// Posting a photo takes four calls, each consuming the previous one's
// output:
//
//   photos.getWallUploadServer -> UploadTicket
//   POST <upload_url>          -> UploadedPhoto
//   photos.saveWallPhoto       -> SavedPhoto
//   wall.post                  -> PostResult
//
// Every intermediate value is moved into the next step, so a token can't
// be reused or mixed with tokens from a different upload.

use crate::errors::{AppError, AppResult};
use crate::transport::Transport;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_WALL_API_URL: &str = "https://api.vk.com/method";

const GET_UPLOAD_SERVER: &str = "photos.getWallUploadServer";
const SAVE_WALL_PHOTO: &str = "photos.saveWallPhoto";
const WALL_POST: &str = "wall.post";
const UPLOAD_STEP: &str = "photo upload";

/// Upload address handed out for a single upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadTicket {
    pub upload_url: String,
}

/// Tokens returned by the upload server. All three come from the same
/// upload and are only meaningful together.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedPhoto {
    #[serde(deserialize_with = "param_string")]
    pub server: String,
    #[serde(deserialize_with = "param_string")]
    pub photo: String,
    pub hash: String,
}

/// A photo registered against the wall, ready to be attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SavedPhoto {
    pub owner_id: i64,
    #[serde(rename = "id")]
    pub photo_id: i64,
}

impl SavedPhoto {
    /// Attachment reference for `wall.post`, e.g. `photo7_99`.
    pub fn attachment(&self) -> String {
        format!("photo{}_{}", self.owner_id, self.photo_id)
    }
}

/// Whatever `wall.post` answered.
#[derive(Debug, Clone, PartialEq)]
pub struct PostResult {
    raw: Value,
}

impl PostResult {
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn post_id(&self) -> Option<i64> {
        self.raw.get("response")?.get("post_id")?.as_i64()
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: Option<T>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

/// VK answers errors with HTTP 200 and an `error` object instead of
/// `response`.
fn check_api_error(step: &str, body: &Value) -> AppResult<()> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    match ApiErrorBody::deserialize(error) {
        Ok(e) => Err(AppError::Api {
            step: step.to_string(),
            code: e.error_code,
            message: e.error_msg,
        }),
        Err(_) => Err(AppError::schema(step, format!("unrecognised error: {}", error))),
    }
}

fn unwrap_response<T: DeserializeOwned>(step: &str, body: Value) -> AppResult<T> {
    check_api_error(step, &body)?;
    let envelope: Envelope<T> =
        serde_json::from_value(body).map_err(|e| AppError::schema(step, e.to_string()))?;
    envelope
        .response
        .ok_or_else(|| AppError::schema(step, "missing field `response`"))
}

/// Accept a JSON string or number and keep its textual form, the way it
/// has to be sent back as a query parameter.
fn param_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

/// Client for the wall API, bound to one access token and API version.
pub struct WallClient<'a> {
    transport: &'a dyn Transport,
    base_url: String,
    access_token: String,
    api_version: String,
}

impl<'a> WallClient<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        base_url: &str,
        access_token: &str,
        api_version: &str,
    ) -> Self {
        WallClient {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            api_version: api_version.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn credentials(&self) -> Vec<(&'static str, String)> {
        vec![
            ("access_token", self.access_token.clone()),
            ("v", self.api_version.clone()),
        ]
    }

    /// Step 1: ask for an upload address.
    pub fn request_upload_server(&self) -> AppResult<UploadTicket> {
        let url = self.method_url(GET_UPLOAD_SERVER);
        let body = self.transport.get_json(&url, &self.credentials())?;
        let ticket: UploadTicket = unwrap_response(GET_UPLOAD_SERVER, body)?;
        log::debug!("Upload server: {}", ticket.upload_url);
        Ok(ticket)
    }

    /// Step 2: send the image to the upload address.
    pub fn upload_photo(&self, ticket: UploadTicket, image: &Path) -> AppResult<UploadedPhoto> {
        let body = self.transport.upload_file(&ticket.upload_url, "photo", image)?;
        check_api_error(UPLOAD_STEP, &body)?;
        let uploaded: UploadedPhoto = serde_json::from_value(body)
            .map_err(|e| AppError::schema(UPLOAD_STEP, e.to_string()))?;
        if uploaded.photo.is_empty() || uploaded.photo == "[]" {
            return Err(AppError::schema(UPLOAD_STEP, "upload server accepted no photo"));
        }
        log::debug!(
            "Uploaded photo: server={} hash={}",
            uploaded.server,
            uploaded.hash
        );
        Ok(uploaded)
    }

    /// Step 3: register the uploaded photo so it can be attached.
    pub fn register_photo(&self, uploaded: UploadedPhoto) -> AppResult<SavedPhoto> {
        let url = self.method_url(SAVE_WALL_PHOTO);
        let mut query = self.credentials();
        query.push(("server", uploaded.server));
        query.push(("photo", uploaded.photo));
        query.push(("hash", uploaded.hash));

        let body = self.transport.post_json(&url, &query)?;
        let saved: Vec<SavedPhoto> = unwrap_response(SAVE_WALL_PHOTO, body)?;
        let saved = saved
            .into_iter()
            .next()
            .ok_or_else(|| AppError::schema(SAVE_WALL_PHOTO, "response array is empty"))?;
        log::debug!("Saved photo {}", saved.attachment());
        Ok(saved)
    }

    /// Step 4: post the photo on the group's wall, as the group.
    ///
    /// `message` is left out entirely when there is no caption.
    pub fn publish_post(
        &self,
        group_id: u64,
        saved: SavedPhoto,
        caption: Option<&str>,
    ) -> AppResult<PostResult> {
        let url = self.method_url(WALL_POST);
        let mut query = self.credentials();
        query.push(("owner_id", format!("-{}", group_id)));
        query.push(("from_group", "1".to_string()));
        query.push(("attachments", saved.attachment()));
        if let Some(caption) = caption {
            query.push(("message", caption.to_string()));
        }

        let raw = self.transport.get_json(&url, &query)?;
        check_api_error(WALL_POST, &raw)?;
        Ok(PostResult { raw })
    }

    /// Run all four steps for `image`. Stops at the first failure; a photo
    /// that was registered but never posted is left as is.
    pub fn post_on_wall(
        &self,
        group_id: u64,
        image: &Path,
        caption: Option<&str>,
    ) -> AppResult<PostResult> {
        let ticket = self.request_upload_server()?;
        let uploaded = self.upload_photo(ticket, image)?;
        let saved = self.register_photo(uploaded)?;
        let post = self.publish_post(group_id, saved, caption)?;
        log::debug!("{}", post.raw());
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, RecordedCall};
    use serde_json::json;
    use tempfile::TempDir;

    const API: &str = "https://api.vk.test/method";

    fn image_in(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("42.png");
        std::fs::write(&path, b"\x89PNG").unwrap();
        path
    }

    fn happy_transport() -> MockTransport {
        MockTransport::new()
            .with_json(json!({ "response": { "upload_url": "U" } }))
            .with_json(json!({ "server": "S", "photo": "P", "hash": "H" }))
            .with_json(json!({ "response": [ { "owner_id": 7, "id": 99 } ] }))
            .with_json(json!({ "response": { "post_id": 1234 } }))
    }

    #[test]
    fn test_post_on_wall_chains_tokens_in_order() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let transport = happy_transport();
        let client = WallClient::new(&transport, API, "token", "5.131");

        let post = client.post_on_wall(12345, &image, Some("hello")).unwrap();
        assert_eq!(post.post_id(), Some(1234));

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);

        assert_eq!(calls[0].url(), "https://api.vk.test/method/photos.getWallUploadServer");
        assert_eq!(calls[0].param("access_token"), Some("token"));
        assert_eq!(calls[0].param("v"), Some("5.131"));

        match &calls[1] {
            RecordedCall::Upload {
                url,
                field,
                file_name,
                bytes,
            } => {
                assert_eq!(url, "U");
                assert_eq!(field, "photo");
                assert_eq!(file_name, "42.png");
                assert_eq!(bytes, b"\x89PNG");
            }
            other => panic!("expected upload, got {:?}", other),
        }

        assert!(matches!(calls[2], RecordedCall::PostJson { .. }));
        assert_eq!(calls[2].url(), "https://api.vk.test/method/photos.saveWallPhoto");
        assert_eq!(calls[2].param("server"), Some("S"));
        assert_eq!(calls[2].param("photo"), Some("P"));
        assert_eq!(calls[2].param("hash"), Some("H"));

        assert_eq!(calls[3].url(), "https://api.vk.test/method/wall.post");
        assert_eq!(calls[3].param("attachments"), Some("photo7_99"));
        assert_eq!(calls[3].param("owner_id"), Some("-12345"));
        assert_eq!(calls[3].param("from_group"), Some("1"));
        assert_eq!(calls[3].param("message"), Some("hello"));
        assert_eq!(calls[3].param("access_token"), Some("token"));
    }

    #[test]
    fn test_numeric_server_is_forwarded_as_text() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let transport = MockTransport::new()
            .with_json(json!({ "response": { "upload_url": "U" } }))
            .with_json(json!({
                "server": 840221,
                "photo": "[{\"photo\":\"abc\"}]",
                "hash": "deadbeef"
            }))
            .with_json(json!({ "response": [ { "owner_id": -5, "id": 1 } ] }))
            .with_json(json!({ "response": { "post_id": 1 } }));
        let client = WallClient::new(&transport, API, "token", "5.131");

        client.post_on_wall(5, &image, None).unwrap();

        let calls = transport.calls();
        assert_eq!(calls[2].param("server"), Some("840221"));
        assert_eq!(calls[2].param("photo"), Some("[{\"photo\":\"abc\"}]"));
        assert_eq!(calls[3].param("attachments"), Some("photo-5_1"));
    }

    #[test]
    fn test_missing_caption_omits_message() {
        let transport = MockTransport::new().with_json(json!({ "response": { "post_id": 1 } }));
        let client = WallClient::new(&transport, API, "token", "5.131");
        let saved = SavedPhoto {
            owner_id: 7,
            photo_id: 99,
        };

        client.publish_post(1, saved, None).unwrap();
        assert_eq!(transport.calls()[0].param("message"), None);
    }

    #[test]
    fn test_missing_upload_url_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let transport = MockTransport::new()
            .with_json(json!({ "response": {} }))
            .with_json(json!({ "server": "S", "photo": "P", "hash": "H" }));
        let client = WallClient::new(&transport, API, "token", "5.131");

        let err = client.post_on_wall(1, &image, None).unwrap_err();
        assert!(matches!(err, AppError::Schema { ref step, .. } if step == GET_UPLOAD_SERVER));
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(transport.unused_replies(), 1);
    }

    #[test]
    fn test_missing_hash_stops_before_save() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let transport = MockTransport::new()
            .with_json(json!({ "response": { "upload_url": "U" } }))
            .with_json(json!({ "server": "S", "photo": "P" }))
            .with_json(json!({ "response": [ { "owner_id": 7, "id": 99 } ] }));
        let client = WallClient::new(&transport, API, "token", "5.131");

        let err = client.post_on_wall(1, &image, None).unwrap_err();
        assert!(matches!(err, AppError::Schema { ref step, .. } if step == UPLOAD_STEP));
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(transport.unused_replies(), 1);
    }

    #[test]
    fn test_empty_photo_list_is_rejected() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let transport = MockTransport::new()
            .with_json(json!({ "server": 1, "photo": "[]", "hash": "H" }));
        let client = WallClient::new(&transport, API, "token", "5.131");
        let ticket = UploadTicket {
            upload_url: "U".into(),
        };

        assert!(client.upload_photo(ticket, &image).is_err());
    }

    #[test]
    fn test_empty_save_response_stops_before_post() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let transport = MockTransport::new()
            .with_json(json!({ "response": { "upload_url": "U" } }))
            .with_json(json!({ "server": "S", "photo": "P", "hash": "H" }))
            .with_json(json!({ "response": [] }))
            .with_json(json!({ "response": { "post_id": 1 } }));
        let client = WallClient::new(&transport, API, "token", "5.131");

        let err = client.post_on_wall(1, &image, None).unwrap_err();
        assert!(matches!(err, AppError::Schema { ref step, .. } if step == SAVE_WALL_PHOTO));
        assert_eq!(transport.calls().len(), 3);
        assert_eq!(transport.unused_replies(), 1);
    }

    #[test]
    fn test_saved_photo_without_owner_is_rejected() {
        let transport = MockTransport::new().with_json(json!({ "response": [ { "id": 99 } ] }));
        let client = WallClient::new(&transport, API, "token", "5.131");
        let uploaded = UploadedPhoto {
            server: "S".into(),
            photo: "P".into(),
            hash: "H".into(),
        };

        let err = client.register_photo(uploaded).unwrap_err();
        assert!(matches!(err, AppError::Schema { .. }));
    }

    #[test]
    fn test_api_error_body_is_reported() {
        let transport = MockTransport::new().with_json(json!({
            "error": { "error_code": 5, "error_msg": "User authorization failed" }
        }));
        let client = WallClient::new(&transport, API, "", "5.131");

        let err = client.request_upload_server().unwrap_err();
        match err {
            AppError::Api { step, code, message } => {
                assert_eq!(step, GET_UPLOAD_SERVER);
                assert_eq!(code, 5);
                assert_eq!(message, "User authorization failed");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[test]
    fn test_wall_post_http_failure_is_fatal() {
        let transport = MockTransport::new().with_status(500);
        let client = WallClient::new(&transport, API, "token", "5.131");
        let saved = SavedPhoto {
            owner_id: 7,
            photo_id: 99,
        };

        let err = client.publish_post(1, saved, Some("x")).unwrap_err();
        assert!(matches!(err, AppError::Status { status: 500, .. }));
    }

    #[test]
    fn test_attachment_format() {
        let saved = SavedPhoto {
            owner_id: 7,
            photo_id: 99,
        };
        assert_eq!(saved.attachment(), "photo7_99");
    }
}
