//! Telegram Bot API client.
//!
//! Covers the handful of methods the bot needs:
//! - `getMe` (startup check)
//! - `getUpdates` (long polling)
//! - `sendMessage`
//! - `sendAudio` (streamed multipart upload)

use crate::error::{TelegramError, TelegramResult};
use async_trait::async_trait;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use songbot_core::config::TelegramConfig;
use songbot_core::delivery::Messenger;
use songbot_core::router::InboundMessage;
use songbot_core::session::{ConversationId, MessageId};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Extra time on top of the long-poll timeout before the HTTP request gives up
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Timeout for small JSON calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i32>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> TelegramResult<T> {
        if self.ok {
            return self
                .result
                .ok_or_else(|| TelegramError::Malformed("ok response without result".into()));
        }

        let code = self.error_code.unwrap_or(0);
        if code == 429 {
            let retry_after = self
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(1);
            return Err(TelegramError::RateLimited { retry_after });
        }

        Err(TelegramError::Api {
            code,
            description: self.description.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

impl Update {
    /// Text messages become inbound requests; everything else is dropped.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let username = message
            .chat
            .username
            .or_else(|| message.from.and_then(|u| u.username));

        Some(InboundMessage {
            conversation_id: ConversationId(message.chat.id),
            message_id: MessageId(message.message_id),
            text,
            username,
        })
    }
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Content type for an audio file, by extension.
fn audio_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("opus") | Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    /// `{api_url}/bot{token}`
    base_url: String,
    http: reqwest::Client,
    poll_timeout: Duration,
    upload_timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: &str, config: &TelegramConfig) -> TelegramResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("songbot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), token),
            http,
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> TelegramResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let parsed: ApiResponse<T> = response.json().await?;
        parsed.into_result()
    }

    /// Fetch the bot's own account.
    pub async fn get_me(&self) -> TelegramResult<User> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT).await
    }

    /// Long-poll for new updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> TelegramResult<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &request, self.poll_timeout + POLL_GRACE)
            .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<()> {
        let _: serde_json::Value = self
            .call("sendMessage", &SendMessageRequest { chat_id, text }, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Upload an audio file, streaming it from disk.
    pub async fn send_audio(&self, chat_id: i64, path: &Path) -> TelegramResult<()> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        debug!("Uploading {} ({} bytes) to {}", file_name, length, chat_id);

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("audio", audio_part(file, length, file_name, path)?);

        let response = self
            .http
            .post(self.method_url("sendAudio"))
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await?;

        let parsed: ApiResponse<serde_json::Value> = response.json().await?;
        parsed.into_result().map(|_| ())
    }
}

/// Multipart part that reads `file` lazily while the request body is sent.
fn audio_part(
    file: tokio::fs::File,
    length: u64,
    file_name: String,
    path: &Path,
) -> TelegramResult<Part> {
    let body = Body::wrap_stream(ReaderStream::new(file));
    Ok(Part::stream_with_length(body, length)
        .file_name(file_name)
        .mime_str(audio_mime(path))?)
}

/// Run `op`, retrying once when the platform asks us to slow down.
async fn with_rate_limit_retry<F, Fut>(op: F) -> TelegramResult<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = TelegramResult<()>>,
{
    match op().await {
        Err(TelegramError::RateLimited { retry_after }) => {
            warn!("Rate limited by Telegram, retrying in {}s", retry_after);
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            op().await
        }
        other => other,
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> songbot_core::Result<()> {
        with_rate_limit_retry(|| self.send_message(conversation_id.0, text)).await?;
        Ok(())
    }

    async fn send_audio(
        &self,
        conversation_id: ConversationId,
        path: &Path,
    ) -> songbot_core::Result<()> {
        with_rate_limit_retry(|| TelegramClient::send_audio(self, conversation_id.0, path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_update() {
        let raw = r#"{
            "update_id": 1001,
            "message": {
                "message_id": 55,
                "date": 1700000000,
                "chat": {"id": 4242, "type": "private", "username": "listener"},
                "from": {"id": 4242, "is_bot": false, "first_name": "L", "username": "listener"},
                "text": "https://open.spotify.com/track/abc"
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.update_id, 1001);

        let inbound = update.into_inbound().unwrap();
        assert_eq!(inbound.conversation_id, ConversationId(4242));
        assert_eq!(inbound.message_id, MessageId(55));
        assert_eq!(inbound.text, "https://open.spotify.com/track/abc");
        assert_eq!(inbound.username.as_deref(), Some("listener"));
    }

    #[test]
    fn test_non_text_update_is_dropped() {
        let raw = r#"{
            "update_id": 1002,
            "message": {
                "message_id": 56,
                "chat": {"id": -100123, "type": "group"},
                "sticker": {"file_id": "x"}
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.into_inbound().is_none());
    }

    #[test]
    fn test_group_message_falls_back_to_sender_username() {
        let raw = r#"{
            "update_id": 1003,
            "message": {
                "message_id": 57,
                "chat": {"id": -100123, "type": "group"},
                "from": {"id": 1, "is_bot": false, "first_name": "A", "username": "alice"},
                "text": "hi"
            }
        }"#;

        let inbound = serde_json::from_str::<Update>(raw)
            .unwrap()
            .into_inbound()
            .unwrap();
        assert_eq!(inbound.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_api_error_response() {
        let raw = r#"{"ok": false, "error_code": 413, "description": "Request Entity Too Large"}"#;
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();

        match response.into_result() {
            Err(TelegramError::Api { code, description }) => {
                assert_eq!(code, 413);
                assert!(description.contains("Too Large"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_response() {
        let raw = r#"{"ok": false, "error_code": 429, "description": "Too Many Requests", "parameters": {"retry_after": 7}}"#;
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();

        assert!(matches!(
            response.into_result(),
            Err(TelegramError::RateLimited { retry_after: 7 })
        ));
    }

    #[test]
    fn test_audio_mime() {
        assert_eq!(audio_mime(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(audio_mime(Path::new("a.M4A")), "audio/mp4");
        assert_eq!(audio_mime(Path::new("a.opus")), "audio/ogg");
        assert_eq!(audio_mime(Path::new("a")), "application/octet-stream");
    }

    #[test]
    fn test_method_url_trims_trailing_slash() {
        let config = TelegramConfig {
            api_url: "http://localhost:8081/".to_string(),
            ..Default::default()
        };
        let client = TelegramClient::new("123:abc", &config).unwrap();
        assert_eq!(
            client.method_url("getMe"),
            "http://localhost:8081/bot123:abc/getMe"
        );
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[tokio::test]
    async fn test_send_audio_streams_file_with_known_length() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("song.mp3");
        let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 8192];
            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                request.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find(&request, b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .expect("upload without content-length");
            while request.len() < header_end + length {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before body");
                request.extend_from_slice(&chunk[..n]);
            }

            let reply = br#"{"ok":true,"result":{"message_id":1}}"#;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reply.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(reply).await.unwrap();
            (headers, request[header_end..].to_vec())
        });

        let config = TelegramConfig {
            api_url: format!("http://{}", addr),
            ..Default::default()
        };
        let client = TelegramClient::new("123:abc", &config).unwrap();
        client.send_audio(42, &path).await.unwrap();

        let (headers, body) = server.await.unwrap();
        assert!(headers.starts_with("post /bot123:abc/sendaudio "));
        assert!(headers.contains("multipart/form-data"));

        let start = find(&body, &payload[..64]).unwrap();
        assert_eq!(&body[start..start + payload.len()], payload.as_slice());

        let preamble = String::from_utf8_lossy(&body[..start]);
        assert!(preamble.contains("filename=\"song.mp3\""));
        assert!(preamble.contains("audio/mpeg"));
        assert!(preamble.contains("42"));
    }

    #[tokio::test]
    async fn test_send_audio_missing_file_is_io_error() {
        let client = TelegramClient::new("123:abc", &TelegramConfig::default()).unwrap();
        let result = client.send_audio(1, Path::new("/nonexistent/song.mp3")).await;
        assert!(matches!(result, Err(TelegramError::Io(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_retry_runs_twice() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = AtomicUsize::new(0);
        let result = with_rate_limit_retry(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TelegramError::RateLimited { retry_after: 0 })
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
