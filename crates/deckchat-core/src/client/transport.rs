use anyhow::{Context, Result};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION};

use super::error::{ClientError, ClientResult, classify_reqwest_error};
use super::sse::SseParser;
use super::types::{ChatRequest, DeckPreview, ExportRequest, ExportedDeck};
use crate::config::Config;
use crate::events::{FinalResponse, StreamEvent};

/// Header carrying the server-assigned conversation id on stream responses.
pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// Standard User-Agent header for deckchat requests.
pub const USER_AGENT: &str = concat!("deckchat/", env!("CARGO_PKG_VERSION"));

/// Boxed stream of decoded chat events.
pub type ChatEventStream = BoxStream<'static, ClientResult<StreamEvent>>;

/// An opened chat stream.
pub struct ChatStream {
    /// Id from the response header, or the one the caller sent.
    pub conversation_id: Option<String>,
    pub events: ChatEventStream,
}

/// Analytics server client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Builds a client from the resolved server URL and timeouts in `config`.
    ///
    /// # Errors
    /// Returns an error if the server URL is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config.server_url()?;
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;
        Ok(Self::with_http(http, base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/api/chat/{id}` with the id percent-encoded as one path segment.
    fn conversation_url(&self, conversation_id: &str) -> ClientResult<url::Url> {
        let mut url = url::Url::parse(&self.url("/api/chat/"))
            .map_err(|e| ClientError::transport(format!("Invalid server URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::transport("Server URL cannot take a path"))?
            .pop_if_empty()
            .push(conversation_id);
        Ok(url)
    }

    /// Opens the chat stream for one request.
    ///
    /// Events are decoded lazily as the body is read; nothing is buffered
    /// beyond the codec's partial-record buffer.
    ///
    /// # Errors
    /// `Transport` on connection failure or non-success status,
    /// `BodyMissing` when the response declares an empty body.
    pub async fn open_stream(&self, request: &ChatRequest) -> ClientResult<ChatStream> {
        let response = self
            .http
            .post(self.url("/api/chat/stream"))
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = ensure_success(response).await?;

        if response.content_length() == Some(0) {
            return Err(ClientError::body_missing());
        }

        let conversation_id = response
            .headers()
            .get(CONVERSATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| request.conversation_id.clone());

        tracing::debug!(
            conversation_id = conversation_id.as_deref().unwrap_or("-"),
            "chat stream opened"
        );

        let events = SseParser::new(response.bytes_stream()).boxed();
        Ok(ChatStream {
            conversation_id,
            events,
        })
    }

    /// Sends one message and drives the stream to its end, calling
    /// `on_event` for every decoded event in arrival order.
    ///
    /// The next chunk is not read until `on_event` has returned.
    /// Returns the conversation id reported by the server.
    ///
    /// # Errors
    /// Any error from [`ChatClient::open_stream`], or `Transport` if the
    /// body stream breaks mid-way.
    pub async fn stream_chat<F>(
        &self,
        request: &ChatRequest,
        mut on_event: F,
    ) -> ClientResult<Option<String>>
    where
        F: FnMut(StreamEvent),
    {
        let mut stream = self.open_stream(request).await?;
        while let Some(event) = stream.events.next().await {
            on_event(event?);
        }
        Ok(stream.conversation_id)
    }

    /// Non-streaming variant: one JSON response per message.
    ///
    /// # Errors
    /// `Transport` on connection failure, non-success status, or an
    /// unreadable response body.
    pub async fn send(&self, request: &ChatRequest) -> ClientResult<FinalResponse> {
        let response = self
            .http
            .post(self.url("/api/chat/"))
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = ensure_success(response).await?;
        response
            .json::<FinalResponse>()
            .await
            .map_err(|e| ClientError::transport(format!("Invalid chat response: {e}")))
    }

    /// Asks the server to drop its history for `conversation_id`.
    ///
    /// # Errors
    /// `Transport` on connection failure or non-success status.
    pub async fn clear_conversation(&self, conversation_id: &str) -> ClientResult<()> {
        let response = self
            .http
            .delete(self.conversation_url(conversation_id)?)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Generates the presentation file for a finished deck.
    ///
    /// # Errors
    /// `Transport` on connection failure, non-success status or a broken body.
    pub async fn export_deck(&self, request: &ExportRequest<'_>) -> ClientResult<ExportedDeck> {
        let response = self
            .http
            .post(self.url("/api/presentation/generate"))
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = ensure_success(response).await?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_filename)
            .unwrap_or_else(|| default_filename(request.title));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(format!("Failed to read export body: {e}")))?;

        Ok(ExportedDeck { filename, bytes })
    }

    /// Returns the server's structural preview of a deck.
    ///
    /// # Errors
    /// `Transport` on connection failure, non-success status or a bad body.
    pub async fn preview_deck(&self, request: &ExportRequest<'_>) -> ClientResult<DeckPreview> {
        let response = self
            .http
            .post(self.url("/api/presentation/preview"))
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = ensure_success(response).await?;
        response
            .json::<DeckPreview>()
            .await
            .map_err(|e| ClientError::transport(format!("Invalid preview response: {e}")))
    }
}

async fn ensure_success(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_body = response.text().await.unwrap_or_default();
    Err(ClientError::http_status(status.as_u16(), &error_body))
}

/// Extracts the attachment filename, keeping only its final path component.
fn attachment_filename(disposition: &str) -> Option<String> {
    let name = disposition
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?
        .trim_matches('"');
    let base = name.rsplit(['/', '\\']).next()?.trim();
    (!matches!(base, "" | "." | "..")).then(|| base.to_string())
}

/// Mirrors the server's naming: spaces become underscores. Path separators
/// are replaced so the name stays a single component.
pub fn default_filename(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if matches!(c, ' ' | '/' | '\\') { '_' } else { c })
        .collect();
    format!("{stem}.pptx")
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::ClientErrorKind;

    fn sse_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_string(body.to_string())
    }

    const FINAL_ONLY: &str = "data: {\"type\":\"final\",\"conversation_id\":\"srv-1\",\"response\":\"Hi\",\"charts\":[],\"presentations\":[],\"suggestions\":[]}\n\n";

    #[tokio::test]
    async fn test_stream_chat_delivers_events_and_header_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .and(body_json(serde_json::json!({"message": "hello"})))
            .respond_with(sse_response(FINAL_ONLY).insert_header("X-Conversation-Id", "srv-1"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri());
        let mut seen = Vec::new();
        let id = client
            .stream_chat(&ChatRequest::new("hello", None), |event| seen.push(event))
            .await
            .unwrap();

        assert_eq!(id.as_deref(), Some("srv-1"));
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_terminal());
    }

    #[tokio::test]
    async fn test_stream_falls_back_to_caller_conversation_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(sse_response(FINAL_ONLY))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri());
        let stream = client
            .open_stream(&ChatRequest::new("again", Some("mine".to_string())))
            .await
            .unwrap();

        assert_eq!(stream.conversation_id.as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"detail": "agent crashed"})),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri());
        let err = client
            .stream_chat(&ChatRequest::new("hi", None), |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.kind, ClientErrorKind::Transport);
        assert_eq!(err.message, "HTTP 500: agent crashed");
    }

    #[tokio::test]
    async fn test_empty_body_is_body_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ChatClient::new(server.uri());
        let err = client
            .open_stream(&ChatRequest::new("hi", None))
            .await
            .err()
            .unwrap();

        assert_eq!(err.kind, ClientErrorKind::BodyMissing);
    }

    #[tokio::test]
    async fn test_clear_conversation_issues_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/chat/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "success", "message": "Conversation cleared"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        ChatClient::new(server.uri())
            .clear_conversation("c1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_accepts_non_streaming_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "conversation_id": "c9",
                "response": "Revenue grew 12%",
                "charts": [],
                "presentations": [],
                "suggestions": ["Break down by region"]
            })))
            .mount(&server)
            .await;

        let response = ChatClient::new(server.uri())
            .send(&ChatRequest::new("growth?", None))
            .await
            .unwrap();

        assert_eq!(response.conversation_id.as_deref(), Some("c9"));
        assert_eq!(response.response, "Revenue grew 12%");
        assert_eq!(response.suggestions.len(), 1);
    }

    #[tokio::test]
    async fn test_export_reads_filename_from_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/presentation/generate"))
            .and(header("content-type", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "content-disposition",
                        "attachment; filename=Quarterly_Review.pptx",
                    )
                    .set_body_bytes(b"PK\x03\x04deck".to_vec()),
            )
            .mount(&server)
            .await;

        let exported = ChatClient::new(server.uri())
            .export_deck(&ExportRequest {
                title: "Quarterly Review",
                slides: &[],
            })
            .await
            .unwrap();

        assert_eq!(exported.filename, "Quarterly_Review.pptx");
        assert!(exported.bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_default_filename_replaces_spaces() {
        assert_eq!(default_filename("Sales Deck 2024"), "Sales_Deck_2024.pptx");
        assert_eq!(
            attachment_filename("attachment; filename=\"a.pptx\""),
            Some("a.pptx".to_string())
        );
        assert_eq!(attachment_filename("inline"), None);
    }

    #[test]
    fn test_attachment_filename_keeps_only_the_last_component() {
        assert_eq!(
            attachment_filename("attachment; filename=../../escaped.pptx"),
            Some("escaped.pptx".to_string())
        );
        assert_eq!(
            attachment_filename("attachment; filename=\"/etc/deck.pptx\""),
            Some("deck.pptx".to_string())
        );
        assert_eq!(
            attachment_filename("attachment; filename=..\\..\\win.pptx"),
            Some("win.pptx".to_string())
        );
        assert_eq!(attachment_filename("attachment; filename=.."), None);
        assert_eq!(attachment_filename("attachment; filename=reports/"), None);
        assert_eq!(default_filename("Q3/Q4 Review"), "Q3_Q4_Review.pptx");
    }

    #[tokio::test]
    async fn test_export_with_traversal_filename_falls_back_to_title() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/presentation/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"../\"")
                    .set_body_bytes(b"PK\x03\x04".to_vec()),
            )
            .mount(&server)
            .await;

        let exported = ChatClient::new(server.uri())
            .export_deck(&ExportRequest {
                title: "Sales Deck",
                slides: &[],
            })
            .await
            .unwrap();

        assert_eq!(exported.filename, "Sales_Deck.pptx");
    }

    #[test]
    fn test_conversation_url_encodes_the_id() {
        let client = ChatClient::new("http://localhost:8000/");
        assert_eq!(
            client.conversation_url("c1").unwrap().as_str(),
            "http://localhost:8000/api/chat/c1"
        );
        assert_eq!(
            client.conversation_url("a b/../c?x").unwrap().as_str(),
            "http://localhost:8000/api/chat/a%20b%2F..%2Fc%3Fx"
        );

        let prefixed = ChatClient::new("http://localhost:8000/analytics");
        assert_eq!(
            prefixed.conversation_url("c1").unwrap().as_str(),
            "http://localhost:8000/analytics/api/chat/c1"
        );
    }
}
