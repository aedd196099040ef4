//! HTTP client for the backend: streaming chat/paper endpoints plus the
//! JSON status and title endpoints.

pub mod sse;

use anyhow::Result;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::chat::events::ChatEvent;
use crate::chat::{ChatMessage, Role};
use crate::config::ExchangeSettings;
use crate::error::{ClientError, ClientResult, classify_reqwest_error};
use crate::paper::{PaperEvent, PaperStatusSnapshot};
use sse::EventDecoder;

/// Stream of decoded chat events.
pub type ChatEventStream = Box<dyn Stream<Item = ClientResult<ChatEvent>> + Send + Unpin>;

/// Stream of decoded paper events.
pub type PaperEventStream = Box<dyn Stream<Item = ClientResult<PaperEvent>> + Send + Unpin>;

/// One prior message sent as chat context.
#[derive(Debug, Clone, Serialize)]
struct HistoryMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatStreamRequest<'a> {
    message: &'a str,
    history: Vec<HistoryMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ai_role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PaperGenerateRequest<'a> {
    topic: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct PaperReviseRequest<'a> {
    paper_id: &'a str,
    instruction: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerateTitleRequest<'a> {
    user_message: &'a str,
    assistant_message: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateTitleResponse {
    title: String,
}

/// Parameters for one chat exchange request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    /// Prior conversation, excluding the message being sent.
    pub history: Vec<ChatMessage>,
    pub user_id: String,
    pub session_id: Option<String>,
    pub settings: ExchangeSettings,
}

/// Backend API client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for the given base URL (no trailing slash).
    ///
    /// # Panics
    /// In test builds, panics if `base_url` is not a loopback address. Tests
    /// must point at a mock server via `LOCKAI_BASE_URL`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();

        #[cfg(test)]
        assert!(
            base_url.starts_with("http://127.0.0.1") || base_url.starts_with("http://localhost"),
            "tests must use a local mock server, got base_url: {base_url}"
        );

        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts a chat exchange and returns the decoded event stream.
    ///
    /// # Errors
    /// Returns an error on connection failure or a non-success HTTP status.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatEventStream> {
        let history = request
            .history
            .iter()
            .map(|m| HistoryMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();

        let body = ChatStreamRequest {
            message: &request.message,
            history,
            ai_role: request.settings.role.as_deref(),
            model: request.settings.model.as_deref(),
            user_id: &request.user_id,
            session_id: request.session_id.as_deref(),
        };

        let url = format!("{}/api/chat/stream", self.base_url);
        self.open_event_stream(&url, &body).await
    }

    /// Starts a paper generation and returns the decoded event stream.
    ///
    /// # Errors
    /// Returns an error on connection failure or a non-success HTTP status.
    pub async fn paper_generate(&self, topic: &str, user_id: &str) -> Result<PaperEventStream> {
        let url = format!("{}/api/paper/generate", self.base_url);
        self.open_event_stream(&url, &PaperGenerateRequest { topic, user_id })
            .await
    }

    /// Starts a revision of an existing paper and returns the event stream.
    ///
    /// # Errors
    /// Returns an error on connection failure or a non-success HTTP status.
    pub async fn paper_revise(
        &self,
        paper_id: &str,
        instruction: &str,
    ) -> Result<PaperEventStream> {
        let url = format!("{}/api/paper/revise", self.base_url);
        self.open_event_stream(
            &url,
            &PaperReviseRequest {
                paper_id,
                instruction,
            },
        )
        .await
    }

    /// Fetches the current status of a paper record.
    ///
    /// # Errors
    /// Returns an error on connection failure, a non-success HTTP status, or
    /// an undecodable body.
    pub async fn paper_status(&self, paper_id: &str) -> Result<PaperStatusSnapshot> {
        let url = format!("{}/api/paper/status/{paper_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ClientError::http_status(status.as_u16(), &error_body).into());
        }

        Ok(response.json().await.map_err(|e| classify_reqwest_error(&e))?)
    }

    /// Asks the server for a title summarizing the first exchange.
    ///
    /// # Errors
    /// Returns an error on connection failure, a non-success HTTP status, or
    /// an undecodable body.
    pub async fn generate_title(
        &self,
        session_id: &str,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<String> {
        let url = format!("{}/api/sessions/{session_id}/generate-title", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&GenerateTitleRequest {
                user_message,
                assistant_message,
            })
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ClientError::http_status(status.as_u16(), &error_body).into());
        }

        let parsed: GenerateTitleResponse =
            response.json().await.map_err(|e| classify_reqwest_error(&e))?;
        Ok(parsed.title)
    }

    async fn open_event_stream<B, T>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Box<dyn Stream<Item = ClientResult<T>> + Send + Unpin>>
    where
        B: Serialize,
        T: serde::de::DeserializeOwned + Unpin + Send + 'static,
    {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ClientError::http_status(status.as_u16(), &error_body).into());
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::new(EventDecoder::new(byte_stream)))
    }
}
