//! Minimal Dify chat-workflow API client.
//!
//! This crate provides a focused client for Dify's chat-messages API with:
//! - Bearer-authenticated streaming requests
//! - Buffered SSE parsing that survives arbitrary chunk boundaries
//! - A small typed event model for downstream consumers
//!
//! The service emits a line-delimited event stream: each meaningful line is
//! `data: ` followed by a JSON object, terminated by the literal `[DONE]`.
//! Event payloads are produced by an uncontrolled third party, so one
//! malformed record never aborts the stream — it is dropped and decoding
//! continues with the next line.

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

/// Prefix marking a meaningful event line.
const DATA_PREFIX: &str = "data: ";

/// Sentinel payload closing the logical stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Errors that can occur when using the Dify client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Dify chat-workflow API client.
#[derive(Clone)]
pub struct Dify {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Dify {
    /// Create a new client for the given API base URL and key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create a client from the DIFY_API_URL and DIFY_API_KEY environment
    /// variables.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("DIFY_API_URL")
            .map_err(|_| Error::Config("DIFY_API_URL not set".to_string()))?;
        let api_key = std::env::var("DIFY_API_KEY").map_err(|_| Error::NoApiKey)?;
        Ok(Self::new(base_url, api_key))
    }

    /// Send a chat request and stream the decoded events.
    ///
    /// A non-2xx response surfaces as [`Error::Api`] carrying the response
    /// body. A response with no readable body yields an empty stream, not
    /// an error.
    pub async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>, Error> {
        let api_request = ApiRequest::from(&request);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(format!(
                "{}/chat-messages",
                self.base_url.trim_end_matches('/')
            ))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        // Carry the incomplete tail line across chunk boundaries.
        let stream = response
            .bytes_stream()
            .scan(LineBuffer::new(), |buffer, result| {
                let events: Vec<Result<StreamEvent, Error>> = match result {
                    Ok(bytes) => buffer
                        .feed(&bytes)
                        .into_iter()
                        .filter_map(|line| decode_event_line(&line).map(Ok))
                        .collect(),
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A chat-workflow request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Workflow input variables, passed through verbatim.
    pub inputs: Map<String, Value>,
    /// The query text for this turn.
    pub query: String,
    /// Server-side conversation to continue, once one is established.
    pub conversation_id: Option<String>,
    /// Caller identity reported to the service.
    pub user: String,
}

impl ChatRequest {
    /// Create a request with the given query and caller identity.
    pub fn new(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            inputs: Map::new(),
            query: query.into(),
            conversation_id: None,
            user: user.into(),
        }
    }

    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}

/// One decoded event from a response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// The service may attach the conversation id to any event.
    pub conversation_id: Option<String>,
}

/// What a stream event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A workflow node began; `title` is the node's display label.
    NodeStarted { title: Option<String> },
    /// An incremental text fragment for the most recently started node.
    Answer { fragment: String },
    /// A workflow node completed, possibly with output text.
    NodeFinished {
        title: Option<String>,
        text: Option<String>,
    },
    /// Any event this client does not interpret. Kept so consumers can
    /// still read the conversation id off it.
    Other,
}

// ============================================================================
// Line reassembly
// ============================================================================

/// Reassembles complete lines from a chunked byte stream.
///
/// The carry-over tail is kept as raw bytes, so a multi-byte UTF-8 code
/// point split across two chunks survives reassembly intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    tail: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line it completes.
    ///
    /// The final, unterminated portion of the input stays buffered for the
    /// next call; on stream end it is simply dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.tail.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.tail.iter().position(|&b| b == b'\n') {
            let rest = self.tail.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.tail, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

// ============================================================================
// Event decoding
// ============================================================================

/// Decode one reassembled line into a stream event.
///
/// Returns `None` for everything that is not a well-formed event line:
/// blank lines, SSE metadata, the `[DONE]` terminator (the stream is
/// logically complete, distinct from transport end), and records that fail
/// to parse. A bad record never ends the stream.
pub fn decode_event_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }

    match serde_json::from_str::<RawEvent>(payload) {
        Ok(raw) => Some(raw.into()),
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed event line");
            None
        }
    }
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    inputs: Map<String, Value>,
    query: String,
    response_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
    user: String,
}

impl From<&ChatRequest> for ApiRequest {
    fn from(request: &ChatRequest) -> Self {
        Self {
            inputs: request.inputs.clone(),
            query: request.query.clone(),
            response_mode: "streaming",
            conversation_id: request.conversation_id.clone(),
            user: request.user.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    data: Option<RawNodeData>,
}

#[derive(Debug, Deserialize)]
struct RawNodeData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    outputs: Option<RawNodeOutputs>,
}

#[derive(Debug, Deserialize)]
struct RawNodeOutputs {
    #[serde(default)]
    text: Option<String>,
}

impl From<RawEvent> for StreamEvent {
    fn from(raw: RawEvent) -> Self {
        let RawEvent {
            event,
            answer,
            conversation_id,
            data,
        } = raw;

        let kind = match event.as_deref() {
            Some("node_started") => EventKind::NodeStarted {
                title: data.and_then(|d| d.title),
            },
            Some("node_finished") => {
                let (title, outputs) = match data {
                    Some(d) => (d.title, d.outputs),
                    None => (None, None),
                };
                EventKind::NodeFinished {
                    title,
                    text: outputs.and_then(|o| o.text),
                }
            }
            // Incremental text rides on whatever event carries an `answer`
            // field, not on a dedicated event name.
            _ => match answer {
                Some(fragment) => EventKind::Answer { fragment },
                None => EventKind::Other,
            },
        };

        StreamEvent {
            kind,
            conversation_id,
        }
    }
}
