use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::model::catalog::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::model::{ChatReply, ChatRequest, ModelError, SimulationModel, TokenUsage};

pub const DEFAULT_MAX_TOKENS: u32 = 1_500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiClient {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ModelError> {
        if api_key.trim().is_empty() {
            return Err(ModelError::Config("OpenAI API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;
        Ok(Self {
            api_key,
            model: model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> OpenAiChatRequest {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        messages.push(OpenAiRequestMessage {
            role: "system".to_string(),
            content: req.system.clone(),
        });
        messages.extend(req.messages.iter().map(|m| OpenAiRequestMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        OpenAiChatRequest {
            model: self.model.clone(),
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream,
            response_format: req.json_mode.then(|| ResponseFormat {
                type_: "json_object".to_string(),
            }),
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, body: &OpenAiChatRequest) -> Result<reqwest::Response, ModelError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(model = %self.model, stream = body.stream, "openai response status={status}");

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ModelError::Auth(format!(
                "openai auth failed ({status}). Check API key and account access."
            )));
        }
        if status.as_u16() == 429 {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::RateLimited(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Request(format!("openai error {status}: {text}")));
        }
        Ok(response)
    }

    async fn run_chat(&self, req: &ChatRequest) -> Result<ChatReply, ModelError> {
        let body = self.build_body(req, false);
        let response = self.send(&body).await?;
        let text = response.text().await?;

        let parsed: OpenAiChatResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::InvalidResponse(format!("openai parse failed: {e}")))?;

        let usage = parsed.usage.map(Into::into);
        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            ModelError::InvalidResponse("missing choices[0] in openai response".to_string())
        })?;

        Ok(ChatReply {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage,
        })
    }

    async fn run_chat_streaming(
        &self,
        req: &ChatRequest,
        on_delta: &mut (dyn FnMut(String) + Send),
    ) -> Result<ChatReply, ModelError> {
        let body = self.build_body(req, true);
        let response = self.send(&body).await?;

        let mut acc = StreamAccumulator::default();
        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();

        'outer: while let Some(chunk) = stream.next().await {
            lines.push(&chunk?);
            while let Some(line) = lines.next_line() {
                if process_stream_line(&line, &mut acc, on_delta) {
                    break 'outer;
                }
            }
        }

        if !acc.done {
            if let Some(rest) = lines.finish() {
                process_stream_line(&rest, &mut acc, on_delta);
            }
        }

        Ok(ChatReply {
            content: acc.content,
            finish_reason: acc.finish_reason,
            usage: acc.usage,
        })
    }
}

#[async_trait::async_trait]
impl SimulationModel for OpenAiClient {
    fn model_id(&self) -> String {
        self.model.clone()
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatReply, ModelError> {
        self.run_chat(&req).await
    }

    async fn chat_streaming(
        &self,
        req: ChatRequest,
        on_delta: &mut (dyn FnMut(String) + Send),
    ) -> Result<ChatReply, ModelError> {
        self.run_chat_streaming(&req, on_delta).await
    }
}

/// Splits a byte stream into lines. Bytes are only decoded once a whole line
/// is buffered, so a character split across network chunks survives intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line without its `\n` or `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let newline_idx = self.buf.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=newline_idx).collect();
        let line = String::from_utf8_lossy(&line);
        Some(line.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Whatever is left once the stream ends, if it is not blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buf)).into_owned();
        let rest = rest.trim_end_matches('\r');
        (!rest.trim().is_empty()).then(|| rest.to_string())
    }
}

/// Running state of one streamed completion.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub done: bool,
}

/// Feed one SSE line into the accumulator. Returns true once `[DONE]` is seen.
/// Comment lines, `event:` lines and unparseable payloads are ignored.
pub fn process_stream_line(
    line: &str,
    acc: &mut StreamAccumulator,
    on_delta: &mut (dyn FnMut(String) + Send),
) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') || trimmed.starts_with("event:") {
        return false;
    }

    let payload = trimmed
        .strip_prefix("data:")
        .map(str::trim)
        .unwrap_or(trimmed);
    if payload == "[DONE]" {
        acc.done = true;
        return true;
    }

    let chunk: OpenAiStreamChunk = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::trace!("skipping unparseable stream line: {e}");
            return false;
        }
    };

    if let Some(usage) = chunk.usage {
        acc.usage = Some(usage.into());
    }
    for choice in chunk.choices {
        if let Some(text) = choice.delta.and_then(|d| d.content) {
            if !text.is_empty() {
                acc.content.push_str(&text);
                on_delta(text);
            }
        }
        if choice.finish_reason.is_some() {
            acc.finish_reason = choice.finish_reason;
        }
    }
    false
}

#[derive(Debug, Serialize)]
pub struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiRequestMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAiRequestMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiChatResponse {
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiChoice {
    pub message: OpenAiResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(value: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: value.prompt_tokens,
            completion_tokens: value.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub delta: Option<OpenAiStreamDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OpenAiStreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}
