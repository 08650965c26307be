//! OpenAI-compatible chat completion client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{ChatMessage, Completion, CompletionRequest, LlmClient, Usage};

/// Client for `/chat/completions` on OpenAI or any API speaking the same protocol.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    streaming: bool,
    token_sink: Option<mpsc::UnboundedSender<String>>,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            streaming: false,
            token_sink: None,
        }
    }

    /// Request server-sent events instead of a single JSON body.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Forward every streamed token to `sink` as it arrives.
    pub fn with_token_sink(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.token_sink = Some(sink);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn complete_blocking(&self, body: &RequestBody<'_>) -> anyhow::Result<Completion> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM API error ({}): {}", status, text));
        }

        let text = response.text().await?;
        parse_response(&text)
    }

    async fn complete_streaming(&self, body: &RequestBody<'_>) -> anyhow::Result<Completion> {
        let request = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body);

        let mut source = EventSource::new(request)
            .map_err(|e| anyhow::anyhow!("Failed to open event stream: {}", e))?;

        let mut completion = Completion::default();

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data.trim() == "[DONE]" {
                        break;
                    }
                    let chunk = parse_stream_chunk(&message.data)?;
                    if let Some(delta) = chunk.delta {
                        if let Some(sink) = &self.token_sink {
                            let _ = sink.send(delta.clone());
                        }
                        completion.content.push_str(&delta);
                    }
                    if chunk.finish_reason.is_some() {
                        completion.finish_reason = chunk.finish_reason;
                    }
                    if chunk.usage.is_some() {
                        completion.usage = chunk.usage;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    source.close();
                    let text = response.text().await.unwrap_or_default();
                    return Err(anyhow::anyhow!("LLM API error ({}): {}", status, text));
                }
                Err(e) => {
                    source.close();
                    return Err(anyhow::anyhow!("LLM stream error: {}", e));
                }
            }
        }
        source.close();

        Ok(completion)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
        let body = RequestBody::new(request, self.streaming);
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            streaming = self.streaming,
            "Requesting chat completion"
        );

        if self.streaming {
            self.complete_streaming(&body).await
        } else {
            self.complete_blocking(&body).await
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    stream: bool,
}

impl<'a> RequestBody<'a> {
    fn new(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stop: (!request.stop.is_empty()).then_some(request.stop.as_slice()),
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: Option<ResponseMessage>,
    delta: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn parse_response(text: &str) -> anyhow::Result<Completion> {
    let body: ResponseBody = serde_json::from_str(text)
        .map_err(|e| anyhow::anyhow!("Malformed completion response: {}", e))?;
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Completion response has no choices"))?;

    Ok(Completion {
        content: choice.message.and_then(|m| m.content).unwrap_or_default(),
        finish_reason: choice.finish_reason,
        usage: body.usage,
    })
}

#[derive(Debug, Default)]
struct StreamChunk {
    delta: Option<String>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

fn parse_stream_chunk(data: &str) -> anyhow::Result<StreamChunk> {
    let body: ResponseBody = serde_json::from_str(data)
        .map_err(|e| anyhow::anyhow!("Malformed stream chunk: {}", e))?;
    let mut chunk = StreamChunk {
        usage: body.usage,
        ..Default::default()
    };
    if let Some(choice) = body.choices.into_iter().next() {
        chunk.delta = choice.delta.and_then(|d| d.content).filter(|s| !s.is_empty());
        chunk.finish_reason = choice.finish_reason;
    }
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use axum::http::{header, StatusCode};
    use axum::routing::post;
    use axum::Router;

    /// Serve `router` on an ephemeral port and return its `/v1` base URL.
    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.0,
            max_tokens: 10,
            stop: vec!["Observation:".into()],
        }
    }

    fn failing_server() -> Router {
        Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded") }),
        )
    }

    #[tokio::test]
    async fn streams_deltas_to_sink_until_done() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|body: String| async move {
                assert!(body.contains("\"stream\":true"), "{}", body);
                let events = [
                    r#"{"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#,
                    r#"{"choices":[{"delta":{"content":"Final "},"finish_reason":null}]}"#,
                    r#"{"choices":[{"delta":{"content":"Answer: ok"},"finish_reason":null}]}"#,
                    r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                    "[DONE]",
                    r#"{"choices":[{"delta":{"content":"ignored"},"finish_reason":null}]}"#,
                ];
                let body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
                ([(header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        );
        let base = spawn_server(router).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = OpenAiClient::new("k".into(), base)
            .with_streaming(true)
            .with_token_sink(tx);
        let completion = client.complete(&request()).await.unwrap();

        assert_eq!(completion.content, "Final Answer: ok");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));

        drop(client);
        let mut tokens = Vec::new();
        while let Some(token) = rx.recv().await {
            tokens.push(token);
        }
        assert_eq!(tokens, vec!["Final ", "Answer: ok"]);
    }

    #[tokio::test]
    async fn streaming_error_status_carries_body() {
        let base = spawn_server(failing_server()).await;
        let client = OpenAiClient::new("k".into(), base).with_streaming(true);
        let err = client.complete(&request()).await.unwrap_err().to_string();
        assert!(err.contains("500"), "{}", err);
        assert!(err.contains("model overloaded"), "{}", err);
    }

    #[tokio::test]
    async fn blocking_error_status_carries_body() {
        let base = spawn_server(failing_server()).await;
        let client = OpenAiClient::new("k".into(), base);
        let err = client.complete(&request()).await.unwrap_err().to_string();
        assert!(err.contains("500"), "{}", err);
        assert!(err.contains("model overloaded"), "{}", err);
    }

    #[tokio::test]
    async fn blocking_request_sends_stop_and_auth() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: axum::http::HeaderMap, body: String| async move {
                assert_eq!(headers[header::AUTHORIZATION], "Bearer k");
                assert!(body.contains("\"stop\":[\"Observation:\"]"), "{}", body);
                r#"{"choices":[{"message":{"content":"done"},"finish_reason":"stop"}]}"#
            }),
        );
        let base = spawn_server(router).await;
        let completion = OpenAiClient::new("k".into(), base)
            .complete(&request())
            .await
            .unwrap();
        assert_eq!(completion.content, "done");
    }

    #[test]
    fn parses_full_response() {
        let completion = parse_response(
            r#"{"choices":[{"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        )
        .unwrap();
        assert_eq!(completion.content, "hi");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn rejects_response_without_choices() {
        assert!(parse_response(r#"{"choices":[]}"#).is_err());
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn parses_stream_chunks() {
        let chunk =
            parse_stream_chunk(r#"{"choices":[{"delta":{"content":"Thou"},"finish_reason":null}]}"#)
                .unwrap();
        assert_eq!(chunk.delta.as_deref(), Some("Thou"));
        assert!(chunk.finish_reason.is_none());

        let last = parse_stream_chunk(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap();
        assert!(last.delta.is_none());
        assert_eq!(last.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn request_body_omits_empty_stop() {
        let request = CompletionRequest {
            model: "gpt".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "x".into(),
            }],
            temperature: 0.0,
            max_tokens: 10,
            stop: vec![],
        };
        let json = serde_json::to_value(RequestBody::new(&request, true)).unwrap();
        assert!(json.get("stop").is_none());
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = OpenAiClient::new("k".into(), "http://localhost:1234/v1/");
        assert_eq!(client.endpoint(), "http://localhost:1234/v1/chat/completions");
    }
}
