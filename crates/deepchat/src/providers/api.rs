//! Wire format shared by OpenAI-compatible chat completion endpoints.

use either::*;
use http::{
    Method, Request, Response,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    ToolCall, Usage,
    chat::{ChatMessage, ChatResponse, ChatRole, FinishReason, MessageType, StreamChunk, Tool},
    error::{LLMError, check_status},
};

/// Individual message in an OpenAI chat conversation.
#[derive(Serialize, Debug)]
struct OpenAIChatMessage<'a> {
    role: &'a str,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "either::serde_untagged_optional"
    )]
    content: Option<Either<Vec<MessageContent<'a>>, &'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIFunctionCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize, Debug)]
struct OpenAIFunctionPayload<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize, Debug)]
struct OpenAIFunctionCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    content_type: &'a str,
    function: OpenAIFunctionPayload<'a>,
}

#[derive(Serialize, Debug)]
struct MessageContent<'a> {
    #[serde(rename = "type")]
    message_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<ImageUrlContent<'a>>,
}

#[derive(Serialize, Debug)]
struct ImageUrlContent<'a> {
    url: &'a str,
}

/// Request payload for OpenAI's chat API endpoint.
#[derive(Serialize, Debug)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Deserialize, Debug, Clone)]
struct OpenAIRawUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAIRawUsage> for Usage {
    fn from(raw: OpenAIRawUsage) -> Self {
        Usage {
            input_tokens: raw.prompt_tokens,
            output_tokens: raw.completion_tokens,
        }
    }
}

/// Response from OpenAI's chat API endpoint.
#[derive(Deserialize, Debug)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChatChoice>,
    usage: Option<OpenAIRawUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: OpenAIChatMsg,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatMsg {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

impl ChatResponse for OpenAIChatResponse {
    fn text(&self) -> Option<String> {
        self.choices.first().and_then(|c| c.message.content.clone())
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        self.choices
            .first()
            .and_then(|c| c.message.tool_calls.clone())
    }

    fn usage(&self) -> Option<Usage> {
        self.usage.clone().map(Into::into)
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .map(FinishReason::from_wire)
    }
}

impl std::fmt::Display for OpenAIChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(choice) = self.choices.first() else {
            return Ok(());
        };
        if let Some(calls) = &choice.message.tool_calls {
            for call in calls {
                writeln!(f, "{}({})", call.function.name, call.function.arguments)?;
            }
        }
        if let Some(content) = &choice.message.content {
            write!(f, "{}", content)?;
        }
        Ok(())
    }
}

pub trait OpenAIProviderConfig {
    fn api_key(&self) -> &str;
    fn base_url(&self) -> &Url;
    fn model(&self) -> &str;
    fn max_tokens(&self) -> Option<&u32>;
    fn temperature(&self) -> Option<&f32>;
}

fn api_message<'a>(msg: &'a ChatMessage) -> OpenAIChatMessage<'a> {
    match &msg.message_type {
        MessageType::ToolResult(result) => OpenAIChatMessage {
            role: "tool",
            content: Some(Right(msg.content.as_str())),
            tool_calls: None,
            tool_call_id: Some(result.call_id.as_str()),
        },
        MessageType::ToolUse(calls) => OpenAIChatMessage {
            role: "assistant",
            content: (!msg.content.is_empty()).then_some(Right(msg.content.as_str())),
            tool_calls: Some(
                calls
                    .iter()
                    .map(|c| OpenAIFunctionCall {
                        id: &c.id,
                        content_type: "function",
                        function: OpenAIFunctionPayload {
                            name: &c.function.name,
                            arguments: &c.function.arguments,
                        },
                    })
                    .collect(),
            ),
            tool_call_id: None,
        },
        MessageType::ImageURLs(urls) => {
            let mut parts = vec![MessageContent {
                message_type: "text",
                text: Some(msg.content.as_str()),
                image_url: None,
            }];
            parts.extend(urls.iter().map(|url| MessageContent {
                message_type: "image_url",
                text: None,
                image_url: Some(ImageUrlContent { url: url.as_str() }),
            }));
            OpenAIChatMessage {
                role: role_str(msg.role),
                content: Some(Left(parts)),
                tool_calls: None,
                tool_call_id: None,
            }
        }
        MessageType::Text => OpenAIChatMessage {
            role: role_str(msg.role),
            content: Some(Right(msg.content.as_str())),
            tool_calls: None,
            tool_call_id: None,
        },
    }
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

pub fn openai_chat_request<C: OpenAIProviderConfig>(
    cfg: &C,
    messages: &[ChatMessage],
    tools: Option<&[Tool]>,
    stream: bool,
) -> Result<Request<Vec<u8>>, LLMError> {
    let token = cfg.api_key();
    if token.is_empty() {
        return Err(LLMError::AuthError("Missing API key".to_string()));
    }

    let tools = tools.filter(|t| !t.is_empty());
    let body = OpenAIChatRequest {
        model: cfg.model(),
        messages: messages.iter().map(api_message).collect(),
        max_tokens: cfg.max_tokens().copied(),
        temperature: cfg.temperature().copied(),
        stream,
        tools,
        tool_choice: tools.map(|_| "auto"),
    };

    let json_body = serde_json::to_vec(&body)?;
    let url = cfg
        .base_url()
        .join("chat/completions")
        .map_err(|e| LLMError::HttpError(e.to_string()))?;

    Ok(Request::builder()
        .method(Method::POST)
        .uri(url.to_string())
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .body(json_body)?)
}

pub fn openai_parse_chat(response: Response<Vec<u8>>) -> Result<Box<dyn ChatResponse>, LLMError> {
    check_status(response.status(), response.body())?;

    match serde_json::from_slice::<OpenAIChatResponse>(response.body()) {
        Ok(parsed) => Ok(Box::new(parsed)),
        Err(e) => Err(LLMError::ResponseFormatError {
            message: format!("Failed to decode API response: {}", e),
            raw_response: String::from_utf8_lossy(response.body()).into_owned(),
        }),
    }
}

/// Streaming response chunk from OpenAI's API
#[derive(Deserialize, Debug)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAIRawUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse an OpenAI SSE chunk into StreamChunk events.
///
/// Only `data:` lines are considered. `[DONE]` and a `finish_reason`
/// both end the stream; at most one `Done` is produced per call.
pub fn parse_openai_sse_chunk(chunk: &[u8]) -> Result<Vec<StreamChunk>, LLMError> {
    if chunk.is_empty() {
        return Ok(Vec::new());
    }

    let text = String::from_utf8_lossy(chunk);
    let mut results = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            continue;
        };

        if data == "[DONE]" {
            results.push(StreamChunk::Done {
                stop_reason: "stop".to_string(),
            });
            break;
        }

        let parsed: OpenAIStreamChunk =
            serde_json::from_str(data).map_err(|e| LLMError::ResponseFormatError {
                message: format!("Failed to parse stream chunk: {}", e),
                raw_response: data.to_string(),
            })?;

        let mut finished = None;
        for choice in parsed.choices {
            if let Some(content) = choice.delta.content
                && !content.is_empty()
            {
                results.push(StreamChunk::Text(content));
            }
            if let Some(reason) = choice.finish_reason {
                finished = Some(reason);
            }
        }
        if let Some(usage) = parsed.usage {
            results.push(StreamChunk::Usage(usage.into()));
        }
        if let Some(stop_reason) = finished {
            results.push(StreamChunk::Done { stop_reason });
            break;
        }
    }

    Ok(results)
}
