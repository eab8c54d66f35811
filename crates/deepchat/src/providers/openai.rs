//! OpenAI chat backend. Used for requests that carry image attachments.

use http::{Request, Response};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use super::api::{
    OpenAIProviderConfig, openai_chat_request, openai_parse_chat, parse_openai_sse_chunk,
};
use crate::{
    chat::{ChatMessage, ChatResponse, StreamChunk, Tool, http::HTTPChatProvider},
    error::LLMError,
};

#[derive(Debug, Clone, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct OpenAI {
    #[schemars(with = "String")]
    #[serde(default = "OpenAI::default_base_url")]
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl OpenAI {
    pub const API_KEY_NAME: &'static str = "OPENAI_API_KEY";

    pub fn default_base_url() -> Url {
        Url::parse("https://api.openai.com/v1/").expect("static URL is valid")
    }
}

impl OpenAIProviderConfig for OpenAI {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> Option<&u32> {
        self.max_tokens.as_ref()
    }

    fn temperature(&self) -> Option<&f32> {
        self.temperature.as_ref()
    }
}

impl HTTPChatProvider for OpenAI {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn chat_request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        stream: bool,
    ) -> Result<Request<Vec<u8>>, LLMError> {
        openai_chat_request(self, messages, tools, stream)
    }

    fn parse_chat(&self, resp: Response<Vec<u8>>) -> Result<Box<dyn ChatResponse>, LLMError> {
        openai_parse_chat(resp)
    }

    fn parse_chat_stream_chunk(&self, chunk: &[u8]) -> Result<Vec<StreamChunk>, LLMError> {
        parse_openai_sse_chunk(chunk)
    }
}
