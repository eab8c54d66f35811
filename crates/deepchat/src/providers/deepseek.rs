//! DeepSeek chat backend. It speaks the OpenAI wire format, so only the
//! defaults differ.

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
pub struct Deepseek {
    #[schemars(with = "String")]
    #[serde(default = "Deepseek::default_base_url")]
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Deepseek {
    pub const API_KEY_NAME: &'static str = "DEEPSEEK_API_KEY";

    pub fn default_base_url() -> Url {
        Url::parse("https://api.deepseek.com/").expect("static URL is valid")
    }
}

impl OpenAIProviderConfig for Deepseek {
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

impl HTTPChatProvider for Deepseek {
    fn name(&self) -> &str {
        "deepseek"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_base_url() {
        let cfg: Deepseek = serde_json::from_value(serde_json::json!({
            "api_key": "k",
            "model": "deepseek-chat"
        }))
        .unwrap();
        assert_eq!(cfg.base_url.as_str(), "https://api.deepseek.com/");
        let req = cfg
            .chat_request(&[ChatMessage::user().content("x").build()], None, false)
            .unwrap();
        assert_eq!(req.uri(), "https://api.deepseek.com/chat/completions");
    }

    #[test]
    fn unknown_fields_rejected() {
        let res: Result<Deepseek, _> = serde_json::from_value(serde_json::json!({
            "api_key": "k",
            "model": "m",
            "bogus": 1
        }));
        assert!(res.is_err());
    }
}
