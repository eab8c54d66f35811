use crate::{
    chat::{ChatMessage, ChatResponse, StreamChunk, Tool},
    error::LLMError,
};
use http::{Request, Response};

/// A chat backend expressed as pure request builders and response parsers.
/// [`crate::adapters::LLMProviderFromHTTP`] performs the I/O.
pub trait HTTPChatProvider: Send + Sync {
    /// Stable identifier used in logs ("openai", "deepseek").
    fn name(&self) -> &str;

    fn supports_streaming(&self) -> bool {
        false
    }

    fn chat_request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        stream: bool,
    ) -> Result<Request<Vec<u8>>, LLMError>;

    fn parse_chat(&self, resp: Response<Vec<u8>>) -> Result<Box<dyn ChatResponse>, LLMError>;

    /// Parses one complete line of a server-sent event stream.
    fn parse_chat_stream_chunk(&self, chunk: &[u8]) -> Result<Vec<StreamChunk>, LLMError> {
        let _ = chunk;
        Err(LLMError::NotImplemented(
            "Streaming not supported by this provider".into(),
        ))
    }
}
