//! Mock implementations for testing

use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
};

use crate::{
    ToolCall, Usage,
    capability::{CapabilityError, CapabilityHandler, CapabilityInput},
    chat::{ChatMessage, ChatProvider, ChatResponse, ChatStream, FinishReason, StreamChunk, Tool},
    error::LLMError,
    persistence::{PersistenceError, TranscriptSink},
    research::{SearchHit, WebResearch, WebResearchError},
};

// ============================================================================
// MockWebResearch
// ============================================================================

mock! {
    pub WebResearch {}

    #[async_trait]
    impl WebResearch for WebResearch {
        async fn search(&self, query: &str) -> Result<Vec<SearchHit>, WebResearchError>;
        async fn extract(&self, url: &str) -> Result<String, WebResearchError>;
    }
}

// ============================================================================
// MockTranscriptSink
// ============================================================================

mock! {
    pub TranscriptSink {}

    #[async_trait]
    impl TranscriptSink for TranscriptSink {
        async fn save(&self, session_id: &str, transcript: &[ChatMessage]) -> Result<(), PersistenceError>;
    }
}

// ============================================================================
// MockCapabilityHandler
// ============================================================================

mock! {
    pub CapabilityHandler {}

    #[async_trait]
    impl CapabilityHandler for CapabilityHandler {
        async fn execute(&self, input: &CapabilityInput) -> Result<Value, CapabilityError>;
    }
}

// ============================================================================
// ScriptedProvider - canned decide response and stream, records every call
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl fmt::Display for ScriptedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl ChatResponse for ScriptedResponse {
    fn text(&self) -> Option<String> {
        (!self.text.is_empty()).then(|| self.text.clone())
    }

    fn tool_calls(&self) -> Option<Vec<ToolCall>> {
        (!self.tool_calls.is_empty()).then(|| self.tool_calls.clone())
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        Some(if self.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        })
    }

    fn usage(&self) -> Option<Usage> {
        None
    }
}

type ChatCall = (Vec<ChatMessage>, Vec<Tool>);

#[derive(Default)]
pub struct ScriptedProvider {
    decide_text: String,
    tool_calls: Vec<ToolCall>,
    chat_error: Option<String>,
    deltas: Vec<String>,
    stream_error: Option<String>,
    open_error: Option<String>,
    chat_log: Arc<Mutex<Vec<ChatCall>>>,
    stream_log: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decide_text(mut self, text: &str) -> Self {
        self.decide_text = text.to_string();
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn failing_chat(mut self, message: &str) -> Self {
        self.chat_error = Some(message.to_string());
        self
    }

    pub fn with_stream(mut self, deltas: Vec<&str>) -> Self {
        self.deltas = deltas.into_iter().map(str::to_string).collect();
        self
    }

    /// The stream fails after the scripted deltas.
    pub fn with_stream_error(mut self, message: &str) -> Self {
        self.stream_error = Some(message.to_string());
        self
    }

    pub fn failing_stream_open(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    pub fn chat_calls(&self) -> Vec<ChatCall> {
        self.chat_log.lock().unwrap().clone()
    }

    pub fn stream_calls(&self) -> Vec<Vec<ChatMessage>> {
        self.stream_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        self.chat_log
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.map(<[Tool]>::to_vec).unwrap_or_default()));
        if let Some(message) = &self.chat_error {
            return Err(LLMError::ProviderError(message.clone()));
        }
        Ok(Box::new(ScriptedResponse {
            text: self.decide_text.clone(),
            tool_calls: self.tool_calls.clone(),
        }))
    }

    async fn chat_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
    ) -> Result<ChatStream, LLMError> {
        self.stream_log.lock().unwrap().push(messages.to_vec());
        if let Some(message) = &self.open_error {
            return Err(LLMError::HttpError(message.clone()));
        }
        let mut items: VecDeque<Result<StreamChunk, LLMError>> = self
            .deltas
            .iter()
            .map(|d| Ok(StreamChunk::Text(d.clone())))
            .collect();
        match &self.stream_error {
            Some(message) => items.push_back(Err(LLMError::ProviderError(message.clone()))),
            None => items.push_back(Ok(StreamChunk::Done {
                stop_reason: "stop".to_string(),
            })),
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
