//! Append-only message sequences fed to the model.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::{
    ToolCall,
    capability::CapabilityResult,
    chat::{ChatMessage, ChatRole, MessageType},
    config::PromptConfig,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("invocation {0} has no result")]
    Unresolved(String),

    #[error("invocation {0} is not answered exactly once")]
    Ambiguous(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Prepends the system prompt and attaches images to the last user
    /// message when the chosen backend accepts them.
    pub fn assemble(
        prompt: &PromptConfig,
        history: Vec<ChatMessage>,
        attachments: &[String],
        accepts_images: bool,
    ) -> Self {
        let hint = match (attachments.is_empty(), accepts_images) {
            (true, _) => None,
            (false, true) => Some(prompt.vision_hint.as_str()),
            (false, false) => Some(prompt.no_vision_hint.as_str()),
        };
        let system = match hint {
            Some(hint) if !hint.is_empty() => format!("{}\n\n{}", prompt.system, hint),
            _ => prompt.system.clone(),
        };

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system().content(system).build());
        messages.extend(history);

        if accepts_images && !attachments.is_empty() {
            if let Some(last) = messages.last_mut().filter(|m| m.role == ChatRole::User) {
                last.message_type = MessageType::ImageURLs(attachments.to_vec());
            }
        }
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// One assistant message carrying every invocation, then one result per
    /// invocation in invocation order. Invocations without a result get an
    /// error marker.
    pub fn with_capability_turn(&self, invocations: &[ToolCall], results: &[CapabilityResult]) -> Self {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::assistant().tool_use(invocations.to_vec()).build());
        for call in invocations {
            let message = match results.iter().find(|r| r.invocation_id == call.id) {
                Some(result) => result.to_message(),
                None => ChatMessage::tool_result(
                    call.id.clone(),
                    call.function.name.clone(),
                    serde_json::json!({ "error": "no result produced" }).to_string(),
                ),
            };
            messages.push(message);
        }
        Self { messages }
    }

    /// The transcript with the final assistant answer appended.
    pub fn with_answer(&self, text: impl Into<String>) -> Self {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::assistant().content(text).build());
        Self { messages }
    }

    /// Checks that every invocation id is unique and has exactly one result.
    pub fn ensure_resolved(&self) -> Result<(), TranscriptError> {
        let mut pending: Vec<&str> = Vec::new();
        let mut answers: HashMap<&str, usize> = HashMap::new();
        for message in &self.messages {
            match &message.message_type {
                MessageType::ToolUse(calls) => pending.extend(calls.iter().map(|c| c.id.as_str())),
                MessageType::ToolResult(r) => *answers.entry(r.call_id.as_str()).or_default() += 1,
                _ => {}
            }
        }
        let mut seen = HashSet::new();
        for id in pending {
            if !seen.insert(id) {
                return Err(TranscriptError::Ambiguous(id.to_string()));
            }
            match answers.get(id).copied().unwrap_or_default() {
                0 => return Err(TranscriptError::Unresolved(id.to_string())),
                1 => {}
                _ => return Err(TranscriptError::Ambiguous(id.to_string())),
            }
        }
        Ok(())
    }
}

impl From<Vec<ChatMessage>> for Transcript {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self::new(messages)
    }
}
