//! The two-phase turn: decide (with capabilities), then stream the answer.

use futures::FutureExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    capability::{Capability, CapabilityError, CapabilityRegistry},
    chat::ChatMessage,
    config::PromptConfig,
    error::LLMError,
    gateway::{ModelGateway, ModelRoute, OnFinish, StreamSummary, TextStream},
    persistence::TranscriptSink,
    transcript::{Transcript, TranscriptError},
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Model(#[from] LLMError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// One inbound chat turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    /// Prior conversation, oldest first, without a system prompt.
    pub messages: Vec<ChatMessage>,
    /// Pre-uploaded image URLs for the last user message.
    pub attachments: Vec<String>,
    pub capabilities: Vec<Capability>,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
            attachments: Vec::new(),
            capabilities: Capability::ALL.to_vec(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }
}

pub struct Orchestrator {
    gateway: ModelGateway,
    registry: CapabilityRegistry,
    sink: Arc<dyn TranscriptSink>,
    prompt: PromptConfig,
}

impl Orchestrator {
    pub fn new(
        gateway: ModelGateway,
        registry: CapabilityRegistry,
        sink: Arc<dyn TranscriptSink>,
        prompt: PromptConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            sink,
            prompt,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    /// Routes the request, assembles its transcript and runs the turn.
    #[instrument(name = "chat.handle", skip_all, fields(session = %request.session_id))]
    pub async fn handle(&self, request: ChatRequest) -> Result<TextStream, OrchestratorError> {
        let route = self.gateway.route(!request.attachments.is_empty())?;
        info!(
            backend = ?route.kind(),
            messages = request.messages.len(),
            attachments = request.attachments.len(),
            "handling chat request"
        );
        let transcript = Transcript::assemble(
            &self.prompt,
            request.messages,
            &request.attachments,
            route.accepts_images(),
        );
        self.run(&route, &request.session_id, transcript, &request.capabilities)
            .await
    }

    /// Runs one turn over an assembled transcript.
    ///
    /// Errors returned here mean nothing was streamed or persisted. Once the
    /// stream is open, failures only shorten it; the transcript is then
    /// persisted if the stream completed or produced any text.
    pub async fn run(
        &self,
        route: &ModelRoute,
        session_id: &str,
        transcript: Transcript,
        available: &[Capability],
    ) -> Result<TextStream, OrchestratorError> {
        let tools = self.registry.definitions(available);
        let decision = route.complete_with_tools(transcript.messages(), &tools).await?;
        debug!(
            finish_reason = ?decision.finish_reason,
            input_tokens = decision.usage.as_ref().map(|u| u.input_tokens),
            output_tokens = decision.usage.as_ref().map(|u| u.output_tokens),
            preamble = decision.text.as_deref().unwrap_or_default(),
            invocations = decision.invocations.len(),
            "decide phase finished"
        );

        let streamed = if decision.invocations.is_empty() {
            debug!("no capability invoked");
            transcript
        } else {
            let invocations = self.registry.decode_all(&decision.invocations, available)?;
            info!(
                count = invocations.len(),
                capabilities = ?invocations.iter().map(|i| i.capability().name()).collect::<Vec<_>>(),
                "executing capabilities"
            );
            let results = self.registry.execute_all(&invocations).await;
            let failed = results.iter().filter(|r| r.is_error()).count();
            if failed > 0 {
                warn!(failed, "some capabilities failed; continuing with error markers");
            }
            transcript.with_capability_turn(&decision.invocations, &results)
        };
        streamed.ensure_resolved()?;

        let on_finish = persist_on_finish(self.sink.clone(), session_id.to_string(), streamed.clone());
        Ok(route.stream_completion(streamed.messages(), on_finish).await?)
    }
}

fn persist_on_finish(sink: Arc<dyn TranscriptSink>, session_id: String, streamed: Transcript) -> OnFinish {
    Box::new(move |summary: StreamSummary| {
        async move {
            if !summary.completed() && summary.text.is_empty() {
                warn!(session = %session_id, outcome = ?summary.outcome, "stream failed before any text; not persisting");
                return;
            }
            let final_transcript = streamed.with_answer(summary.text);
            match sink.save(&session_id, final_transcript.messages()).await {
                Ok(()) => debug!(session = %session_id, messages = final_transcript.len(), "transcript persisted"),
                Err(e) => error!(session = %session_id, error = %e, "failed to persist transcript"),
            }
        }
        .boxed()
    })
}
