//! Backend selection and the two model calls the orchestrator makes.

use futures::{Stream, StreamExt, future::BoxFuture};
use std::{pin::Pin, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use crate::{
    ToolCall, Usage,
    adapters::LLMProviderFromHTTP,
    chat::{ChatMessage, ChatProvider, FinishReason, StreamChunk, Tool},
    config::{Credentials, ModelsConfig},
    error::LLMError,
    providers::{Deepseek, OpenAI},
};

/// Text deltas of the answer phase, in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Invoked once, after the last delta has been produced.
pub type OnFinish = Box<dyn FnOnce(StreamSummary) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Accepts image references.
    Vision,
    /// Text only.
    Text,
}

/// Outcome of the non-streaming decide call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    /// Preamble the model wrote alongside (or instead of) its invocations.
    pub text: Option<String>,
    pub invocations: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

#[derive(Debug)]
pub enum StreamOutcome {
    Completed { stop_reason: Option<String> },
    /// The provider failed after the stream was opened.
    Interrupted(LLMError),
}

#[derive(Debug)]
pub struct StreamSummary {
    /// Concatenation of every delta that was produced.
    pub text: String,
    pub outcome: StreamOutcome,
}

impl StreamSummary {
    pub fn completed(&self) -> bool {
        matches!(self.outcome, StreamOutcome::Completed { .. })
    }
}

/// Holds the configured backends and picks one per request.
#[derive(Clone, Default)]
pub struct ModelGateway {
    vision: Option<Arc<dyn ChatProvider>>,
    text: Option<Arc<dyn ChatProvider>>,
}

impl ModelGateway {
    pub fn new(vision: Option<Arc<dyn ChatProvider>>, text: Option<Arc<dyn ChatProvider>>) -> Self {
        Self { vision, text }
    }

    /// Builds the OpenAI (vision) and DeepSeek (text) backends for whichever
    /// keys are present.
    pub fn from_config(models: &ModelsConfig, creds: &Credentials) -> Self {
        let vision = creds.openai_api_key.as_ref().map(|key| {
            let provider = OpenAI {
                base_url: models.openai_base_url.clone(),
                api_key: key.clone(),
                model: models.vision_model.clone(),
                max_tokens: models.max_tokens,
                temperature: Some(models.temperature),
            };
            Arc::new(LLMProviderFromHTTP::new(Arc::new(provider))) as Arc<dyn ChatProvider>
        });
        let text = creds.deepseek_api_key.as_ref().map(|key| {
            let provider = Deepseek {
                base_url: models.deepseek_base_url.clone(),
                api_key: key.clone(),
                model: models.text_model.clone(),
                max_tokens: models.max_tokens,
                temperature: Some(models.temperature),
            };
            Arc::new(LLMProviderFromHTTP::new(Arc::new(provider))) as Arc<dyn ChatProvider>
        });
        info!(
            vision = vision.is_some(),
            text = text.is_some(),
            "model backends configured"
        );
        Self { vision, text }
    }

    pub fn is_configured(&self) -> bool {
        self.vision.is_some() || self.text.is_some()
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    /// Chooses the backend for one request.
    ///
    /// Attachments go to the vision backend when it exists. Otherwise the
    /// text backend is preferred, falling back to the vision backend.
    pub fn route(&self, has_attachments: bool) -> Result<ModelRoute, LLMError> {
        let picked = match (&self.vision, &self.text) {
            (Some(v), _) if has_attachments => Some((BackendKind::Vision, v)),
            (_, Some(t)) => Some((BackendKind::Text, t)),
            (Some(v), None) => Some((BackendKind::Vision, v)),
            (None, None) => None,
        };
        let (kind, provider) = picked.ok_or_else(|| {
            LLMError::MissingConfiguration(format!(
                "set {} or {}",
                OpenAI::API_KEY_NAME,
                Deepseek::API_KEY_NAME
            ))
        })?;
        debug!(?kind, has_attachments, "selected model backend");
        Ok(ModelRoute {
            kind,
            provider: provider.clone(),
        })
    }
}

/// The backend chosen for one request. Both phases of a turn use it.
#[derive(Clone)]
pub struct ModelRoute {
    kind: BackendKind,
    provider: Arc<dyn ChatProvider>,
}

impl ModelRoute {
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn accepts_images(&self) -> bool {
        self.kind == BackendKind::Vision
    }

    #[instrument(name = "gateway.complete_with_tools", skip_all, fields(backend = ?self.kind))]
    pub async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<Decision, LLMError> {
        let tools = (!tools.is_empty()).then_some(tools);
        let resp = self.provider.chat_with_tools(messages, tools).await?;
        Ok(Decision {
            text: resp.text().filter(|t| !t.is_empty()),
            invocations: resp.tool_calls().unwrap_or_default(),
            finish_reason: resp.finish_reason(),
            usage: resp.usage(),
        })
    }

    /// Opens a tool-free stream over `messages`.
    ///
    /// Failing to open the stream is returned directly. Once open, deltas are
    /// forwarded as they arrive and `on_finish` runs after the last one,
    /// before the returned stream ends.
    #[instrument(name = "gateway.stream_completion", skip_all, fields(backend = ?self.kind))]
    pub async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        on_finish: OnFinish,
    ) -> Result<TextStream, LLMError> {
        let mut upstream = self.provider.chat_stream_with_tools(messages, None).await?;
        let (tx, rx) = mpsc::channel::<String>(64);

        tokio::spawn(async move {
            let mut text = String::new();
            let mut receiver_gone = false;
            let outcome = loop {
                match upstream.next().await {
                    Some(Ok(StreamChunk::Text(delta))) => {
                        text.push_str(&delta);
                        if !receiver_gone && tx.send(delta).await.is_err() {
                            // keep accumulating so the transcript is complete
                            debug!("stream consumer dropped");
                            receiver_gone = true;
                        }
                    }
                    Some(Ok(StreamChunk::Usage(usage))) => {
                        debug!(
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            "stream usage"
                        );
                    }
                    Some(Ok(StreamChunk::Done { stop_reason })) => {
                        break StreamOutcome::Completed {
                            stop_reason: Some(stop_reason),
                        };
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, chars = text.len(), "stream interrupted");
                        break StreamOutcome::Interrupted(e);
                    }
                    None => break StreamOutcome::Completed { stop_reason: None },
                }
            };
            on_finish(StreamSummary { text, outcome }).await;
            drop(tx);
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedProvider;
    use crate::FunctionCall;
    use futures::FutureExt;
    use std::sync::Mutex;

    fn gateway(vision: bool, text: bool) -> (ModelGateway, Arc<ScriptedProvider>, Arc<ScriptedProvider>) {
        let v = Arc::new(ScriptedProvider::new().with_stream(vec!["vision"]));
        let t = Arc::new(ScriptedProvider::new().with_stream(vec!["text"]));
        let gw = ModelGateway::new(
            vision.then(|| v.clone() as Arc<dyn ChatProvider>),
            text.then(|| t.clone() as Arc<dyn ChatProvider>),
        );
        (gw, v, t)
    }

    #[test]
    fn attachments_prefer_vision() {
        let (gw, _, _) = gateway(true, true);
        assert_eq!(gw.route(true).unwrap().kind(), BackendKind::Vision);
        assert_eq!(gw.route(false).unwrap().kind(), BackendKind::Text);
    }

    #[test]
    fn attachments_without_vision_use_text() {
        let (gw, _, _) = gateway(false, true);
        let route = gw.route(true).unwrap();
        assert_eq!(route.kind(), BackendKind::Text);
        assert!(!route.accepts_images());
    }

    #[test]
    fn vision_only_serves_text_requests() {
        let (gw, _, _) = gateway(true, false);
        assert_eq!(gw.route(false).unwrap().kind(), BackendKind::Vision);
    }

    #[test]
    fn no_backends_is_missing_configuration() {
        let gw = ModelGateway::default();
        assert!(!gw.is_configured());
        assert!(matches!(
            gw.route(false).err(),
            Some(LLMError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn from_config_respects_present_keys() {
        let creds = Credentials {
            deepseek_api_key: Some("k".into()),
            ..Default::default()
        };
        let gw = ModelGateway::from_config(&ModelsConfig::default(), &creds);
        assert!(gw.is_configured());
        assert!(!gw.has_vision());
    }

    #[tokio::test]
    async fn decide_returns_invocations() {
        let call = ToolCall {
            id: "c1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "getWeather".into(),
                arguments: "{}".into(),
            },
        };
        let provider = Arc::new(ScriptedProvider::new().with_tool_calls(vec![call.clone()]));
        let gw = ModelGateway::new(None, Some(provider.clone()));
        let decision = gw
            .route(false)
            .unwrap()
            .complete_with_tools(&[ChatMessage::user().content("hi").build()], &[])
            .await
            .unwrap();
        assert_eq!(decision.invocations, vec![call]);
        assert_eq!(decision.text, None);
        assert_eq!(decision.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(decision.usage, None);
    }

    #[tokio::test]
    async fn stream_forwards_deltas_then_calls_finish() {
        let provider = Arc::new(ScriptedProvider::new().with_stream(vec!["Hel", "lo"]));
        let gw = ModelGateway::new(None, Some(provider));
        let seen: Arc<Mutex<Option<(String, bool)>>> = Arc::default();
        let seen_cb = seen.clone();
        let on_finish: OnFinish = Box::new(move |summary| {
            async move {
                *seen_cb.lock().unwrap() = Some((summary.text.clone(), summary.completed()));
            }
            .boxed()
        });

        let stream = gw
            .route(false)
            .unwrap()
            .stream_completion(&[ChatMessage::user().content("hi").build()], on_finish)
            .await
            .unwrap();
        let deltas: Vec<String> = stream.collect().await;

        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(*seen.lock().unwrap(), Some(("Hello".to_string(), true)));
    }

    #[tokio::test]
    async fn interrupted_stream_reports_partial_text() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_stream(vec!["partial"])
                .with_stream_error("connection reset"),
        );
        let gw = ModelGateway::new(None, Some(provider));
        let seen: Arc<Mutex<Option<(String, bool)>>> = Arc::default();
        let seen_cb = seen.clone();
        let on_finish: OnFinish = Box::new(move |summary| {
            async move {
                *seen_cb.lock().unwrap() = Some((summary.text.clone(), summary.completed()));
            }
            .boxed()
        });

        let stream = gw
            .route(false)
            .unwrap()
            .stream_completion(&[], on_finish)
            .await
            .unwrap();
        let deltas: Vec<String> = stream.collect().await;

        assert_eq!(deltas, vec!["partial"]);
        assert_eq!(*seen.lock().unwrap(), Some(("partial".to_string(), false)));
    }

    #[tokio::test]
    async fn stream_that_cannot_open_fails() {
        let provider = Arc::new(ScriptedProvider::new().failing_stream_open("down"));
        let gw = ModelGateway::new(None, Some(provider));
        let res = gw
            .route(false)
            .unwrap()
            .stream_completion(&[], Box::new(|_| async {}.boxed()))
            .await;
        assert!(res.is_err());
    }
}
