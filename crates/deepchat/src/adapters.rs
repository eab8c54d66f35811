use crate::{
    chat::{ChatMessage, ChatProvider, ChatResponse, ChatStream, StreamChunk, Tool, http::HTTPChatProvider},
    error::LLMError,
    outbound::{call_outbound, call_outbound_stream},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Runs a sans-IO [`HTTPChatProvider`] over the shared outbound client.
pub struct LLMProviderFromHTTP {
    inner: Arc<dyn HTTPChatProvider>,
}

impl LLMProviderFromHTTP {
    pub fn new(inner: Arc<dyn HTTPChatProvider>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Splits `buffer` on newlines, parsing every complete line and keeping the
/// unterminated tail for the next read.
fn drain_lines(
    inner: &dyn HTTPChatProvider,
    buffer: &mut Vec<u8>,
) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for i in 0..buffer.len() {
        if buffer[i] == b'\n' {
            let line = &buffer[start..i + 1];
            match inner.parse_chat_stream_chunk(line) {
                Ok(mut parsed) => chunks.append(&mut parsed),
                Err(e) => debug!(
                    provider = inner.name(),
                    line = %String::from_utf8_lossy(line),
                    error = %e,
                    "failed to parse SSE line"
                ),
            }
            start = i + 1;
        }
    }
    buffer.drain(..start);
    chunks
}

#[async_trait]
impl ChatProvider for LLMProviderFromHTTP {
    #[instrument(name = "http_adapter.chat_with_tools", skip_all)]
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        let req = self.inner.chat_request(messages, tools, false)?;
        let resp = call_outbound(req).await?;
        self.inner.parse_chat(resp)
    }

    #[instrument(name = "http_adapter.chat_stream_with_tools", skip_all)]
    async fn chat_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
    ) -> Result<ChatStream, LLMError> {
        if !self.inner.supports_streaming() {
            return Err(LLMError::NotImplemented(
                "Streaming not supported by underlying HTTP provider".into(),
            ));
        }

        let req = self.inner.chat_request(messages, tools, true)?;
        let stream = call_outbound_stream(req).await?;

        let inner = self.inner.clone();
        let s = stream
            .map(|res| res.map_err(LLMError::from))
            // flush a trailing line that lacks its newline
            .chain(futures::stream::once(futures::future::ready(Ok(
                Bytes::from_static(b"\n"),
            ))))
            .scan(Vec::new(), move |buffer, res| {
                let res = res.map(|bytes| {
                    if !bytes.is_empty() {
                        trace!(bytes = bytes.len(), "received chunk");
                    }
                    buffer.extend_from_slice(&bytes);
                    drain_lines(inner.as_ref(), buffer)
                });
                futures::future::ready(Some(res))
            })
            .flat_map(|res: Result<Vec<StreamChunk>, LLMError>| {
                let v: Vec<Result<StreamChunk, LLMError>> = match res {
                    Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures::stream::iter(v)
            });

        Ok(Box::pin(s))
    }
}
