//! Decoding of `POST /api/chat` bodies, JSON or multipart.

use axum::extract::Multipart;
use deepchat::chat::{ChatMessage, ChatMessageBuilder, ChatRole};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::routes::ApiError;

const MISSING_FIELDS: &str = "Missing required fields";

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl WireMessage {
    /// Plain strings pass through; part arrays keep their text parts.
    fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }

    fn into_chat_message(self) -> ChatMessage {
        let role = match self.role.as_str() {
            "assistant" => ChatRole::Assistant,
            "system" => ChatRole::System,
            _ => ChatRole::User,
        };
        let content = self.text();
        ChatMessageBuilder::new(role).content(content).build()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonBody {
    messages: Option<Vec<WireMessage>>,
    session_id: Option<String>,
    #[serde(default)]
    attachment_urls: Option<Vec<String>>,
}

/// A validated chat request body.
#[derive(Debug)]
pub struct ChatPayload {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub attachment_urls: Vec<String>,
}

impl ChatPayload {
    fn build(
        messages: Option<Vec<WireMessage>>,
        session_id: Option<String>,
        attachment_urls: Option<Vec<String>>,
    ) -> Result<Self, ApiError> {
        let (Some(messages), Some(session_id)) = (messages, session_id.filter(|s| !s.is_empty()))
        else {
            return Err(ApiError::bad_request(MISSING_FIELDS));
        };
        Ok(Self {
            session_id,
            messages: messages
                .into_iter()
                .map(WireMessage::into_chat_message)
                .collect(),
            attachment_urls: attachment_urls.unwrap_or_default(),
        })
    }

    pub fn from_json(body: &[u8]) -> Result<Self, ApiError> {
        let body: JsonBody = serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?;
        Self::build(body.messages, body.session_id, body.attachment_urls)
    }

    /// File parts are logged and skipped; images arrive as pre-uploaded URLs.
    pub async fn from_multipart(mut form: Multipart) -> Result<Self, ApiError> {
        let mut messages = None;
        let mut session_id = None;
        let mut attachment_urls = None;

        while let Some(field) = form
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "messages" | "sessionId" | "attachmentUrls" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(e.to_string()))?;
                    match name.as_str() {
                        "messages" => {
                            messages = Some(serde_json::from_str::<Vec<WireMessage>>(&text).map_err(
                                |e| ApiError::bad_request(format!("invalid messages field: {e}")),
                            )?)
                        }
                        "sessionId" => session_id = Some(text),
                        _ => {
                            attachment_urls = Some(serde_json::from_str::<Vec<String>>(&text).map_err(
                                |e| ApiError::bad_request(format!("invalid attachmentUrls field: {e}")),
                            )?)
                        }
                    }
                }
                n if n.starts_with("file") => info!(
                    field = n,
                    file = field.file_name().unwrap_or("unnamed"),
                    "received file part; using pre-uploaded URLs"
                ),
                other => debug!(field = other, "ignoring form field"),
            }
        }
        Self::build(messages, session_id, attachment_urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn json_body_is_decoded() {
        let payload = ChatPayload::from_json(
            br#"{"messages":[{"role":"user","content":"hi"},{"role":"assistant","content":[{"type":"text","text":"yo"}]}],"sessionId":"s1","attachmentUrls":null}"#,
        )
        .unwrap();
        assert_eq!(payload.session_id, "s1");
        assert_eq!(payload.messages.len(), 2);
        assert_eq!(payload.messages[1].role, ChatRole::Assistant);
        assert_eq!(payload.messages[1].content, "yo");
        assert!(payload.attachment_urls.is_empty());
    }

    #[test]
    fn missing_fields_are_rejected() {
        for body in [
            r#"{"sessionId":"s1"}"#,
            r#"{"messages":[]}"#,
            r#"{"messages":[],"sessionId":""}"#,
        ] {
            let err = ChatPayload::from_json(body.as_bytes()).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.message, MISSING_FIELDS);
        }
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let err = ChatPayload::from_json(b"{not json").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
