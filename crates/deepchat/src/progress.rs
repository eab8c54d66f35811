use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One entry of the research progress feed.
///
/// Serializes as `{"type": "<tag>", "content": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    ProgressInit { max_depth: u32, total_steps: u32 },
    DepthDelta { current: u32, max: u32 },
    ActivityDelta(Activity),
    SourceDelta(Source),
    /// Carries the final analysis text.
    Finish(String),
}

impl ProgressEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            ProgressEvent::ProgressInit { .. } => "progress-init",
            ProgressEvent::DepthDelta { .. } => "depth-delta",
            ProgressEvent::ActivityDelta(_) => "activity-delta",
            ProgressEvent::SourceDelta(_) => "source-delta",
            ProgressEvent::Finish(_) => "finish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Search,
    Extract,
    Analyze,
    Synthesis,
    Thought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub depth: u32,
    pub completed_steps: u32,
    pub total_steps: u32,
}

/// A search hit surfaced to the feed and kept for the final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub relevance: f64,
}

/// Receives progress events in emission order.
///
/// `emit` is synchronous and must not block: the research loop calls it
/// between network steps.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::ActivityDelta(a) => info!(
                kind = ?a.kind,
                status = ?a.status,
                depth = a.depth,
                completed = a.completed_steps,
                total = a.total_steps,
                "{}",
                a.message
            ),
            ProgressEvent::Finish(analysis) => info!(chars = analysis.len(), "research finished"),
            other => debug!(event = other.tag(), payload = ?other, "research progress"),
        }
    }
}

/// Forwards events to an unbounded channel. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sends each event to both sinks.
pub struct Tee<A, B>(pub A, pub B);

impl<A: ProgressSink, B: ProgressSink> ProgressSink for Tee<A, B> {
    fn emit(&self, event: ProgressEvent) {
        self.0.emit(event.clone());
        self.1.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_and_content() {
        let init = ProgressEvent::ProgressInit {
            max_depth: 3,
            total_steps: 9,
        };
        assert_eq!(
            serde_json::to_value(&init).unwrap(),
            json!({"type": "progress-init", "content": {"maxDepth": 3, "totalSteps": 9}})
        );

        let depth = ProgressEvent::DepthDelta { current: 1, max: 3 };
        assert_eq!(
            serde_json::to_value(&depth).unwrap(),
            json!({"type": "depth-delta", "content": {"current": 1, "max": 3}})
        );

        let finish = ProgressEvent::Finish("done".into());
        assert_eq!(
            serde_json::to_value(&finish).unwrap(),
            json!({"type": "finish", "content": "done"})
        );
    }

    #[test]
    fn activity_uses_camel_case_and_lowercase_enums() {
        let ts = time::macros::datetime!(2025-01-01 00:00 UTC);
        let event = ProgressEvent::ActivityDelta(Activity {
            kind: ActivityKind::Search,
            status: ActivityStatus::Pending,
            message: "Searching for: rust".into(),
            timestamp: ts,
            depth: 1,
            completed_steps: 0,
            total_steps: 9,
        });
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "activity-delta");
        assert_eq!(v["content"]["type"], "search");
        assert_eq!(v["content"]["status"], "pending");
        assert_eq!(v["content"]["completedSteps"], 0);
        assert_eq!(v["content"]["totalSteps"], 9);
        assert_eq!(v["content"]["timestamp"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn source_delta_shape() {
        let event = ProgressEvent::SourceDelta(Source {
            url: "https://a.test".into(),
            title: "A".into(),
            relevance: 1.0,
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "source-delta", "content": {"url": "https://a.test", "title": "A", "relevance": 1.0}})
        );
    }

    #[tokio::test]
    async fn channel_preserves_order_and_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelProgress::new();
        sink.emit(ProgressEvent::DepthDelta { current: 1, max: 2 });
        sink.emit(ProgressEvent::Finish("x".into()));
        assert_eq!(rx.recv().await.unwrap().tag(), "depth-delta");
        assert_eq!(rx.recv().await.unwrap().tag(), "finish");
        drop(rx);
        sink.emit(ProgressEvent::Finish("ignored".into()));
    }
}
