//! Helper sinks and fixtures

use std::sync::Mutex;

use crate::progress::{Activity, ProgressEvent, ProgressSink};

/// Keeps every progress event in emission order.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.events().iter().map(ProgressEvent::tag).collect()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.tags().into_iter().filter(|t| *t == tag).count()
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::ActivityDelta(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.activities().into_iter().map(|a| a.message).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
