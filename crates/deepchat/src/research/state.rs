use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{config::ResearchConfig, progress::Source};

/// Steps per round: search, extract, analyze.
pub const STEPS_PER_DEPTH: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResearchLimits {
    pub max_depth: u32,
    pub max_links_per_depth: usize,
    pub max_duration: Duration,
    pub step_timeout: Option<Duration>,
    pub retry_backoff: Duration,
}

impl Default for ResearchLimits {
    fn default() -> Self {
        (&ResearchConfig::default()).into()
    }
}

impl From<&ResearchConfig> for ResearchLimits {
    fn from(cfg: &ResearchConfig) -> Self {
        Self {
            max_depth: cfg.max_depth,
            max_links_per_depth: cfg.max_links_per_depth,
            max_duration: cfg.max_duration(),
            step_timeout: cfg.step_timeout(),
            retry_backoff: cfg.retry_backoff(),
        }
    }
}

/// Mutable state of a single research run. Owned by the running agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchState {
    pub topic: String,
    pub findings: Vec<String>,
    pub summaries: Vec<String>,
    pub current_depth: u32,
    pub next_topic: String,
    pub completed_steps: u32,
    pub total_expected_steps: u32,
    pub sources: Vec<Source>,
}

impl ResearchState {
    pub fn new(topic: impl Into<String>, max_depth: u32) -> Self {
        let topic = topic.into();
        Self {
            next_topic: topic.clone(),
            topic,
            findings: Vec::new(),
            summaries: Vec::new(),
            current_depth: 0,
            completed_steps: 0,
            total_expected_steps: max_depth.saturating_mul(STEPS_PER_DEPTH),
            sources: Vec::new(),
        }
    }

    /// Counts one finished step, never exceeding the expected total.
    pub fn complete_step(&mut self) {
        self.completed_steps = (self.completed_steps + 1).min(self.total_expected_steps);
    }

    /// Fixed template for the follow-up search.
    pub fn follow_up_topic(&self) -> String {
        format!("{} detailed analysis", self.topic)
    }

    pub fn round_summary(&self) -> String {
        format!(
            "Found information about {} from {} sources",
            self.topic,
            self.findings.len()
        )
    }

    pub fn final_analysis(&self) -> String {
        format!(
            "Research on \"{}\" found {} relevant sources. {}",
            self.topic,
            self.findings.len(),
            self.summaries.join(" ")
        )
    }
}

/// Result handed back to the model as the capability value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: ResearchData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchData {
    pub findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub completed_steps: u32,
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

impl ResearchReport {
    pub fn completed(state: ResearchState, analysis: String) -> Self {
        Self {
            success: true,
            error: None,
            data: ResearchData {
                findings: state.findings,
                analysis: Some(analysis),
                completed_steps: state.completed_steps,
                total_steps: state.total_expected_steps,
                sources: Some(state.sources),
            },
        }
    }

    /// Partial findings survive a failed run.
    pub fn failed(state: ResearchState, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            data: ResearchData {
                findings: state.findings,
                analysis: None,
                completed_steps: state.completed_steps,
                total_steps: state.total_expected_steps,
                sources: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn total_is_three_steps_per_depth() {
        assert_eq!(ResearchState::new("t", 3).total_expected_steps, 9);
        assert_eq!(ResearchState::new("t", 0).total_expected_steps, 0);
    }

    #[test]
    fn steps_saturate_at_total() {
        let mut state = ResearchState::new("t", 1);
        for _ in 0..5 {
            state.complete_step();
        }
        assert_eq!(state.completed_steps, 3);
    }

    #[test]
    fn report_shapes() {
        let mut state = ResearchState::new("rust", 1);
        state.findings.push("body".into());
        let ok = serde_json::to_value(ResearchReport::completed(state.clone(), "a".into())).unwrap();
        assert_eq!(
            ok,
            json!({
                "success": true,
                "data": {
                    "findings": ["body"],
                    "analysis": "a",
                    "completedSteps": 0,
                    "totalSteps": 3,
                    "sources": []
                }
            })
        );

        let failed = serde_json::to_value(ResearchReport::failed(state, "boom".into())).unwrap();
        assert_eq!(
            failed,
            json!({
                "success": false,
                "error": "boom",
                "data": {"findings": ["body"], "completedSteps": 0, "totalSteps": 3}
            })
        );
    }
}
