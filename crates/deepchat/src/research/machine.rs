use futures::{FutureExt, future::join_all};
use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use super::{
    SearchHit, WebResearch, WebResearchError,
    state::{ResearchLimits, ResearchReport, ResearchState},
};
use crate::progress::{Activity, ActivityKind, ActivityStatus, ProgressEvent, ProgressSink, Source};

/// Runs research sessions against one backend. Holds no per-run state, so a
/// single agent can serve concurrent runs.
pub struct ResearchAgent {
    backend: Arc<dyn WebResearch>,
    sink: Arc<dyn ProgressSink>,
    limits: ResearchLimits,
}

impl ResearchAgent {
    pub fn new(
        backend: Arc<dyn WebResearch>,
        sink: Arc<dyn ProgressSink>,
        limits: ResearchLimits,
    ) -> Self {
        Self {
            backend,
            sink,
            limits,
        }
    }

    pub fn limits(&self) -> &ResearchLimits {
        &self.limits
    }

    /// Researches `topic` until the depth limit or the time budget is reached.
    ///
    /// The budget is only checked before a round starts; a round in flight
    /// always finishes. Backend errors never end the run: a failed search
    /// skips the round and a failed extraction yields no text. Synthesis runs
    /// exactly once, even if no round ran. Only a panicking backend produces
    /// a failed report, carrying the findings gathered so far.
    #[instrument(name = "research.run", skip_all, fields(topic = %topic))]
    pub async fn run(&self, topic: &str) -> ResearchReport {
        let started = Instant::now();
        let mut state = ResearchState::new(topic, self.limits.max_depth);
        info!(
            max_depth = self.limits.max_depth,
            max_links = self.limits.max_links_per_depth,
            budget = ?self.limits.max_duration,
            "starting research"
        );

        self.sink.emit(ProgressEvent::ProgressInit {
            max_depth: self.limits.max_depth,
            total_steps: state.total_expected_steps,
        });

        let outcome = AssertUnwindSafe(self.rounds(&mut state, started))
            .catch_unwind()
            .await;
        match outcome {
            Ok(()) => self.synthesize(state),
            Err(panic) => {
                let reason = panic_reason(&*panic);
                warn!(error = %reason, depth = state.current_depth, "research aborted");
                self.activity(
                    &state,
                    ActivityKind::Thought,
                    ActivityStatus::Error,
                    format!("Research failed: {reason}"),
                    state.current_depth,
                );
                ResearchReport::failed(state, reason)
            }
        }
    }

    async fn rounds(&self, state: &mut ResearchState, started: Instant) {
        let max_depth = self.limits.max_depth;

        while state.current_depth < max_depth && started.elapsed() < self.limits.max_duration {
            let depth = state.current_depth + 1;
            self.sink.emit(ProgressEvent::DepthDelta {
                current: depth,
                max: max_depth,
            });

            // search
            self.activity(
                state,
                ActivityKind::Search,
                ActivityStatus::Pending,
                format!("Searching for: {}", state.next_topic),
                depth,
            );
            let hits = match self.bounded(self.backend.search(&state.next_topic)).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, depth, "search failed");
                    self.activity(
                        state,
                        ActivityKind::Search,
                        ActivityStatus::Error,
                        format!("Search failed: {e}"),
                        depth,
                    );
                    self.back_off(started).await;
                    continue;
                }
            };
            let found = hits.len();
            let kept: Vec<SearchHit> = hits
                .into_iter()
                .take(self.limits.max_links_per_depth)
                .collect();
            for hit in &kept {
                let source = Source {
                    url: hit.url.clone(),
                    title: hit
                        .title
                        .clone()
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| hit.url.clone()),
                    relevance: 1.0,
                };
                state.sources.push(source.clone());
                self.sink.emit(ProgressEvent::SourceDelta(source));
            }
            state.complete_step();
            self.activity(
                state,
                ActivityKind::Search,
                ActivityStatus::Complete,
                format!("Found {} results for: {}", found, state.next_topic),
                depth,
            );

            // extract
            self.activity(
                state,
                ActivityKind::Extract,
                ActivityStatus::Pending,
                format!("Extracting content from {} sources", kept.len()),
                depth,
            );
            let fresh: Vec<String> = join_all(kept.iter().map(|hit| self.extract_one(&hit.url)))
                .await
                .into_iter()
                .filter(|text| !text.trim().is_empty())
                .collect();
            let extracted = fresh.len();
            state.findings.extend(fresh);
            state.complete_step();
            self.activity(
                state,
                ActivityKind::Extract,
                ActivityStatus::Complete,
                format!("Extracted content from {extracted} sources"),
                depth,
            );

            // analyze
            self.activity(
                state,
                ActivityKind::Analyze,
                ActivityStatus::Pending,
                "Analyzing findings and planning next steps".to_string(),
                depth,
            );
            let summary = state.round_summary();
            state.summaries.push(summary);
            state.next_topic = state.follow_up_topic();
            state.complete_step();
            state.current_depth += 1;
            let message = if state.current_depth < max_depth {
                format!("Analysis complete. Next: {}", state.next_topic)
            } else {
                "Analysis complete. Research complete!".to_string()
            };
            self.activity(
                state,
                ActivityKind::Analyze,
                ActivityStatus::Complete,
                message,
                state.current_depth,
            );
        }

        if state.current_depth < max_depth {
            info!(depth = state.current_depth, elapsed = ?started.elapsed(), "research budget exhausted");
        }
    }

    fn synthesize(&self, mut state: ResearchState) -> ResearchReport {
        let depth = state.current_depth;
        self.activity(
            &state,
            ActivityKind::Synthesis,
            ActivityStatus::Pending,
            "Creating final research summary".to_string(),
            depth,
        );
        let analysis = state.final_analysis();
        state.complete_step();
        self.activity(
            &state,
            ActivityKind::Synthesis,
            ActivityStatus::Complete,
            "Research completed".to_string(),
            depth,
        );
        self.sink.emit(ProgressEvent::Finish(analysis.clone()));
        info!(
            findings = state.findings.len(),
            steps = state.completed_steps,
            "research completed"
        );
        ResearchReport::completed(state, analysis)
    }

    /// Any failure becomes an empty text so the rest of the batch stands.
    async fn extract_one(&self, url: &str) -> String {
        match self.bounded(self.backend.extract(url)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url, error = %e, "extraction failed");
                String::new()
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, WebResearchError>>,
    ) -> Result<T, WebResearchError> {
        match self.limits.step_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| WebResearchError::Timeout(limit))?,
            None => call.await,
        }
    }

    async fn back_off(&self, started: Instant) {
        let remaining = self.limits.max_duration.saturating_sub(started.elapsed());
        let pause = self.limits.retry_backoff.min(remaining);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    fn activity(
        &self,
        state: &ResearchState,
        kind: ActivityKind,
        status: ActivityStatus,
        message: String,
        depth: u32,
    ) {
        self.sink.emit(ProgressEvent::ActivityDelta(Activity {
            kind,
            status,
            message,
            timestamp: OffsetDateTime::now_utc(),
            depth,
            completed_steps: state.completed_steps,
            total_steps: state.total_expected_steps,
        }));
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "research task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockWebResearch, RecordingProgress};
    use std::time::Duration;

    fn limits(max_depth: u32) -> ResearchLimits {
        ResearchLimits {
            max_depth,
            max_links_per_depth: 5,
            max_duration: Duration::from_secs(120),
            step_timeout: None,
            retry_backoff: Duration::from_millis(500),
        }
    }

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: None,
        }
    }

    #[tokio::test]
    async fn zero_depth_goes_straight_to_synthesis() {
        let mut backend = MockWebResearch::new();
        backend.expect_search().never();
        backend.expect_extract().never();
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(Arc::new(backend), sink.clone(), limits(0));

        let report = agent.run("anything").await;

        assert!(report.success);
        assert_eq!(report.data.completed_steps, 0);
        assert_eq!(report.data.total_steps, 0);
        assert_eq!(sink.tags(), vec![
            "progress-init",
            "activity-delta",
            "activity-delta",
            "finish"
        ]);
    }

    #[tokio::test]
    async fn search_results_are_truncated_but_counted() {
        let mut backend = MockWebResearch::new();
        backend.expect_search().times(1).returning(|_| {
            Ok((0..8).map(|i| hit(&format!("https://s{i}.test"))).collect())
        });
        backend
            .expect_extract()
            .times(2)
            .returning(|url| Ok(format!("text of {url}")));
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(
            Arc::new(backend),
            sink.clone(),
            ResearchLimits {
                max_links_per_depth: 2,
                ..limits(1)
            },
        );

        let report = agent.run("rust").await;

        assert_eq!(report.data.findings.len(), 2);
        assert_eq!(report.data.sources.as_ref().map(Vec::len), Some(2));
        assert_eq!(sink.count("source-delta"), 2);
        assert!(sink.messages().contains(&"Found 8 results for: rust".to_string()));
        assert!(sink.messages().contains(&"Extracting content from 2 sources".to_string()));
    }

    #[tokio::test]
    async fn follow_up_rounds_search_the_fixed_template() {
        let mut backend = MockWebResearch::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_search()
            .withf(|q| q == "tides")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![hit("https://a.test")]));
        backend
            .expect_search()
            .withf(|q| q == "tides detailed analysis")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![hit("https://b.test")]));
        backend.expect_extract().returning(|_| Ok("body".into()));
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(Arc::new(backend), sink.clone(), limits(2));

        let report = agent.run("tides").await;

        assert_eq!(report.data.completed_steps, 6);
        assert_eq!(report.data.total_steps, 6);
        let messages = sink.messages();
        assert!(messages.contains(&"Analysis complete. Next: tides detailed analysis".to_string()));
        assert!(messages.contains(&"Analysis complete. Research complete!".to_string()));
        assert_eq!(
            report.data.analysis.as_deref(),
            Some(
                "Research on \"tides\" found 2 relevant sources. \
                 Found information about tides from 1 sources \
                 Found information about tides from 2 sources"
            )
        );
    }

    #[tokio::test]
    async fn failed_extractions_are_dropped() {
        let mut backend = MockWebResearch::new();
        backend
            .expect_search()
            .returning(|_| Ok(vec![hit("https://ok.test"), hit("https://bad.test"), hit("https://blank.test")]));
        backend.expect_extract().returning(|url| match url {
            "https://ok.test" => Ok("content".into()),
            "https://blank.test" => Ok("   \n".into()),
            _ => Err(WebResearchError::Request("503".into())),
        });
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(Arc::new(backend), sink.clone(), limits(1));

        let report = agent.run("x").await;

        assert!(report.success);
        assert_eq!(report.data.findings, vec!["content".to_string()]);
        assert!(sink.messages().contains(&"Extracted content from 1 sources".to_string()));
    }

    #[tokio::test]
    async fn rejected_extraction_keeps_sibling_text() {
        let mut backend = MockWebResearch::new();
        backend
            .expect_search()
            .times(2)
            .returning(|_| Ok(vec![hit("https://ok.test"), hit("https://social.test")]));
        backend.expect_extract().returning(|url| match url {
            "https://social.test" => Err(WebResearchError::Unauthorized(
                "This website is no longer supported".into(),
            )),
            _ => Ok("useful body".into()),
        });
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(Arc::new(backend), sink.clone(), limits(2));

        let report = agent.run("x").await;

        assert!(report.success);
        assert!(report.error.is_none());
        assert_eq!(report.data.findings, vec!["useful body".to_string(); 2]);
        assert_eq!(report.data.completed_steps, 6);
        assert_eq!(report.data.total_steps, 6);
        assert_eq!(sink.count("finish"), 1);
    }

    #[tokio::test]
    async fn unauthorized_search_skips_the_round() {
        let mut backend = MockWebResearch::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(WebResearchError::Unauthorized("invalid key".into())));
        backend
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![hit("https://a.test")]));
        backend.expect_extract().returning(|_| Ok("first".into()));
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(
            Arc::new(backend),
            sink.clone(),
            ResearchLimits {
                retry_backoff: Duration::ZERO,
                ..limits(1)
            },
        );

        let report = agent.run("x").await;

        assert!(report.success);
        assert_eq!(report.data.findings, vec!["first".to_string()]);
        assert!(
            sink.messages()
                .contains(&"Search failed: unauthorized: invalid key".to_string())
        );
        assert_eq!(sink.count("depth-delta"), 2);
        assert_eq!(sink.count("finish"), 1);
    }

    #[tokio::test]
    async fn panicking_backend_fails_with_partial_findings() {
        struct Flaky;
        #[async_trait::async_trait]
        impl WebResearch for Flaky {
            async fn search(&self, q: &str) -> Result<Vec<SearchHit>, WebResearchError> {
                if q == "x" {
                    Ok(vec![hit("https://a.test")])
                } else {
                    panic!("search backend crashed")
                }
            }
            async fn extract(&self, _u: &str) -> Result<String, WebResearchError> {
                Ok("first".into())
            }
        }
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(Arc::new(Flaky), sink.clone(), limits(3));

        let report = agent.run("x").await;

        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("search backend crashed"));
        assert_eq!(report.data.findings, vec!["first".to_string()]);
        assert_eq!(report.data.completed_steps, 3);
        assert_eq!(sink.count("finish"), 0);
        let last = sink.activities().pop().unwrap();
        assert_eq!(last.kind, ActivityKind::Thought);
        assert_eq!(last.status, ActivityStatus::Error);
        assert_eq!(last.message, "Research failed: search backend crashed");
        assert_eq!(last.depth, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_search_counts_as_failure_under_step_timeout() {
        struct Slow;
        #[async_trait::async_trait]
        impl WebResearch for Slow {
            async fn search(&self, _q: &str) -> Result<Vec<SearchHit>, WebResearchError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(vec![])
            }
            async fn extract(&self, _u: &str) -> Result<String, WebResearchError> {
                Ok(String::new())
            }
        }
        let sink = Arc::new(RecordingProgress::default());
        let agent = ResearchAgent::new(
            Arc::new(Slow),
            sink.clone(),
            ResearchLimits {
                max_duration: Duration::from_secs(12),
                step_timeout: Some(Duration::from_secs(5)),
                retry_backoff: Duration::from_secs(1),
                ..limits(1)
            },
        );

        let report = agent.run("x").await;

        // 2 x (5s timeout + 1s back-off) exhausts the 12s budget
        assert!(report.success);
        assert_eq!(report.data.findings.len(), 0);
        let failures = sink
            .messages()
            .into_iter()
            .filter(|m| m.starts_with("Search failed: timed out"))
            .count();
        assert_eq!(failures, 2);
    }
}
