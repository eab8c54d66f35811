use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{info, instrument, warn};

use super::{
    Capability, CapabilityError, CapabilityInput, CapabilityInvocation, CapabilityResult,
    CapabilityValue, WeatherClient,
};
use crate::{
    ToolCall,
    chat::Tool,
    config::{Config, Credentials},
    progress::ProgressSink,
    research::{FirecrawlClient, ResearchAgent, ResearchLimits},
};

/// Executes one kind of capability.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn execute(&self, input: &CapabilityInput) -> Result<Value, CapabilityError>;
}

/// Fixed mapping from [`Capability`] to its executor.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    handlers: HashMap<Capability, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, capability: Capability, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.handlers.insert(capability, handler);
        self
    }

    /// Firecrawl-backed research and Open-Meteo weather.
    ///
    /// Research is registered even without a Firecrawl key; its runs then
    /// fail with a not-configured report.
    pub fn from_config(config: &Config, creds: &Credentials, progress: Arc<dyn ProgressSink>) -> Self {
        let firecrawl = FirecrawlClient::new(
            config.research.firecrawl_base_url.clone(),
            creds.firecrawl_api_key.clone(),
        );
        let agent = ResearchAgent::new(
            Arc::new(firecrawl),
            progress,
            ResearchLimits::from(&config.research),
        );
        let weather = WeatherClient::new(config.weather.base_url.clone());
        info!(
            firecrawl = creds.firecrawl_api_key.is_some(),
            "capabilities registered"
        );
        Self::new()
            .with_handler(Capability::DeepResearch, Arc::new(agent))
            .with_handler(Capability::Weather, Arc::new(weather))
    }

    /// Registered capabilities, in declaration order.
    pub fn registered(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.handlers.contains_key(c))
            .collect()
    }

    fn exposed(&self, available: &[Capability]) -> Vec<Capability> {
        self.registered()
            .into_iter()
            .filter(|c| available.contains(c))
            .collect()
    }

    /// Tool definitions for the capabilities that are both registered and
    /// available for this request.
    pub fn definitions(&self, available: &[Capability]) -> Vec<Tool> {
        self.exposed(available)
            .into_iter()
            .map(Capability::definition)
            .collect()
    }

    /// Decodes every call up front; the first invalid one fails the batch.
    pub fn decode_all(
        &self,
        calls: &[ToolCall],
        available: &[Capability],
    ) -> Result<Vec<CapabilityInvocation>, CapabilityError> {
        let mut ids = HashSet::new();
        if let Some(dup) = calls.iter().find(|c| !ids.insert(c.id.as_str())) {
            return Err(CapabilityError::DuplicateInvocation(dup.id.clone()));
        }
        let exposed = self.exposed(available);
        calls
            .iter()
            .map(|call| CapabilityInvocation::decode(call, &exposed))
            .collect()
    }

    #[instrument(name = "capability.execute", skip_all, fields(capability = %invocation.capability(), id = %invocation.id))]
    pub async fn execute(&self, invocation: &CapabilityInvocation) -> CapabilityResult {
        let capability = invocation.capability();
        let outcome = match self.handlers.get(&capability) {
            Some(handler) => handler.execute(&invocation.input).await,
            None => Err(CapabilityError::Unknown(capability.name().to_string())),
        };
        let value = match outcome {
            Ok(value) => CapabilityValue::Ok(value),
            Err(e) => {
                warn!(error = %e, "capability failed");
                CapabilityValue::Error(e.to_string())
            }
        };
        CapabilityResult {
            invocation_id: invocation.id.clone(),
            capability,
            value,
        }
    }

    /// Runs all invocations concurrently; results keep invocation order.
    pub async fn execute_all(&self, invocations: &[CapabilityInvocation]) -> Vec<CapabilityResult> {
        join_all(invocations.iter().map(|inv| self.execute(inv))).await
    }
}
