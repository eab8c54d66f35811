use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CapabilityError, CapabilityHandler, CapabilityInput};
use crate::research::ResearchAgent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchInput {
    /// The topic or question to research
    pub topic: String,
}

impl ResearchInput {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("topic must not be empty".to_string());
        }
        Ok(())
    }
}

/// The research report is the capability value, failed runs included.
#[async_trait]
impl CapabilityHandler for ResearchAgent {
    async fn execute(&self, input: &CapabilityInput) -> Result<Value, CapabilityError> {
        let CapabilityInput::DeepResearch(input) = input else {
            return Err(CapabilityError::Execution(format!(
                "research cannot handle {}",
                input.capability()
            )));
        };
        let report = self.run(input.topic.trim()).await;
        serde_json::to_value(report).map_err(|e| CapabilityError::Execution(e.to_string()))
    }
}
