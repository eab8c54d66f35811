//! The closed set of capabilities a model may invoke.
//!
//! Invocations arrive as provider [`ToolCall`]s with JSON-string arguments
//! and are decoded here into typed [`CapabilityInput`]s. An unknown name or
//! malformed arguments is a validation error; a failing execution is not,
//! it becomes an error-marker result instead.

use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

use crate::{
    ToolCall,
    chat::{ChatMessage, FunctionTool, Tool},
};

pub mod registry;
pub mod research;
pub mod weather;

pub use registry::{CapabilityHandler, CapabilityRegistry};
pub use research::ResearchInput;
pub use weather::{WeatherClient, WeatherInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "deepResearch")]
    DeepResearch,
    #[serde(rename = "getWeather")]
    Weather,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::DeepResearch, Capability::Weather];

    pub fn name(self) -> &'static str {
        match self {
            Capability::DeepResearch => "deepResearch",
            Capability::Weather => "getWeather",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Capability::DeepResearch => {
                "Perform deep research on a topic by searching the web and extracting relevant information"
            }
            Capability::Weather => "Get the current weather and a daily forecast at a location",
        }
    }

    /// JSON schema of the capability's arguments.
    pub fn input_schema(self) -> Value {
        let schema = match self {
            Capability::DeepResearch => schema_for!(ResearchInput),
            Capability::Weather => schema_for!(WeatherInput),
        };
        let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| json!({"type": "object"}));
        if let Some(obj) = value.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
        }
        value
    }

    pub fn definition(self) -> Tool {
        Tool {
            tool_type: "function".to_string(),
            function: FunctionTool {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.input_schema(),
            },
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityInput {
    DeepResearch(ResearchInput),
    Weather(WeatherInput),
}

impl CapabilityInput {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityInput::DeepResearch(_) => Capability::DeepResearch,
            CapabilityInput::Weather(_) => Capability::Weather,
        }
    }
}

/// A decoded, validated invocation. The id pairs it with its result.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityInvocation {
    pub id: String,
    pub input: CapabilityInput,
}

impl CapabilityInvocation {
    pub fn capability(&self) -> Capability {
        self.input.capability()
    }

    /// Decodes a wire call. `available` limits which names are accepted.
    pub fn decode(call: &ToolCall, available: &[Capability]) -> Result<Self, CapabilityError> {
        let name = call.function.name.as_str();
        let capability = Capability::from_name(name)
            .filter(|c| available.contains(c))
            .ok_or_else(|| CapabilityError::Unknown(name.to_string()))?;

        let raw = match call.function.arguments.trim() {
            "" => "{}",
            other => other,
        };
        let invalid = |reason: String| CapabilityError::InvalidArguments {
            capability,
            reason,
        };
        let input = match capability {
            Capability::DeepResearch => {
                let input: ResearchInput =
                    serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
                input.validate().map_err(invalid)?;
                CapabilityInput::DeepResearch(input)
            }
            Capability::Weather => {
                let input: WeatherInput =
                    serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
                input.validate().map_err(invalid)?;
                CapabilityInput::Weather(input)
            }
        };
        Ok(Self {
            id: call.id.clone(),
            input,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityValue {
    Ok(Value),
    /// The execution failed; the turn continues with this marker.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityResult {
    pub invocation_id: String,
    pub capability: Capability,
    pub value: CapabilityValue,
}

impl CapabilityResult {
    pub fn is_error(&self) -> bool {
        matches!(self.value, CapabilityValue::Error(_))
    }

    /// JSON payload placed in the result message.
    pub fn payload(&self) -> Value {
        match &self.value {
            CapabilityValue::Ok(v) => v.clone(),
            CapabilityValue::Error(msg) => json!({ "error": msg }),
        }
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::tool_result(
            self.invocation_id.clone(),
            self.capability.name(),
            self.payload().to_string(),
        )
    }
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("unknown capability: {0}")]
    Unknown(String),

    #[error("invalid arguments for {capability}: {reason}")]
    InvalidArguments {
        capability: Capability,
        reason: String,
    },

    #[error("invocation id {0} is used more than once")]
    DuplicateInvocation(String),

    #[error("{0}")]
    Execution(String),
}

impl CapabilityError {
    /// Validation errors fail the request; execution errors do not.
    pub fn is_validation(&self) -> bool {
        !matches!(self, CapabilityError::Execution(_))
    }
}
