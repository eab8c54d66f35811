//! Tool-augmented chat orchestration.
//!
//! # Overview
//! A chat turn is answered in two phases: a non-streaming *decide* call that
//! lets the model request capabilities (tools), followed by a streamed
//! *answer* call over the transcript augmented with the capability results.
//! One of the capabilities is an iterative web research agent that runs
//! bounded search → extract → analyze rounds and reports its advancement
//! through a progress feed.
//!
//! # Architecture
//! - [`chat`] / [`providers`] / [`adapters`]: provider-neutral chat types and
//!   OpenAI-compatible HTTP backends.
//! - [`gateway`]: picks the backend for a request and exposes
//!   complete-with-tools and stream-completion.
//! - [`transcript`]: append-only message sequence and its synthetic
//!   capability turns.
//! - [`capability`]: the closed set of capabilities, their schemas and
//!   executors.
//! - [`research`] / [`progress`]: the research state machine and its
//!   event feed.
//! - [`orchestrator`]: the two-phase control flow.
//! - [`persistence`]: transcript sinks.

use serde::{Deserialize, Serialize};

pub mod adapters;

/// Capabilities the model may invoke during the decide phase
pub mod capability;

/// Chat-based interactions with language models
pub mod chat;

/// Runtime configuration
pub mod config;

/// Error types and handling
pub mod error;

pub mod gateway;

pub mod orchestrator;

pub mod outbound;

pub mod persistence;

/// Append-only progress feed emitted by the research agent
pub mod progress;

/// OpenAI-compatible chat backends
pub mod providers;

pub mod research;

#[cfg(test)]
pub mod test_utils;

pub mod transcript;

pub use chat::ChatProvider;
pub use error::LLMError;

/// Tool call represents a function call that an LLM wants to make.
/// This is the wire form shared by every provider; it is decoded into a
/// typed [`capability::CapabilityInvocation`] before execution.
#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq)]
pub struct ToolCall {
    /// The ID of the tool call, unique within one assistant turn.
    pub id: String,
    /// The type of the tool call (usually "function").
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function to call.
    pub function: FunctionCall,
}

/// FunctionCall contains details about which function to call and with what arguments.
#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq)]
pub struct FunctionCall {
    /// The name of the function to call.
    pub name: String,
    /// The arguments to pass to the function, serialized as a JSON string.
    pub arguments: String,
}

/// Token accounting reported by a provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default, Eq, PartialEq)]
pub struct Usage {
    /// Number of input tokens.
    #[serde(alias = "prompt_tokens")]
    pub input_tokens: u32,
    /// Number of output tokens.
    #[serde(alias = "completion_tokens")]
    pub output_tokens: u32,
}
