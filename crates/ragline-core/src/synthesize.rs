//! Grounded answer synthesis.
//!
//! Builds a two-message conversation (instruction, user) from the retrieved
//! matches and the user query, sends it to a [`LanguageModel`], and returns
//! the answer text. Prompt assembly is deterministic: the same query and
//! matches always produce byte-identical messages.
//!
//! An empty match list still produces a call. The instruction tells the
//! model to say when the context is insufficient, so an ungrounded question
//! yields a self-reported "not enough context" answer instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{PipelineError, Result};
use crate::models::RetrievedMatch;

/// Separator placed between chunk texts in the assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Default instruction message.
pub const DEFAULT_INSTRUCTION: &str = "You are an AI assistant that answers questions \
using only the retrieved context supplied with each question. \
Use the provided context to answer. If the context is insufficient, say so.";

/// Accepted range for `max_output_tokens`.
pub const MAX_OUTPUT_TOKENS_RANGE: std::ops::RangeInclusive<u32> = 50..=4000;

/// Accepted range for `temperature`.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message sent to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Generation parameters forwarded verbatim to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model_id: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// Language-model completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Backend name, used in logs.
    fn name(&self) -> &str;

    /// Send the ordered conversation and return the extracted answer text.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> anyhow::Result<String>;
}

/// Inputs of one synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub query_text: String,
    /// Matches in retrieval order; the context keeps that order.
    pub matches: Vec<RetrievedMatch>,
    pub model_id: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl SynthesisRequest {
    pub fn validate(&self) -> Result<()> {
        if self.query_text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "query must not be empty".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "model must not be empty".to_string(),
            ));
        }
        if !MAX_OUTPUT_TOKENS_RANGE.contains(&self.max_output_tokens) {
            return Err(PipelineError::Validation(format!(
                "max_output_tokens must be in [50, 4000], got {}",
                self.max_output_tokens
            )));
        }
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(PipelineError::Validation(format!(
                "temperature must be in [0.0, 2.0], got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    fn params(&self) -> CompletionParams {
        CompletionParams {
            model_id: self.model_id.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

/// Join non-empty chunk texts with [`CONTEXT_SEPARATOR`].
pub fn build_context(matches: &[RetrievedMatch]) -> String {
    matches
        .iter()
        .map(|m| m.chunk.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Build the ordered (instruction, user) conversation.
pub fn build_messages(
    instruction: &str,
    query_text: &str,
    matches: &[RetrievedMatch],
) -> Vec<ChatMessage> {
    let context = build_context(matches);
    vec![
        ChatMessage {
            role: Role::System,
            content: instruction.to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: format!(
                "User question:\n{query_text}\n\nContext (retrieved):\n{context}"
            ),
        },
    ]
}

/// Turns retrieved matches into a grounded answer.
#[derive(Clone)]
pub struct Synthesizer {
    llm: Arc<dyn LanguageModel>,
    instruction: String,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }

    /// Replace the instruction message. It should keep asking the model to
    /// report insufficient context.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Produce an answer for `req`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] for out-of-range parameters, before
    ///   the model is called.
    /// - [`PipelineError::SynthesisFailed`] when the model call fails or
    ///   returns blank text. No retry is attempted here.
    pub async fn synthesize(&self, req: &SynthesisRequest) -> Result<String> {
        req.validate()?;

        let messages = build_messages(&self.instruction, &req.query_text, &req.matches);
        let params = req.params();

        let answer = self.llm.complete(&messages, &params).await.map_err(|e| {
            error!(backend = self.llm.name(), model = %params.model_id, error = %e, "completion failed");
            PipelineError::SynthesisFailed(format!("{e:#}"))
        })?;

        if answer.trim().is_empty() {
            error!(backend = self.llm.name(), model = %params.model_id, "completion returned no text");
            return Err(PipelineError::SynthesisFailed(
                "model returned no output text".to_string(),
            ));
        }

        info!(
            backend = self.llm.name(),
            model = %params.model_id,
            matches = req.matches.len(),
            answer_chars = answer.chars().count(),
            "synthesized answer"
        );
        Ok(answer)
    }
}
