// SPDX-License-Identifier: MIT

//! Model module - the text-generation collaborator
//!
//! This module provides the core Model trait and shared types.
//! Implementations live in their own submodules:
//! - [openai] - OpenAI-compatible chat completions

pub mod openai;

use crate::adk::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, reasoning excluded
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect()
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Reasoning content from thinking models; never forwarded as an answer
    Thinking(String),
}

/// Core trait for LLM model implementations
///
/// Every call is independent and stateless from the caller's point of view.
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

/// Send one (system, user) pair and return the answer text verbatim
pub async fn generate_text(
    model: &dyn Model,
    system: &str,
    user: &str,
) -> Result<String, ModelError> {
    let history = [Content::system(system), Content::user(user)];
    let response = model.generate_content(&history, None).await?;
    Ok(response.text())
}
