// SPDX-License-Identifier: MIT

//! Process settings
//!
//! Values come from the environment (after `.env` is loaded by the binary)
//! and may be overridden from the command line.

use clap::Args;
use std::path::PathBuf;

use crate::adk::error::ModelError;
use crate::adk::model::openai::{OpenAIModel, DEFAULT_BASE_URL};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PROMPTS: &str = "config/prompts.yaml";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub prompts: PathBuf,
    pub host: String,
    pub port: u16,
}

/// Command-line overrides; anything left unset falls back to the environment
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Prompt table (YAML)
    #[arg(long)]
    pub prompts: Option<PathBuf>,

    /// Model name sent to the chat completions endpoint
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    pub api_base: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("ECTS_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid ECTS_PORT {:?}: {}", raw, e))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            api_key: var("OPENAI_API_KEY"),
            api_base: var("OPENAI_API_BASE")
                .or_else(|| var("OPENAI_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            prompts: var("ECTS_PROMPTS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROMPTS)),
            host: var("ECTS_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        })
    }

    pub fn apply(mut self, args: &SettingsArgs) -> Self {
        if let Some(prompts) = &args.prompts {
            self.prompts = prompts.clone();
        }
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(api_base) = &args.api_base {
            self.api_base = api_base.clone();
        }
        self
    }

    pub fn openai_model(&self) -> Result<OpenAIModel, ModelError> {
        OpenAIModel::new(&self.model, self.api_key.clone(), &self.api_base)
    }
}
