// SPDX-License-Identifier: MIT

//! Prompt table loading
//!
//! Prompts live in a YAML file keyed by step id:
//!
//! ```yaml
//! fa_highlights:
//!   system: "You are a financial analyst."
//!   user: "Write the highlights section."
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::adk::error::GraphError;

/// System and user instruction for one generative step
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct PromptTemplate {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub user: String,
}

/// Lookup table from step id to prompt
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PromptTable {
    #[serde(flatten)]
    prompts: HashMap<String, PromptTemplate>,
}

impl PromptTable {
    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read prompts {}: {}", path.display(), e))?;
        Ok(Self::parse_yaml(&content)?)
    }

    pub fn parse_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn insert(&mut self, id: impl Into<String>, template: PromptTemplate) {
        self.prompts.insert(id.into(), template);
    }

    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.prompts.get(id)
    }

    /// Prompt for `id`, which must have non-empty system and user text
    pub fn require(&self, id: &str) -> Result<&PromptTemplate, GraphError> {
        self.prompts
            .get(id)
            .filter(|p| !p.system.trim().is_empty() && !p.user.trim().is_empty())
            .ok_or_else(|| GraphError::MissingPrompt {
                step: id.to_string(),
            })
    }

    /// Check every id up front so startup fails before any request
    pub fn validate<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Result<(), GraphError> {
        for id in ids {
            self.require(id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
            second_QA:
              system: "You review Q&A."
              user: "Tighten the answers."
            integrator:
              system: "You merge notes."
              user: "Integrate."
        "#;
        let table = PromptTable::parse_yaml(yaml).unwrap();

        assert_eq!(table.get("second_QA").unwrap().system, "You review Q&A.");
        assert_eq!(table.get("integrator").unwrap().user, "Integrate.");
        assert!(table.get("summarizer").is_none());
    }

    #[test]
    fn test_require_rejects_blank_prompts() {
        let yaml = r#"
            summarizer:
              system: "  "
              user: "Summarize."
            key_messages:
              system: "Writer."
        "#;
        let table = PromptTable::parse_yaml(yaml).unwrap();

        assert_eq!(
            table.require("summarizer").unwrap_err(),
            GraphError::MissingPrompt {
                step: "summarizer".to_string()
            }
        );
        assert!(table.require("key_messages").is_err());
        assert!(table.require("absent").is_err());
    }

    #[test]
    fn test_validate_reports_first_missing() {
        let mut table = PromptTable::default();
        table.insert(
            "a",
            PromptTemplate {
                system: "s".to_string(),
                user: "u".to_string(),
            },
        );

        assert!(table.validate(["a"]).is_ok());
        assert_eq!(
            table.validate(["a", "b"]).unwrap_err(),
            GraphError::MissingPrompt {
                step: "b".to_string()
            }
        );
    }
}
