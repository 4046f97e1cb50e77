// SPDX-License-Identifier: MIT

//! Generative step - one system/user exchange with the model
//!
//! The user message is the configured user prompt followed by one
//! `Label:\nvalue` section per input, separated by blank lines. The answer
//! is stored without any parsing.

use super::{Step, StepKind};
use crate::adk::error::FlowError;
use crate::adk::model::{generate_text, Model};
use crate::ects::prompts::PromptTemplate;
use crate::ects::workflow::state::{FieldType, StateKey, StateUpdate, WorkflowState};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// One labelled input appended to the user prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSection {
    pub label: &'static str,
    pub key: StateKey,
    /// Absent values render as an empty string instead of failing
    pub optional: bool,
}

impl PromptSection {
    pub const fn required(label: &'static str, key: StateKey) -> Self {
        Self {
            label,
            key,
            optional: false,
        }
    }

    pub const fn optional(label: &'static str, key: StateKey) -> Self {
        Self {
            label,
            key,
            optional: true,
        }
    }
}

/// A step that delegates to the text-generation model
pub struct GenerativeStep {
    id: String,
    prompt: PromptTemplate,
    sections: Vec<PromptSection>,
    reads: Vec<StateKey>,
    optional_reads: Vec<StateKey>,
    writes: [StateKey; 1],
    model: Arc<dyn Model>,
}

impl GenerativeStep {
    pub fn new(
        id: impl Into<String>,
        prompt: PromptTemplate,
        sections: Vec<PromptSection>,
        output: StateKey,
        model: Arc<dyn Model>,
    ) -> Self {
        let reads = sections
            .iter()
            .filter(|s| !s.optional)
            .map(|s| s.key)
            .collect();
        let optional_reads = sections
            .iter()
            .filter(|s| s.optional)
            .map(|s| s.key)
            .collect();

        Self {
            id: id.into(),
            prompt,
            reads,
            optional_reads,
            sections,
            writes: [output],
            model,
        }
    }

    pub fn output(&self) -> StateKey {
        self.writes[0]
    }

    pub fn sections(&self) -> &[PromptSection] {
        &self.sections
    }

    /// Build the user message from the configured prompt and the state
    pub fn user_message(&self, state: &WorkflowState) -> Result<String, FlowError> {
        let mut message = self.prompt.user.clone();
        for section in &self.sections {
            let value = if section.optional {
                state.render_or_empty(section.key)
            } else {
                state
                    .get(section.key)
                    .ok_or_else(|| FlowError::Precondition {
                        step: self.id.clone(),
                        key: section.key,
                    })?
                    .render()
            };
            message.push_str(&format!("\n\n{}:\n{}", section.label, value));
        }
        Ok(message)
    }
}

#[async_trait]
impl Step for GenerativeStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StepKind {
        StepKind::Generative
    }

    fn reads(&self) -> &[StateKey] {
        &self.reads
    }

    fn optional_reads(&self) -> &[StateKey] {
        &self.optional_reads
    }

    fn writes(&self) -> &[StateKey] {
        &self.writes
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, FlowError> {
        let user = self.user_message(state)?;
        let text = generate_text(self.model.as_ref(), &self.prompt.system, &user)
            .await
            .map_err(|e| FlowError::step(&self.id, e))?;

        log::info!(
            "Step {} received {} chars for '{}'",
            self.id,
            text.len(),
            self.output()
        );

        let output = self.output();
        Ok(match output.field_type() {
            FieldType::String => StateUpdate::new().text(output, text),
            FieldType::Object => StateUpdate::new().structured(output, json!({ "content": text })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use crate::adk::model::{Content, GenerationConfig, Part};
    use std::sync::Mutex;

    struct RecordingModel {
        reply: Result<String, String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl RecordingModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: Mutex::new(vec![]),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl Model for RecordingModel {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ModelError> {
            self.calls
                .lock()
                .unwrap()
                .push((history[0].text(), history[1].text()));
            match &self.reply {
                Ok(text) => Ok(Content {
                    role: "model".to_string(),
                    parts: vec![Part::Text(text.clone())],
                }),
                Err(message) => Err(ModelError::other(message.clone())),
            }
        }
    }

    fn prompt() -> PromptTemplate {
        PromptTemplate {
            system: "You are an analyst.".to_string(),
            user: "Extract highlights.".to_string(),
        }
    }

    fn state() -> WorkflowState {
        WorkflowState::seeded("TEMPLATE", "TRANSCRIPT", "DATA", "ITEMS")
    }

    #[test]
    fn test_reads_split_by_optionality() {
        let step = GenerativeStep::new(
            "output_template",
            prompt(),
            vec![
                PromptSection::optional("FA Highlights", StateKey::FaHighlightsOut),
                PromptSection::required("Transcript", StateKey::Transcript),
            ],
            StateKey::AiSummary,
            RecordingModel::replying("x"),
        );

        assert_eq!(step.reads(), &[StateKey::Transcript]);
        assert_eq!(step.optional_reads(), &[StateKey::FaHighlightsOut]);
        assert_eq!(step.writes(), &[StateKey::AiSummary]);
        assert_eq!(step.kind(), StepKind::Generative);
    }

    #[tokio::test]
    async fn test_user_message_layout() {
        let model = RecordingModel::replying("highlights");
        let step = GenerativeStep::new(
            "fa_highlights",
            prompt(),
            vec![
                PromptSection::required("Report Template", StateKey::ReportTemplate),
                PromptSection::required("Transcript", StateKey::Transcript),
            ],
            StateKey::FaHighlightsOut,
            model.clone(),
        );

        let update = step.run(&state()).await.unwrap();
        assert_eq!(
            update.get(StateKey::FaHighlightsOut).unwrap().render(),
            "highlights"
        );

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[0].0, "You are an analyst.");
        assert_eq!(
            calls[0].1,
            "Extract highlights.\n\nReport Template:\nTEMPLATE\n\nTranscript:\nTRANSCRIPT"
        );
    }

    #[tokio::test]
    async fn test_structured_output_wraps_content() {
        let step = GenerativeStep::new(
            "segment_extraction",
            prompt(),
            vec![PromptSection::required("Transcript", StateKey::Transcript)],
            StateKey::SegmentExtractionOut,
            RecordingModel::replying("segments"),
        );

        let update = step.run(&state()).await.unwrap();
        assert_eq!(
            update.get(StateKey::SegmentExtractionOut).unwrap().to_json(),
            json!({"content": "segments"})
        );
    }

    #[tokio::test]
    async fn test_optional_section_renders_empty() {
        let step = GenerativeStep::new(
            "output_template",
            prompt(),
            vec![
                PromptSection::optional("QA", StateKey::SecondQaOut),
                PromptSection::optional("Key Messages", StateKey::KeyMessagesOut),
            ],
            StateKey::AiSummary,
            RecordingModel::replying("x"),
        );

        let message = step.user_message(&state()).unwrap();
        assert_eq!(message, "Extract highlights.\n\nQA:\n\n\nKey Messages:\n");
    }

    #[tokio::test]
    async fn test_missing_required_input_is_precondition_error() {
        let step = GenerativeStep::new(
            "guid_validation",
            prompt(),
            vec![PromptSection::required(
                "Extracted Guidance",
                StateKey::TranscriptGuidanceExtracted,
            )],
            StateKey::GuidValidationOut,
            RecordingModel::replying("x"),
        );

        let err = step.run(&state()).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Precondition { key: StateKey::TranscriptGuidanceExtracted, .. }
        ));
    }

    #[tokio::test]
    async fn test_model_failure_names_the_step() {
        let step = GenerativeStep::new(
            "second_QA",
            prompt(),
            vec![PromptSection::required("Transcript", StateKey::Transcript)],
            StateKey::SecondQaOut,
            RecordingModel::failing("rate limited"),
        );

        let err = step.run(&state()).await.unwrap_err();
        match err {
            FlowError::Step { step, source } => {
                assert_eq!(step, "second_QA");
                assert_eq!(source.to_string(), "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
