// SPDX-License-Identifier: MIT

//! State schema definitions
//!
//! The workflow state is a tagged record: every slot a step may read or
//! write is a [`StateKey`] variant with a fixed [`FieldType`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Object,
}

/// Named slots of the workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKey {
    // Seeds
    #[serde(rename = "report_template")]
    ReportTemplate,
    #[serde(rename = "transcript")]
    Transcript,
    #[serde(rename = "segment_data")]
    SegmentData,
    #[serde(rename = "segment_items")]
    SegmentItems,

    // Financial highlights
    #[serde(rename = "transcript_fa_extracted")]
    TranscriptFaExtracted,
    #[serde(rename = "fa_highlights_out")]
    FaHighlightsOut,

    // Guidance
    #[serde(rename = "transcript_guidance_extracted")]
    TranscriptGuidanceExtracted,
    #[serde(rename = "guid_validation_out")]
    GuidValidationOut,

    // Key messages
    #[serde(rename = "segment_extraction_out")]
    SegmentExtractionOut,
    #[serde(rename = "context_retrieval_out")]
    ContextRetrievalOut,
    #[serde(rename = "integrator_out")]
    IntegratorOut,
    #[serde(rename = "key_messages_out")]
    KeyMessagesOut,
    #[serde(rename = "summarizer_out")]
    SummarizerOut,
    #[serde(rename = "briefing_key_messages_out")]
    BriefingKeyMessagesOut,

    // QA
    #[serde(rename = "transcript_QA_extracted")]
    TranscriptQaExtracted,
    #[serde(rename = "second_QA_out")]
    SecondQaOut,

    // Aggregation and envelope
    #[serde(rename = "ai_summary")]
    AiSummary,
    #[serde(rename = "final_response")]
    FinalResponse,
}

impl StateKey {
    /// Keys supplied by the caller when an invocation starts
    pub const SEEDS: [StateKey; 4] = [
        StateKey::ReportTemplate,
        StateKey::Transcript,
        StateKey::SegmentData,
        StateKey::SegmentItems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::ReportTemplate => "report_template",
            StateKey::Transcript => "transcript",
            StateKey::SegmentData => "segment_data",
            StateKey::SegmentItems => "segment_items",
            StateKey::TranscriptFaExtracted => "transcript_fa_extracted",
            StateKey::FaHighlightsOut => "fa_highlights_out",
            StateKey::TranscriptGuidanceExtracted => "transcript_guidance_extracted",
            StateKey::GuidValidationOut => "guid_validation_out",
            StateKey::SegmentExtractionOut => "segment_extraction_out",
            StateKey::ContextRetrievalOut => "context_retrieval_out",
            StateKey::IntegratorOut => "integrator_out",
            StateKey::KeyMessagesOut => "key_messages_out",
            StateKey::SummarizerOut => "summarizer_out",
            StateKey::BriefingKeyMessagesOut => "briefing_key_messages_out",
            StateKey::TranscriptQaExtracted => "transcript_QA_extracted",
            StateKey::SecondQaOut => "second_QA_out",
            StateKey::AiSummary => "ai_summary",
            StateKey::FinalResponse => "final_response",
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            StateKey::SegmentExtractionOut
            | StateKey::ContextRetrievalOut
            | StateKey::FinalResponse => FieldType::Object,
            _ => FieldType::String,
        }
    }

    pub fn is_seed(&self) -> bool {
        Self::SEEDS.contains(self)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
