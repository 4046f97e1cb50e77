// SPDX-License-Identifier: MIT

//! The earnings-call briefing workflow
//!
//! ```text
//! json_parser
//!   ├─► transcript_fa_extraction ─► fa_highlights ──────────────────────┐
//!   ├─► transcript_guidance_extraction ─► guid_validation ──────────────┤
//!   ├─► segment_extraction ─► context_retrieval ─┬─► integrator ─► key_messages ─┤
//!   │                                            └─► summarizer ─► briefing_key_messages ─┤
//!   └─► transcript_QA_extraction ─► second_QA ──────────────────────────┤
//!                                                               output_template
//!                                                                     └─► wrapper
//! ```

use std::sync::Arc;

use super::registry::Workflow;
use super::state::StateKey;
use super::step::{EntryStep, GenerativeStep, PromptSection, Step, WrapperStep};
use crate::adk::error::GraphError;
use crate::adk::model::Model;
use crate::ects::prompts::PromptTable;

use PromptSection as S;

pub const WORKFLOW_NAME: &str = "ects_briefing";

pub const JSON_PARSER: &str = "json_parser";
pub const TRANSCRIPT_FA_EXTRACTION: &str = "transcript_fa_extraction";
pub const FA_HIGHLIGHTS: &str = "fa_highlights";
pub const TRANSCRIPT_GUIDANCE_EXTRACTION: &str = "transcript_guidance_extraction";
pub const GUID_VALIDATION: &str = "guid_validation";
pub const SEGMENT_EXTRACTION: &str = "segment_extraction";
pub const CONTEXT_RETRIEVAL: &str = "context_retrieval";
pub const INTEGRATOR: &str = "integrator";
pub const KEY_MESSAGES: &str = "key_messages";
pub const SUMMARIZER: &str = "summarizer";
pub const BRIEFING_KEY_MESSAGES: &str = "briefing_key_messages";
pub const TRANSCRIPT_QA_EXTRACTION: &str = "transcript_QA_extraction";
pub const SECOND_QA: &str = "second_QA";
pub const OUTPUT_TEMPLATE: &str = "output_template";
pub const WRAPPER: &str = "wrapper";

/// Heads of the four parallel branches
pub const BRANCH_HEADS: [&str; 4] = [
    TRANSCRIPT_FA_EXTRACTION,
    TRANSCRIPT_GUIDANCE_EXTRACTION,
    SEGMENT_EXTRACTION,
    TRANSCRIPT_QA_EXTRACTION,
];

struct StepDef {
    id: &'static str,
    sections: &'static [PromptSection],
    output: StateKey,
}

static GENERATIVE_STEPS: [StepDef; 13] = [
    // Financial highlights
    StepDef {
        id: TRANSCRIPT_FA_EXTRACTION,
        sections: &[S::required("Transcript", StateKey::Transcript)],
        output: StateKey::TranscriptFaExtracted,
    },
    StepDef {
        id: FA_HIGHLIGHTS,
        sections: &[
            S::required("Report Template", StateKey::ReportTemplate),
            S::required("Extracted FA Transcript", StateKey::TranscriptFaExtracted),
        ],
        output: StateKey::FaHighlightsOut,
    },
    // Guidance
    StepDef {
        id: TRANSCRIPT_GUIDANCE_EXTRACTION,
        sections: &[S::required("Transcript", StateKey::Transcript)],
        output: StateKey::TranscriptGuidanceExtracted,
    },
    StepDef {
        id: GUID_VALIDATION,
        sections: &[
            S::required("Transcript", StateKey::Transcript),
            S::required("Extracted Guidance", StateKey::TranscriptGuidanceExtracted),
        ],
        output: StateKey::GuidValidationOut,
    },
    // Key messages
    StepDef {
        id: SEGMENT_EXTRACTION,
        sections: &[
            S::required("Transcript", StateKey::Transcript),
            S::required("Segment Data", StateKey::SegmentData),
        ],
        output: StateKey::SegmentExtractionOut,
    },
    StepDef {
        id: CONTEXT_RETRIEVAL,
        sections: &[
            S::required("Transcript", StateKey::Transcript),
            S::required("Segment Data", StateKey::SegmentData),
            S::required("Segment Extraction Output", StateKey::SegmentExtractionOut),
        ],
        output: StateKey::ContextRetrievalOut,
    },
    StepDef {
        id: INTEGRATOR,
        sections: &[
            S::required("Context Retrieval Output", StateKey::ContextRetrievalOut),
            S::required("Segment Extraction Output", StateKey::SegmentExtractionOut),
            S::required("Segment Items", StateKey::SegmentItems),
        ],
        output: StateKey::IntegratorOut,
    },
    StepDef {
        id: KEY_MESSAGES,
        sections: &[
            S::required("Integrator Output", StateKey::IntegratorOut),
            S::required("Segment Data", StateKey::SegmentData),
        ],
        output: StateKey::KeyMessagesOut,
    },
    StepDef {
        id: SUMMARIZER,
        sections: &[
            S::required("Context Retrieval Output", StateKey::ContextRetrievalOut),
            S::required("Segment Extraction Output", StateKey::SegmentExtractionOut),
            S::required("Segment Items", StateKey::SegmentItems),
        ],
        output: StateKey::SummarizerOut,
    },
    StepDef {
        id: BRIEFING_KEY_MESSAGES,
        sections: &[
            S::required("Summarizer Output", StateKey::SummarizerOut),
            S::required("Segment Data", StateKey::SegmentData),
        ],
        output: StateKey::BriefingKeyMessagesOut,
    },
    // QA
    StepDef {
        id: TRANSCRIPT_QA_EXTRACTION,
        sections: &[S::required("Transcript", StateKey::Transcript)],
        output: StateKey::TranscriptQaExtracted,
    },
    StepDef {
        id: SECOND_QA,
        sections: &[S::required("Extracted QA", StateKey::TranscriptQaExtracted)],
        output: StateKey::SecondQaOut,
    },
    // Aggregation; every branch output is tolerated as absent here
    StepDef {
        id: OUTPUT_TEMPLATE,
        sections: &[
            S::optional("FA Highlights", StateKey::FaHighlightsOut),
            S::optional("Guidance Validation", StateKey::GuidValidationOut),
            S::optional("Briefing Key Messages", StateKey::BriefingKeyMessagesOut),
            S::optional("Key Messages", StateKey::KeyMessagesOut),
            S::optional("QA", StateKey::SecondQaOut),
        ],
        output: StateKey::AiSummary,
    },
];

const EDGES: [(&str, &str); 18] = [
    // Fan-out to the four branch heads
    (JSON_PARSER, TRANSCRIPT_FA_EXTRACTION),
    (JSON_PARSER, TRANSCRIPT_GUIDANCE_EXTRACTION),
    (JSON_PARSER, SEGMENT_EXTRACTION),
    (JSON_PARSER, TRANSCRIPT_QA_EXTRACTION),
    // Financial highlights
    (TRANSCRIPT_FA_EXTRACTION, FA_HIGHLIGHTS),
    (FA_HIGHLIGHTS, OUTPUT_TEMPLATE),
    // Guidance
    (TRANSCRIPT_GUIDANCE_EXTRACTION, GUID_VALIDATION),
    (GUID_VALIDATION, OUTPUT_TEMPLATE),
    // Key messages, with an inner fan-out after context retrieval
    (SEGMENT_EXTRACTION, CONTEXT_RETRIEVAL),
    (CONTEXT_RETRIEVAL, INTEGRATOR),
    (CONTEXT_RETRIEVAL, SUMMARIZER),
    (INTEGRATOR, KEY_MESSAGES),
    (KEY_MESSAGES, OUTPUT_TEMPLATE),
    (SUMMARIZER, BRIEFING_KEY_MESSAGES),
    (BRIEFING_KEY_MESSAGES, OUTPUT_TEMPLATE),
    // QA
    (TRANSCRIPT_QA_EXTRACTION, SECOND_QA),
    (SECOND_QA, OUTPUT_TEMPLATE),
    // Fan-in, then wrap
    (OUTPUT_TEMPLATE, WRAPPER),
];

/// Ids of every step that calls the model
pub fn generative_step_ids() -> impl Iterator<Item = &'static str> {
    GENERATIVE_STEPS.iter().map(|s| s.id)
}

/// Build the briefing workflow; prompts are checked before anything else
pub fn build_workflow(model: Arc<dyn Model>, prompts: &PromptTable) -> Result<Workflow, GraphError> {
    prompts.validate(generative_step_ids())?;

    let mut steps: Vec<Arc<dyn Step>> = Vec::with_capacity(GENERATIVE_STEPS.len() + 2);
    steps.push(Arc::new(EntryStep::new(JSON_PARSER)));
    for def in &GENERATIVE_STEPS {
        steps.push(Arc::new(GenerativeStep::new(
            def.id,
            prompts.require(def.id)?.clone(),
            def.sections.to_vec(),
            def.output,
            model.clone(),
        )));
    }
    steps.push(Arc::new(WrapperStep::new(WRAPPER)));

    Workflow::new(WORKFLOW_NAME, &StateKey::SEEDS, steps, EDGES)
}
