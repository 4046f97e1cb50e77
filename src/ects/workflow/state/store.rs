// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::schema::{FieldType, StateKey};
use crate::adk::error::StateError;

/// A value held in one state slot
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Text(String),
    Structured(Value),
}

impl StateValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            StateValue::Text(_) => FieldType::String,
            StateValue::Structured(_) => FieldType::Object,
        }
    }

    /// Text as-is, structured values as compact JSON
    pub fn render(&self) -> String {
        match self {
            StateValue::Text(s) => s.clone(),
            StateValue::Structured(v) => v.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            StateValue::Text(s) => Value::String(s.clone()),
            StateValue::Structured(v) => v.clone(),
        }
    }
}

/// The partial state a step hands back to the scheduler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    values: BTreeMap<StateKey, StateValue>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, key: StateKey, value: impl Into<String>) -> Self {
        self.values.insert(key, StateValue::Text(value.into()));
        self
    }

    pub fn structured(mut self, key: StateKey, value: Value) -> Self {
        self.values.insert(key, StateValue::Structured(value));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.values.keys().copied()
    }

    pub fn get(&self, key: StateKey) -> Option<&StateValue> {
        self.values.get(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Append-only workflow state
///
/// Every key is written once; [`WorkflowState::merge`] is a disjoint union
/// and refuses to overwrite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    fields: BTreeMap<StateKey, StateValue>,
}

impl WorkflowState {
    /// Create an empty WorkflowState
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a state holding the four caller-supplied seed fields
    pub fn seeded(
        report_template: impl Into<String>,
        transcript: impl Into<String>,
        segment_data: impl Into<String>,
        segment_items: impl Into<String>,
    ) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            StateKey::ReportTemplate,
            StateValue::Text(report_template.into()),
        );
        fields.insert(StateKey::Transcript, StateValue::Text(transcript.into()));
        fields.insert(StateKey::SegmentData, StateValue::Text(segment_data.into()));
        fields.insert(
            StateKey::SegmentItems,
            StateValue::Text(segment_items.into()),
        );
        Self { fields }
    }

    /// Merge a step's output into the state
    ///
    /// All keys are checked before anything is written, so a rejected update
    /// leaves the state untouched.
    pub fn merge(&mut self, update: StateUpdate) -> Result<(), StateError> {
        for (key, value) in &update.values {
            if self.fields.contains_key(key) {
                return Err(StateError::Conflict(*key));
            }
            if value.field_type() != key.field_type() {
                return Err(StateError::TypeMismatch {
                    key: *key,
                    expected: key.field_type(),
                });
            }
        }
        self.fields.extend(update.values);
        Ok(())
    }

    /// Consuming form of [`WorkflowState::merge`]
    pub fn merged(mut self, update: StateUpdate) -> Result<Self, StateError> {
        self.merge(update)?;
        Ok(self)
    }

    /// Get a field value
    pub fn get(&self, key: StateKey) -> Option<&StateValue> {
        self.fields.get(&key)
    }

    pub fn contains(&self, key: StateKey) -> bool {
        self.fields.contains_key(&key)
    }

    /// Get a field that must already be present
    pub fn value(&self, key: StateKey) -> Result<&StateValue, StateError> {
        self.fields.get(&key).ok_or(StateError::Missing(key))
    }

    /// Get a text field that must already be present
    pub fn text(&self, key: StateKey) -> Result<&str, StateError> {
        match self.value(key)? {
            StateValue::Text(s) => Ok(s),
            StateValue::Structured(_) => Err(StateError::TypeMismatch {
                key,
                expected: FieldType::String,
            }),
        }
    }

    /// Render a field, treating absence as an empty string
    pub fn render_or_empty(&self, key: StateKey) -> String {
        self.fields
            .get(&key)
            .map(StateValue::render)
            .unwrap_or_default()
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.fields.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect::<Map<String, Value>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeds() -> WorkflowState {
        WorkflowState::seeded("template", "transcript", "data", "items")
    }

    #[test]
    fn test_empty_state() {
        let state = WorkflowState::empty();
        assert!(state.get(StateKey::Transcript).is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn test_seeded_state_holds_four_fields() {
        let state = seeds();
        assert_eq!(state.len(), 4);
        assert_eq!(state.text(StateKey::Transcript).unwrap(), "transcript");
        assert_eq!(state.text(StateKey::SegmentItems).unwrap(), "items");
    }

    #[test]
    fn test_merge_is_additive() {
        let mut state = seeds();
        state
            .merge(StateUpdate::new().text(StateKey::FaHighlightsOut, "fa"))
            .unwrap();

        assert_eq!(state.len(), 5);
        assert_eq!(state.text(StateKey::FaHighlightsOut).unwrap(), "fa");
        assert_eq!(state.text(StateKey::Transcript).unwrap(), "transcript");
    }

    #[test]
    fn test_merge_rejects_present_key() {
        let mut state = seeds();
        let err = state
            .merge(StateUpdate::new().text(StateKey::Transcript, "other"))
            .unwrap_err();

        assert_eq!(err, StateError::Conflict(StateKey::Transcript));
        assert_eq!(state.text(StateKey::Transcript).unwrap(), "transcript");
    }

    #[test]
    fn test_rejected_merge_writes_nothing() {
        let mut state = seeds();
        let update = StateUpdate::new()
            .text(StateKey::AiSummary, "summary")
            .text(StateKey::Transcript, "clash");

        assert!(state.merge(update).is_err());
        assert!(!state.contains(StateKey::AiSummary));
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn test_merge_checks_field_type() {
        let mut state = seeds();
        let err = state
            .merge(StateUpdate::new().text(StateKey::SegmentExtractionOut, "flat"))
            .unwrap_err();
        assert_eq!(
            err,
            StateError::TypeMismatch {
                key: StateKey::SegmentExtractionOut,
                expected: FieldType::Object,
            }
        );
    }

    #[test]
    fn test_disjoint_merges_commute() {
        let a = StateUpdate::new().text(StateKey::FaHighlightsOut, "a");
        let b = StateUpdate::new().structured(
            StateKey::SegmentExtractionOut,
            json!({"content": "b"}),
        );

        let ab = seeds().merged(a.clone()).unwrap().merged(b.clone()).unwrap();
        let ba = seeds().merged(b).unwrap().merged(a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_text_and_missing_keys() {
        let state = seeds();
        assert_eq!(
            state.text(StateKey::AiSummary).unwrap_err(),
            StateError::Missing(StateKey::AiSummary)
        );
        assert_eq!(state.render_or_empty(StateKey::AiSummary), "");
    }

    #[test]
    fn test_structured_values_render_as_json() {
        let state = seeds()
            .merged(
                StateUpdate::new()
                    .structured(StateKey::ContextRetrievalOut, json!({"content": "ctx"})),
            )
            .unwrap();

        assert_eq!(
            state.render_or_empty(StateKey::ContextRetrievalOut),
            r#"{"content":"ctx"}"#
        );
        assert!(state.text(StateKey::ContextRetrievalOut).is_err());
    }

    #[test]
    fn test_to_json() {
        let state = seeds()
            .merged(
                StateUpdate::new()
                    .structured(StateKey::SegmentExtractionOut, json!({"content": "x"})),
            )
            .unwrap();

        let json = state.to_json();
        assert_eq!(json["transcript"], "transcript");
        assert_eq!(json["segment_extraction_out"]["content"], "x");
    }
}
