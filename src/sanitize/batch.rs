//! Grouping of sanitizer rules into one submission.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::rules::{SanitizerKind, SanitizerRule};

/// Rules grouped by kind, ready to submit in a single request.
///
/// Kinds are emitted in [`SanitizerKind`] order regardless of the order rules
/// were added; within a kind, insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizerBatch {
    groups: BTreeMap<SanitizerKind, Vec<Option<Map<String, Value>>>>,
}

impl SanitizerBatch {
    /// Add a rule. Matcher overrides carry no sanitizer kind and are ignored.
    pub fn push(&mut self, rule: &SanitizerRule) {
        if let Some(kind) = rule.kind() {
            self.groups.entry(kind).or_default().push(rule.wire_body());
        }
    }

    /// Kinds present in the batch, in submission order.
    pub fn kinds(&self) -> Vec<SanitizerKind> {
        self.groups.keys().copied().collect()
    }

    /// Parameter sets for one kind.
    pub fn params(&self, kind: SanitizerKind) -> &[Option<Map<String, Value>>] {
        self.groups.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of sanitizers.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether no sanitizer was added.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The request body: `[{"Name": ..., "Body": {...}}, ...]`.
    pub fn to_wire(&self) -> Value {
        let entries = self
            .groups
            .iter()
            .flat_map(|(kind, params)| {
                params.iter().map(move |body| match body {
                    Some(body) => json!({"Name": kind.wire_name(), "Body": body}),
                    None => json!({"Name": kind.wire_name()}),
                })
            })
            .collect();
        Value::Array(entries)
    }
}

impl<'a> FromIterator<&'a SanitizerRule> for SanitizerBatch {
    fn from_iter<I: IntoIterator<Item = &'a SanitizerRule>>(iter: I) -> Self {
        let mut batch = Self::default();
        for rule in iter {
            batch.push(rule);
        }
        batch
    }
}
