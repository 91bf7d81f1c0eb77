//! Assembly of streamed tool call fragments into complete calls

use super::ToolCallFragment;
use crate::history::ToolCall;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Collects tool call fragments for one streaming round
///
/// Fragments are matched to calls by index. A fragment carrying an id that
/// differs from the one already recorded at its index starts a new call, so
/// adapters that reuse index 0 for every call still produce distinct calls.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    partials: Vec<PartialToolCall>,
    by_index: HashMap<u32, usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, fragment: ToolCallFragment) {
        let id = fragment.id.filter(|id| !id.is_empty());
        let slot = match self.by_index.get(&fragment.index) {
            Some(&slot) if Self::same_call(&self.partials[slot], id.as_deref()) => slot,
            _ => {
                self.partials.push(PartialToolCall::default());
                let slot = self.partials.len() - 1;
                self.by_index.insert(fragment.index, slot);
                slot
            }
        };

        let partial = &mut self.partials[slot];
        if let Some(id) = id {
            if partial.id.is_empty() {
                partial.id = id;
            }
        }
        if let Some(name) = fragment.name {
            partial.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            partial.arguments.push_str(&arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    /// Complete calls in first-seen order
    ///
    /// Calls that never received a name are dropped. Missing or repeated ids
    /// are replaced with generated ones so every id in a round is unique.
    pub fn finish(self) -> Vec<ToolCall> {
        let mut seen = HashSet::new();
        let mut calls = Vec::with_capacity(self.partials.len());

        for partial in self.partials {
            let name = partial.name.trim();
            if name.is_empty() {
                tracing::debug!(id = %partial.id, "Dropping tool call without a name");
                continue;
            }
            let id = if partial.id.is_empty() || seen.contains(&partial.id) {
                format!("call_{}", Uuid::new_v4().simple())
            } else {
                partial.id
            };
            seen.insert(id.clone());
            calls.push(ToolCall::new(id, name, partial.arguments));
        }

        calls
    }

    fn same_call(partial: &PartialToolCall, id: Option<&str>) -> bool {
        match id {
            Some(id) => partial.id.is_empty() || partial.id == id,
            None => true,
        }
    }
}
