//! Line breakpoints, keyed by template id and line.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A breakpoint on one line of one template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Id of the template.
    pub template_id: String,
    /// Line in the template source.
    pub line: u32,
}

impl Breakpoint {
    /// Creates a new breakpoint.
    #[must_use]
    pub fn new(template_id: impl Into<String>, line: u32) -> Self {
        Self {
            template_id: template_id.into(),
            line,
        }
    }
}

/// Session-owned breakpoint registry.
///
/// Read concurrently by every render thread at every checkpoint, written by
/// the controlling thread.
#[derive(Debug, Default)]
pub struct Breakpoints {
    by_template: DashMap<String, BTreeMap<u32, Breakpoint>>,
}

impl Breakpoints {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a breakpoint, returning the existing one if already set.
    pub fn set(&self, template_id: &str, line: u32) -> Breakpoint {
        self.by_template
            .entry(template_id.to_string())
            .or_default()
            .entry(line)
            .or_insert_with(|| Breakpoint::new(template_id, line))
            .clone()
    }

    /// Replaces every breakpoint of `template_id` with `lines`.
    pub fn replace(&self, template_id: &str, lines: &[u32]) -> Vec<Breakpoint> {
        let points: BTreeMap<u32, Breakpoint> = lines
            .iter()
            .map(|&line| (line, Breakpoint::new(template_id, line)))
            .collect();
        let created = points.values().cloned().collect();

        if points.is_empty() {
            self.by_template.remove(template_id);
        } else {
            self.by_template.insert(template_id.to_string(), points);
        }
        created
    }

    /// Looks up a breakpoint.
    #[must_use]
    pub fn get(&self, template_id: &str, line: u32) -> Option<Breakpoint> {
        self.by_template
            .get(template_id)
            .and_then(|points| points.get(&line).cloned())
    }

    /// Whether a breakpoint is set at the given position.
    #[must_use]
    pub fn contains(&self, template_id: &str, line: u32) -> bool {
        self.by_template
            .get(template_id)
            .is_some_and(|points| points.contains_key(&line))
    }

    /// Removes a breakpoint, returning whether it existed.
    pub fn remove(&self, template_id: &str, line: u32) -> bool {
        let removed = self
            .by_template
            .get_mut(template_id)
            .is_some_and(|mut points| points.remove(&line).is_some());
        self.by_template
            .remove_if(template_id, |_, points| points.is_empty());
        removed
    }

    /// Removes every breakpoint.
    pub fn clear(&self) {
        self.by_template.clear();
    }

    /// Whether no breakpoint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_template.is_empty()
    }

    /// Number of breakpoints across all templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_template.iter().map(|points| points.len()).sum()
    }
}
