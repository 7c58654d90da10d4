//! Weighted prompts and the set of prompts rejected by the service.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Snapshot of the prompt grid, keyed by prompt id.
pub type PromptMap = BTreeMap<String, WeightedPrompt>;

/// A text prompt with the weight it contributes to the generated music.
///
/// Prompts are owned by the caller's prompt grid; the session manager only
/// ever holds a read-only snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPrompt {
    /// Stable, opaque identifier
    pub prompt_id: String,
    /// Prompt text sent to the service
    pub text: String,
    /// Non-negative weight, 0 means inactive
    pub weight: f32,
    /// Display color tag
    pub color: String,
    /// Controller channel the prompt is mapped to
    pub cc: u8,
}

impl WeightedPrompt {
    /// Create a prompt with no color and controller channel 0.
    pub fn new(prompt_id: impl Into<String>, text: impl Into<String>, weight: f32) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            text: text.into(),
            weight,
            color: String::new(),
            cc: 0,
        }
    }

    /// Builder-style color setter
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Builder-style controller channel setter
    pub const fn with_cc(mut self, cc: u8) -> Self {
        self.cc = cc;
        self
    }

    /// Whether the weight makes this prompt contribute at all
    pub fn has_weight(&self) -> bool {
        self.weight > 0.0
    }
}

/// Build a [`PromptMap`] from a list of prompts.
pub fn prompt_map(prompts: impl IntoIterator<Item = WeightedPrompt>) -> PromptMap {
    prompts
        .into_iter()
        .map(|p| (p.prompt_id.clone(), p))
        .collect()
}

/// A prompt the service refused to use, with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredPrompt {
    /// Offending prompt text
    pub text: String,
    /// Reason reported by the service
    pub filtered_reason: String,
}

/// Texts the service has rejected during the lifetime of a manager.
///
/// Append-only: once rejected, a text stays excluded from submission.
#[derive(Debug, Clone, Default)]
pub struct FilteredPromptSet {
    texts: HashSet<String>,
}

impl FilteredPromptSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rejected text. Returns `false` if it was already present.
    pub fn insert(&mut self, text: impl Into<String>) -> bool {
        self.texts.insert(text.into())
    }

    /// Whether the text has been rejected
    pub fn contains(&self, text: &str) -> bool {
        self.texts.contains(text)
    }

    /// Number of rejected texts
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether nothing has been rejected yet
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Rejected texts in sorted order
    pub fn texts(&self) -> Vec<String> {
        let mut texts: Vec<String> = self.texts.iter().cloned().collect();
        texts.sort();
        texts
    }
}

/// Select the prompts eligible for submission: positive weight and a text
/// the service has not rejected.
pub fn active_prompts(prompts: &PromptMap, filtered: &FilteredPromptSet) -> Vec<WeightedPrompt> {
    prompts
        .values()
        .filter(|p| p.has_weight() && !filtered.contains(&p.text))
        .cloned()
        .collect()
}
