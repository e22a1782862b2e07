//! Per-session dialogue state: conversation identity, memories, goals.

use crate::roster::Character;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// State surviving across turns within one dialogue session.
///
/// Owned exclusively by the scene orchestrator; collaborators see clones
/// taken at operation boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    conversation_id: Option<String>,
    memories: BTreeMap<Character, String>,
    goals: BTreeMap<Character, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from state handed back by a previous scene.
    pub fn with_prior(
        memories: BTreeMap<Character, String>,
        goals: BTreeMap<Character, String>,
    ) -> Self {
        Self {
            conversation_id: None,
            memories,
            goals,
        }
    }

    /// The conversation id, once one has been captured.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Capture the conversation id the first time one appears.
    ///
    /// The id names server-side conversational context; losing or changing
    /// it desynchronizes the narrative, so the first non-empty value wins
    /// and later values are ignored.
    pub fn observe_conversation_id(&mut self, id: &str) {
        if self.conversation_id.is_none() && !id.is_empty() {
            tracing::debug!(id, "conversation established");
            self.conversation_id = Some(id.to_string());
        }
    }

    /// A character's cumulative memory, or the empty string.
    pub fn memory(&self, character: Character) -> &str {
        self.memories
            .get(&character)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// A character's current goal, or the empty string.
    pub fn goal(&self, character: Character) -> &str {
        self.goals
            .get(&character)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn memories(&self) -> &BTreeMap<Character, String> {
        &self.memories
    }

    pub fn goals(&self) -> &BTreeMap<Character, String> {
        &self.goals
    }

    /// Replace the memory map wholesale with a reconciled one.
    pub(crate) fn replace_memories(&mut self, memories: BTreeMap<Character, String>) {
        self.memories = memories;
    }

    /// Merge a partial goal map over the prior goals.
    ///
    /// Reconciliation returns only the slots touched this turn; this is
    /// the single point where they are folded into the surviving state.
    pub(crate) fn merge_goals(&mut self, updated: &BTreeMap<Character, String>) {
        for (character, goal) in updated {
            self.goals.insert(*character, goal.clone());
        }
    }

    /// Build the wire `inputs` object for an outbound request.
    ///
    /// Every slot field is always present; characters with no stored value
    /// send the empty string.
    pub fn to_inputs(&self, roster: &[Character]) -> Map<String, Value> {
        let names: Vec<&str> = roster.iter().map(|c| c.display_name()).collect();

        let mut inputs = Map::new();
        inputs.insert("npc".to_string(), json!(names.join(",")));
        inputs.insert("people".to_string(), json!(roster.len()));
        for character in Character::ALL {
            inputs.insert(character.memory_key(), json!(self.memory(character)));
            inputs.insert(character.goal_key(), json!(self.goal(character)));
        }
        inputs
    }
}
