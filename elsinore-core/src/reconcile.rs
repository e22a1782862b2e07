//! End-of-turn state reconciliation.
//!
//! The end-of-turn response stream carries completion events for the
//! service's memory and goal subsystems. Memory text is appended, with a
//! newline separator, to every roster member's cumulative memory — the
//! service emits one undifferentiated string per event and does not say
//! whom it concerns. Goal text replaces a single character's goal, the
//! character being named by the event title. The asymmetry (append and
//! broadcast for memories, replace and partial for goals) is contractual:
//! downstream narrative continuity depends on it.

use crate::roster::{Character, GOAL_SUFFIX, MEMORY_TAG};
use dify::{EventKind, StreamEvent};
use std::collections::BTreeMap;

/// The reconciled result of one end-of-turn stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndTurnReport {
    /// The full memory map: prior memories merged with this turn's appends.
    pub memories: BTreeMap<Character, String>,
    /// Only the goals touched this turn. The orchestration layer merges
    /// this over the prior goals exactly once.
    pub goals: BTreeMap<Character, String>,
}

/// Scans an end-of-turn stream for memory and goal completion events.
#[derive(Debug)]
pub struct Reconciler<'a> {
    roster: &'a [Character],
    memories: BTreeMap<Character, String>,
    goals: BTreeMap<Character, String>,
}

impl<'a> Reconciler<'a> {
    /// Start reconciling on top of the prior memory map.
    pub fn new(roster: &'a [Character], prior_memories: BTreeMap<Character, String>) -> Self {
        Self {
            roster,
            memories: prior_memories,
            goals: BTreeMap::new(),
        }
    }

    /// Apply one decoded event.
    pub fn apply(&mut self, event: &StreamEvent) {
        let EventKind::NodeFinished {
            title: Some(title),
            text: Some(text),
        } = &event.kind
        else {
            return;
        };
        if text.is_empty() {
            return;
        }

        if title == MEMORY_TAG {
            self.append_memories(text);
        } else if let Some(name) = title.strip_suffix(GOAL_SUFFIX) {
            self.set_goal(name.trim(), text);
        }
    }

    /// Broadcast one emitted memory to every roster member.
    fn append_memories(&mut self, text: &str) {
        for character in self.roster {
            let entry = self.memories.entry(*character).or_default();
            entry.push_str(text);
            entry.push('\n');
        }
    }

    fn set_goal(&mut self, name: &str, text: &str) {
        match Character::from_display_name(name) {
            Some(character) => {
                self.goals.insert(character, text.to_string());
            }
            None => tracing::debug!(name, "ignoring goal for unknown character"),
        }
    }

    /// Finish the stream and yield the reconciled maps.
    pub fn finish(self) -> EndTurnReport {
        EndTurnReport {
            memories: self.memories,
            goals: self.goals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: [Character; 3] = [Character::Ghost, Character::Ophelia, Character::Laertes];

    fn finished(title: &str, text: &str) -> StreamEvent {
        StreamEvent {
            kind: EventKind::NodeFinished {
                title: Some(title.to_string()),
                text: Some(text.to_string()),
            },
            conversation_id: None,
        }
    }

    #[test]
    fn test_memory_broadcasts_to_whole_roster() {
        let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
        reconciler.apply(&finished("记忆系统", "T"));
        let report = reconciler.finish();

        assert_eq!(report.memories.len(), 3);
        for character in ROSTER {
            assert_eq!(report.memories[&character], "T\n");
        }
    }

    #[test]
    fn test_memories_chain_across_events_and_turns() {
        let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
        reconciler.apply(&finished("记忆系统", "T1"));
        let report = reconciler.finish();

        // A second reconciliation starts from the first one's output.
        let mut reconciler = Reconciler::new(&ROSTER, report.memories);
        reconciler.apply(&finished("记忆系统", "T2"));
        let report = reconciler.finish();

        assert_eq!(report.memories[&Character::Ghost], "T1\nT2\n");
    }

    #[test]
    fn test_goal_replaces_single_touched_slot() {
        let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
        reconciler.apply(&finished("奥菲利娅目标", "G"));
        let report = reconciler.finish();

        assert_eq!(report.goals.len(), 1);
        assert_eq!(report.goals[&Character::Ophelia], "G");
    }

    #[test]
    fn test_goal_title_is_trimmed_after_suffix_strip() {
        let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
        reconciler.apply(&finished(" 雷欧提斯 目标", "复仇"));
        let report = reconciler.finish();

        assert_eq!(report.goals[&Character::Laertes], "复仇");
    }

    #[test]
    fn test_unmapped_goal_name_is_ignored() {
        let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
        reconciler.apply(&finished("福丁布拉斯目标", "进军丹麦"));
        reconciler.apply(&finished("目标", "无名"));
        let report = reconciler.finish();

        assert!(report.goals.is_empty());
    }

    #[test]
    fn test_unrelated_and_empty_events_are_ignored() {
        let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
        reconciler.apply(&finished("台词生成", "某段台词"));
        reconciler.apply(&finished("记忆系统", ""));
        reconciler.apply(&StreamEvent {
            kind: EventKind::Answer {
                fragment: "片段".to_string(),
            },
            conversation_id: None,
        });
        let report = reconciler.finish();

        assert!(report.memories.is_empty());
        assert!(report.goals.is_empty());
    }

    #[test]
    fn test_prior_memories_survive_untouched_turn() {
        let mut prior = BTreeMap::new();
        prior.insert(Character::Ghost, "旧事\n".to_string());

        let reconciler = Reconciler::new(&ROSTER, prior);
        let report = reconciler.finish();

        assert_eq!(report.memories[&Character::Ghost], "旧事\n");
    }
}
