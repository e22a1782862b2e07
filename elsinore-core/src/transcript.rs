//! The scene transcript: an ordered, append-only utterance list.

use crate::roster::{Character, PLAYER_NAME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    /// The human player.
    Player,
    /// A cast member.
    Npc(Character),
}

impl Speaker {
    /// The display name shown in the transcript.
    pub fn name(&self) -> &'static str {
        match self {
            Speaker::Player => PLAYER_NAME,
            Speaker::Npc(character) => character.display_name(),
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One contribution to the scene, accumulated fragment by fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub content: String,
    /// True while this utterance is still receiving fragments.
    pub active: bool,
}

/// The ordered utterances of one scene.
///
/// Entries are appended as turns start and mutated in place as fragments
/// arrive; they are never reordered or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<Utterance>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Utterance] {
        &self.entries
    }

    /// Record a complete player line. Returns its index.
    pub fn push_player(&mut self, content: impl Into<String>) -> usize {
        self.entries.push(Utterance {
            speaker: Speaker::Player,
            content: content.into(),
            active: false,
        });
        self.entries.len() - 1
    }

    /// Open a new, empty, active utterance. Returns its index.
    pub(crate) fn open(&mut self, speaker: Speaker) -> usize {
        self.entries.push(Utterance {
            speaker,
            content: String::new(),
            active: true,
        });
        self.entries.len() - 1
    }

    /// Append a fragment to `speaker`'s active utterance, opening one if
    /// none exists. Returns the index of the mutated entry.
    pub(crate) fn append(&mut self, speaker: Speaker, fragment: &str) -> usize {
        let index = match self.active_index(speaker) {
            Some(index) => index,
            None => self.open(speaker),
        };
        self.entries[index].content.push_str(fragment);
        index
    }

    /// Discard `speaker`'s partial content and start over, reusing the
    /// active entry when there is one. Returns the index of the entry.
    pub(crate) fn restart(&mut self, speaker: Speaker) -> usize {
        match self.active_index(speaker) {
            Some(index) => {
                self.entries[index].content.clear();
                index
            }
            None => self.open(speaker),
        }
    }

    /// Mark `speaker`'s active utterance inactive, if any.
    pub(crate) fn deactivate(&mut self, speaker: Speaker) {
        if let Some(index) = self.active_index(speaker) {
            self.entries[index].active = false;
        }
    }

    fn active_index(&self, speaker: Speaker) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|u| u.speaker == speaker && u.active)
    }

    /// Each speaker's final line, keyed by display name: the last
    /// non-empty content per speaker, trimmed.
    pub fn script(&self) -> BTreeMap<String, String> {
        let mut lines = BTreeMap::new();
        for entry in &self.entries {
            let content = entry.content.trim();
            if !content.is_empty() {
                lines.insert(entry.speaker.name().to_string(), content.to_string());
            }
        }
        lines
    }

    /// The transcript as shown in the history view: player lines always
    /// kept, cast lines only when they carry real text.
    pub fn history(&self) -> Vec<&Utterance> {
        self.entries
            .iter()
            .filter(|u| match u.speaker {
                Speaker::Player => !u.content.trim().is_empty(),
                Speaker::Npc(_) => is_displayable(&u.content),
            })
            .collect()
    }
}

/// Whether cast content is worth showing: non-empty, not punctuation-only,
/// and free of literal `\uXXXX` escapes leaking from the remote pipeline.
fn is_displayable(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return false;
    }
    const NOISE: &str = "?？!！.,。，：:；;()（）“”‘’";
    if trimmed.chars().all(|c| NOISE.contains(c)) {
        return false;
    }
    !has_unicode_escape(trimmed)
}

fn has_unicode_escape(s: &str) -> bool {
    s.match_indices("\\u").any(|(i, _)| {
        let digits = &s[i + 2..];
        digits.len() >= 4 && digits.bytes().take(4).all(|b| b.is_ascii_hexdigit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_lines_are_complete() {
        let mut transcript = Transcript::new();
        transcript.push_player("你是谁?");

        let entry = &transcript.entries()[0];
        assert_eq!(entry.speaker, Speaker::Player);
        assert!(!entry.active);
    }

    #[test]
    fn test_append_opens_lazily() {
        let mut transcript = Transcript::new();
        let speaker = Speaker::Npc(Character::Ghost);

        transcript.append(speaker, "记住");
        transcript.append(speaker, "我");

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.entries()[0].content, "记住我");
        assert!(transcript.entries()[0].active);
    }

    #[test]
    fn test_restart_discards_partial_content() {
        let mut transcript = Transcript::new();
        let speaker = Speaker::Npc(Character::Ophelia);

        transcript.open(speaker);
        transcript.append(speaker, "hello");
        transcript.restart(speaker);
        transcript.append(speaker, "hi");

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.entries()[0].content, "hi");
    }

    #[test]
    fn test_deactivate_then_reopen_appends_new_entry() {
        let mut transcript = Transcript::new();
        let speaker = Speaker::Npc(Character::Horatio);

        transcript.open(speaker);
        transcript.append(speaker, "殿下");
        transcript.deactivate(speaker);
        transcript.open(speaker);
        transcript.append(speaker, "请听我说");

        assert_eq!(transcript.len(), 2);
        assert!(!transcript.entries()[0].active);
        assert!(transcript.entries()[1].active);
    }

    #[test]
    fn test_script_keeps_last_nonempty_line_per_speaker() {
        let mut transcript = Transcript::new();
        transcript.push_player("大家好");
        let ghost = Speaker::Npc(Character::Ghost);
        transcript.open(ghost);
        transcript.append(ghost, "第一句");
        transcript.deactivate(ghost);
        transcript.open(ghost);
        transcript.append(ghost, " 第二句 ");
        transcript.open(Speaker::Npc(Character::Queen));

        let script = transcript.script();
        assert_eq!(script.get(PLAYER_NAME).map(String::as_str), Some("大家好"));
        assert_eq!(script.get("鬼魂").map(String::as_str), Some("第二句"));
        assert!(!script.contains_key("王后"));
    }

    #[test]
    fn test_history_filters_noise() {
        let mut transcript = Transcript::new();
        transcript.push_player("？？");
        let ophelia = Speaker::Npc(Character::Ophelia);
        transcript.append(ophelia, "……你好");
        transcript.deactivate(ophelia);
        let polonius = Speaker::Npc(Character::Polonius);
        transcript.append(polonius, "？！。");
        transcript.deactivate(polonius);
        let queen = Speaker::Npc(Character::Queen);
        transcript.append(queen, "\\u54c8\\u59c6");

        let history = transcript.history();
        let names: Vec<_> = history.iter().map(|u| u.speaker.name()).collect();
        // Player noise is kept; cast punctuation-only and escape-riddled
        // lines are not.
        assert_eq!(names, vec![PLAYER_NAME, "奥菲利娅"]);
    }
}
