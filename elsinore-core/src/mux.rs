//! Speaker demultiplexing for ordinary-turn response streams.

use crate::roster::Character;
use crate::transcript::{Speaker, Transcript};
use dify::{EventKind, StreamEvent};

/// Routes decoded stream events into per-speaker utterances.
///
/// One multiplexer serves exactly one response stream. It owns the
/// "current speaker" state outright, so a second stream can never
/// interleave with it — a fresh multiplexer is built per request.
#[derive(Debug)]
pub struct SpeakerMux<'a> {
    roster: &'a [Character],
    current: Option<Character>,
}

impl<'a> SpeakerMux<'a> {
    pub fn new(roster: &'a [Character]) -> Self {
        Self {
            roster,
            current: None,
        }
    }

    /// The speaker currently accumulating fragments.
    pub fn current(&self) -> Option<Character> {
        self.current
    }

    /// Apply one decoded event to the transcript.
    ///
    /// Returns the index of the utterance that changed, if any.
    pub fn apply(&mut self, event: &StreamEvent, transcript: &mut Transcript) -> Option<usize> {
        match &event.kind {
            EventKind::NodeStarted { title: Some(title) } => {
                // A start-of-turn whose title is not in the roster is
                // pipeline noise; the prior speaker keeps accumulating.
                let speaker = self.roster_member(title)?;
                Some(self.begin(speaker, transcript))
            }
            EventKind::Answer { fragment } => self.append(fragment, transcript),
            _ => None,
        }
    }

    fn roster_member(&self, title: &str) -> Option<Character> {
        Character::from_display_name(title).filter(|c| self.roster.contains(c))
    }

    /// Start (or restart) a turn for `speaker`.
    fn begin(&mut self, speaker: Character, transcript: &mut Transcript) -> usize {
        match self.current {
            // The service redid this speaker's line: the partial content
            // for the turn is discarded.
            Some(prev) if prev == speaker => transcript.restart(Speaker::Npc(speaker)),
            Some(prev) => {
                transcript.deactivate(Speaker::Npc(prev));
                self.current = Some(speaker);
                transcript.open(Speaker::Npc(speaker))
            }
            None => {
                self.current = Some(speaker);
                transcript.open(Speaker::Npc(speaker))
            }
        }
    }

    fn append(&mut self, fragment: &str, transcript: &mut Transcript) -> Option<usize> {
        let Some(speaker) = self.current else {
            tracing::debug!(fragment, "dropping fragment with no active speaker");
            return None;
        };
        Some(transcript.append(Speaker::Npc(speaker), fragment))
    }
}
