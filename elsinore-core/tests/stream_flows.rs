//! End-to-end tests over synthetic event streams.
//!
//! These drive the full decode → demultiplex → reconcile path the way a
//! live response would, but from fixed protocol bytes, so they exercise
//! chunk reassembly, decoder resilience, and state reconciliation together
//! without a network.

use dify::{decode_event_line, LineBuffer, StreamEvent};
use elsinore_core::{Character, Reconciler, SessionState, Speaker, SpeakerMux, Transcript};
use std::collections::BTreeMap;

const ROSTER: [Character; 3] = [Character::Ghost, Character::Ophelia, Character::Queen];

/// Decode a raw protocol body into events, fed in `chunk_size`-byte slices.
fn decode_body(body: &[u8], chunk_size: usize) -> Vec<StreamEvent> {
    let mut buffer = LineBuffer::new();
    let mut events = Vec::new();
    for chunk in body.chunks(chunk_size.max(1)) {
        for line in buffer.feed(chunk) {
            if let Some(event) = decode_event_line(&line) {
                events.push(event);
            }
        }
    }
    events
}

/// Run a decoded ordinary-turn stream through mux + session tracking.
fn run_dialogue(events: &[StreamEvent]) -> (Transcript, SessionState) {
    let mut transcript = Transcript::new();
    let mut state = SessionState::new();
    let mut mux = SpeakerMux::new(&ROSTER);
    for event in events {
        if let Some(id) = event.conversation_id.as_deref() {
            state.observe_conversation_id(id);
        }
        mux.apply(event, &mut transcript);
    }
    (transcript, state)
}

const DIALOGUE_BODY: &[u8] = "data: {\"event\":\"workflow_started\",\"conversation_id\":\"c-main\"}\n\
data: {\"event\":\"node_started\",\"data\":{\"title\":\"鬼魂\"}}\n\
data: {\"event\":\"message\",\"answer\":\"记住\"}\n\
data: {\"event\":\"message\",\"answer\":\"我\"}\n\
data: {\"event\":\"node_started\",\"data\":{\"title\":\"王后\"}}\n\
data: {\"event\":\"message\",\"answer\":\"我的儿\",\"conversation_id\":\"c-late\"}\n\
data: [DONE]\n"
    .as_bytes();

#[test]
fn test_transcript_is_invariant_under_chunking() {
    let expected = decode_body(DIALOGUE_BODY, DIALOGUE_BODY.len());
    let (expected_transcript, _) = run_dialogue(&expected);

    // Every chunk size, down to byte-at-a-time delivery that splits the
    // multi-byte character names mid-code-point.
    for chunk_size in 1..=DIALOGUE_BODY.len() {
        let events = decode_body(DIALOGUE_BODY, chunk_size);
        let (transcript, _) = run_dialogue(&events);
        assert_eq!(
            transcript, expected_transcript,
            "divergence at chunk size {chunk_size}"
        );
    }
}

#[test]
fn test_dialogue_stream_demultiplexes_by_speaker() {
    let events = decode_body(DIALOGUE_BODY, 7);
    let (transcript, state) = run_dialogue(&events);

    let entries = transcript.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].speaker, Speaker::Npc(Character::Ghost));
    assert_eq!(entries[0].content, "记住我");
    assert!(!entries[0].active);
    assert_eq!(entries[1].speaker, Speaker::Npc(Character::Queen));
    assert_eq!(entries[1].content, "我的儿");
    assert!(entries[1].active);

    // The first id wins; the later different id is ignored.
    assert_eq!(state.conversation_id(), Some("c-main"));
}

#[test]
fn test_malformed_line_does_not_disturb_neighbors() {
    let body = "data: {\"event\":\"node_started\",\"data\":{\"title\":\"鬼魂\"}}\n\
data: {\"answer\":\"前\"}\n\
data: {broken json!!\n\
data: {\"answer\":\"后\"}\n"
        .as_bytes();

    let events = decode_body(body, 3);
    let (transcript, _) = run_dialogue(&events);

    assert_eq!(transcript.entries().len(), 1);
    assert_eq!(transcript.entries()[0].content, "前后");
}

#[test]
fn test_end_turn_stream_reconciles_memories_and_goals() {
    let body = "data: {\"event\":\"node_finished\",\"data\":{\"title\":\"记忆系统\",\"outputs\":{\"text\":\"T1\"}}}\n\
data: {\"event\":\"node_finished\",\"data\":{\"title\":\"记忆系统\",\"outputs\":{\"text\":\"T2\"}}}\n\
data: {\"event\":\"node_finished\",\"data\":{\"title\":\"奥菲利娅目标\",\"outputs\":{\"text\":\"G\"}}}\n\
data: {\"event\":\"node_finished\",\"data\":{\"title\":\"哈姆雷特目标\",\"outputs\":{\"text\":\"ignored\"}}}\n\
data: [DONE]\n"
        .as_bytes();

    let events = decode_body(body, 5);
    let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
    for event in &events {
        reconciler.apply(event);
    }
    let report = reconciler.finish();

    for character in ROSTER {
        assert_eq!(report.memories[&character], "T1\nT2\n");
    }
    // The player has no goal slot; only the one mapped cast member landed.
    assert_eq!(report.goals.len(), 1);
    assert_eq!(report.goals[&Character::Ophelia], "G");
}

#[test]
fn test_reconciliation_composes_across_scenes() {
    let mut reconciler = Reconciler::new(&ROSTER, BTreeMap::new());
    reconciler.apply(&finished_event("记忆系统", "第一幕"));
    let first = reconciler.finish();

    let mut reconciler = Reconciler::new(&ROSTER, first.memories);
    reconciler.apply(&finished_event("记忆系统", "第二幕"));
    let second = reconciler.finish();

    assert_eq!(second.memories[&Character::Queen], "第一幕\n第二幕\n");
}

fn finished_event(title: &str, text: &str) -> StreamEvent {
    let line = format!(
        "data: {{\"event\":\"node_finished\",\"data\":{{\"title\":\"{title}\",\"outputs\":{{\"text\":\"{text}\"}}}}}}"
    );
    decode_event_line(&line).expect("synthetic event should decode")
}
