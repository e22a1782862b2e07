//! Scene orchestration: one visit to a location with a fixed cast.

use crate::mux::SpeakerMux;
use crate::reconcile::{EndTurnReport, Reconciler};
use crate::roster::{Character, END_TURN_QUERY, PLAYER_USER};
use crate::state::SessionState;
use crate::transcript::{Transcript, Utterance};
use dify::{ChatRequest, Dify, StreamEvent};
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors from scene operations.
#[derive(Debug, Error)]
pub enum SceneError {
    /// The request could not be completed. Carries the response body when
    /// the service sent one. Committed transcript and session state are
    /// untouched; only the in-flight operation is lost.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The dialogue service client could not be configured.
    #[error("dialogue service not configured: {0}")]
    NotConfigured(String),
}

impl From<dify::Error> for SceneError {
    fn from(err: dify::Error) -> Self {
        SceneError::RequestFailed(err.to_string())
    }
}

/// Configuration for entering a scene.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// The cast present in this scene.
    pub roster: Vec<Character>,
    /// Memories carried over from previous scenes.
    pub prior_memories: BTreeMap<Character, String>,
    /// Goals carried over from previous scenes.
    pub prior_goals: BTreeMap<Character, String>,
}

impl SceneConfig {
    pub fn new(roster: Vec<Character>) -> Self {
        Self {
            roster,
            prior_memories: BTreeMap::new(),
            prior_goals: BTreeMap::new(),
        }
    }

    pub fn with_memories(mut self, memories: BTreeMap<Character, String>) -> Self {
        self.prior_memories = memories;
        self
    }

    pub fn with_goals(mut self, goals: BTreeMap<Character, String>) -> Self {
        self.prior_goals = goals;
        self
    }
}

/// A live update published while a response stream is being consumed.
///
/// Updates carry the scene id so a consumer holding receivers from more
/// than one scene can discard those of a scene it has abandoned.
#[derive(Debug, Clone)]
pub struct SceneUpdate {
    pub scene_id: Uuid,
    pub utterance: Utterance,
}

/// Outcome of ending the turn sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndTurn {
    /// No conversation was ever established, or nothing was said; no
    /// request was made and state is unchanged.
    NothingToReconcile,
    /// The scene is complete.
    Complete {
        /// Memory map after this scene: full, merged over prior memories.
        memories: BTreeMap<Character, String>,
        /// Goal map after this scene, with this turn's updates folded in.
        goals: BTreeMap<Character, String>,
        /// Only the goals touched during this scene.
        updated_goals: BTreeMap<Character, String>,
        /// Each speaker's final line, keyed by display name.
        script: BTreeMap<String, String>,
    },
}

/// One self-contained visit to a location with a fixed cast.
///
/// The scene owns its transcript and session state exclusively; callers
/// receive snapshots at operation boundaries, plus live per-fragment
/// updates over the optional channel. Both operations take `&mut self`,
/// so at most one request is ever in flight and the multiplexer is never
/// re-entered. Dropping an operation's future abandons it along with its
/// HTTP request; a consumer tells stale updates apart by scene id.
pub struct Scene {
    id: Uuid,
    client: Dify,
    roster: Vec<Character>,
    transcript: Transcript,
    state: SessionState,
    updates: Option<mpsc::UnboundedSender<SceneUpdate>>,
}

impl Scene {
    /// Enter a scene with an explicit client.
    pub fn new(client: Dify, config: SceneConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            roster: config.roster,
            transcript: Transcript::new(),
            state: SessionState::with_prior(config.prior_memories, config.prior_goals),
            updates: None,
        }
    }

    /// Enter a scene using DIFY_API_URL and DIFY_API_KEY for the client.
    pub fn from_env(config: SceneConfig) -> Result<Self, SceneError> {
        let client = Dify::from_env().map_err(|e| SceneError::NotConfigured(e.to_string()))?;
        Ok(Self::new(client, config))
    }

    /// Publish per-fragment updates to `tx` while streams are consumed.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<SceneUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn roster(&self) -> &[Character] {
        &self.roster
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Send one player message and stream the cast's replies.
    ///
    /// The player's line lands in the transcript as soon as the request is
    /// accepted; cast replies accumulate utterance by utterance as the
    /// stream arrives. Returns a transcript snapshot taken at stream end.
    /// Whitespace-only input is a no-op.
    pub async fn send_message(&mut self, text: &str) -> Result<Transcript, SceneError> {
        if text.trim().is_empty() {
            return Ok(self.transcript.clone());
        }

        let request = self.build_request(text);
        let events = self.client.chat_stream(request).await?;

        let index = self.transcript.push_player(text);
        self.publish(index);

        self.run_dialogue(events).await?;
        tracing::info!(scene = %self.id, utterances = self.transcript.len(), "turn complete");
        Ok(self.transcript.clone())
    }

    /// End the turn sequence, reconciling memories and goals.
    ///
    /// Without an established conversation, or with nothing said, there is
    /// nothing to reconcile and no request is made.
    pub async fn end_turn(&mut self) -> Result<EndTurn, SceneError> {
        if self.state.conversation_id().is_none() || self.transcript.is_empty() {
            return Ok(EndTurn::NothingToReconcile);
        }

        let request = self.build_request(END_TURN_QUERY);
        let events = self.client.chat_stream(request).await?;
        let report = self.run_end_turn(events).await?;

        self.state.replace_memories(report.memories);
        self.state.merge_goals(&report.goals);
        tracing::info!(scene = %self.id, touched_goals = report.goals.len(), "scene complete");

        Ok(EndTurn::Complete {
            memories: self.state.memories().clone(),
            goals: self.state.goals().clone(),
            updated_goals: report.goals,
            script: self.transcript.script(),
        })
    }

    /// Drive an ordinary-turn response stream through the multiplexer.
    async fn run_dialogue(
        &mut self,
        mut events: impl Stream<Item = Result<StreamEvent, dify::Error>> + Unpin,
    ) -> Result<(), SceneError> {
        let mut mux = SpeakerMux::new(&self.roster);
        while let Some(event) = events.next().await {
            let event = event?;
            if let Some(id) = event.conversation_id.as_deref() {
                self.state.observe_conversation_id(id);
            }
            if let Some(index) = mux.apply(&event, &mut self.transcript) {
                self.publish(index);
            }
        }
        Ok(())
    }

    /// Drive an end-of-turn response stream through the reconciler.
    ///
    /// The report is only committed by the caller once the stream finishes
    /// cleanly; a mid-stream failure leaves session state as it was.
    async fn run_end_turn(
        &mut self,
        mut events: impl Stream<Item = Result<StreamEvent, dify::Error>> + Unpin,
    ) -> Result<EndTurnReport, SceneError> {
        let mut reconciler = Reconciler::new(&self.roster, self.state.memories().clone());
        while let Some(event) = events.next().await {
            let event = event?;
            if let Some(id) = event.conversation_id.as_deref() {
                self.state.observe_conversation_id(id);
            }
            reconciler.apply(&event);
        }
        Ok(reconciler.finish())
    }

    fn build_request(&self, query: &str) -> ChatRequest {
        let mut request =
            ChatRequest::new(query, PLAYER_USER).with_inputs(self.state.to_inputs(&self.roster));
        if let Some(id) = self.state.conversation_id() {
            request = request.with_conversation_id(id);
        }
        request
    }

    /// Push one utterance snapshot to the live-update channel, if any.
    fn publish(&self, index: usize) {
        let Some(tx) = &self.updates else { return };
        if let Some(utterance) = self.transcript.entries().get(index) {
            // A closed receiver just means nobody is watching anymore.
            let _ = tx.send(SceneUpdate {
                scene_id: self.id,
                utterance: utterance.clone(),
            });
        }
    }
}
