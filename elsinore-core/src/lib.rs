//! Interactive-fiction session engine for the Elsinore scenario.
//!
//! A human player converses with the castle's cast; the cast's lines are
//! produced by a remote generative dialogue service and arrive as a
//! chunked, event-tagged stream. This crate owns everything between the
//! wire and a renderer:
//! - Speaker demultiplexing of streamed text into per-character utterances
//! - Conversation-identity capture and reuse across turns
//! - End-of-turn reconciliation of per-character memories and goals
//! - The scene orchestrator tying it together around the `dify` client
//!
//! # Quick Start
//!
//! ```ignore
//! use elsinore_core::{Character, EndTurn, Scene, SceneConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SceneConfig::new(vec![Character::Ghost, Character::Horatio]);
//!     let mut scene = Scene::from_env(config)?;
//!
//!     let transcript = scene.send_message("你们看见先王了吗？").await?;
//!     for utterance in transcript.entries() {
//!         println!("{}: {}", utterance.speaker, utterance.content);
//!     }
//!
//!     if let EndTurn::Complete { memories, goals, .. } = scene.end_turn().await? {
//!         // Hand memories and goals to the next scene.
//!         let _ = (memories, goals);
//!     }
//!     Ok(())
//! }
//! ```

pub mod mux;
pub mod reconcile;
pub mod roster;
pub mod scene;
pub mod state;
pub mod transcript;

// Primary public API
pub use mux::SpeakerMux;
pub use reconcile::{EndTurnReport, Reconciler};
pub use roster::{
    Character, END_TURN_QUERY, GOAL_SUFFIX, MEMORY_TAG, PLAYER_NAME, PLAYER_USER,
};
pub use scene::{EndTurn, Scene, SceneConfig, SceneError, SceneUpdate};
pub use state::SessionState;
pub use transcript::{Speaker, Transcript, Utterance};
