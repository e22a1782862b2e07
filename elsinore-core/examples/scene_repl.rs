//! Minimal line-based driver for a scene.
//!
//! Reads player lines from stdin, prints cast replies as they stream in,
//! and reconciles on EOF. Requires DIFY_API_URL and DIFY_API_KEY.
//!
//! Run with: `cargo run -p elsinore-core --example scene_repl`

use elsinore_core::{Character, EndTurn, Scene, SceneConfig};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let config = SceneConfig::new(vec![
        Character::Ghost,
        Character::Horatio,
        Character::Queen,
    ]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scene = Scene::from_env(config)?.with_updates(tx);

    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if update.utterance.active {
                println!("{}: {}", update.utterance.speaker, update.utterance.content);
            }
        }
    });

    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if let Err(e) = scene.send_message(&line).await {
            eprintln!("turn failed: {e}");
        }
        print!("> ");
        io::stdout().flush()?;
    }

    match scene.end_turn().await? {
        EndTurn::Complete { memories, goals, .. } => {
            println!("-- scene complete --");
            for (character, memory) in &memories {
                println!("{character} remembers: {}", memory.trim_end());
            }
            for (character, goal) in &goals {
                println!("{character} now wants: {goal}");
            }
        }
        EndTurn::NothingToReconcile => println!("-- nothing happened --"),
    }

    drop(scene);
    printer.abort();
    Ok(())
}
