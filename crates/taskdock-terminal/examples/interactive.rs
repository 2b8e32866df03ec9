//! Drives one controller-backed shell session from the command line and
//! prints what the hosting view would render.
//!
//!   cargo run -p taskdock-terminal --example interactive

use std::collections::HashMap;
use std::env;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use taskdock_terminal::NoFeedback;
use taskdock_terminal::SessionConfig;
use taskdock_terminal::TerminalController;
use taskdock_terminal::UiEvent;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cwd = env::current_dir()?;
    let config = SessionConfig::new(None, &cwd, HashMap::new());
    let (mut controller, mut ui) = TerminalController::new(config, Arc::new(NoFeedback));

    controller.paste("echo hello from taskdock; pwd");
    controller.send_key("Enter");

    // Drain UI events for a couple of seconds, then show the display state.
    let deadline = Instant::now() + Duration::from_secs(2);
    while let Ok(Some(event)) = timeout_at(deadline, ui.recv()).await {
        match event {
            UiEvent::WorkingDirChanged { path } => println!("[cwd] {path}"),
            UiEvent::StatusChanged { status } => println!("[status] {status}"),
            _ => {}
        }
    }

    println!("--- display ---");
    for line in controller.lines() {
        println!("{line}");
    }
    println!("--- status: {} ---", controller.status());

    controller.shutdown();
    Ok(())
}
