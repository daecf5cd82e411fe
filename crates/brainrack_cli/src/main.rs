//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `brainrack_core` linkage with a deterministic probe.
//! - With a database path argument, print that database's workspaces.

use brainrack_core::{CanvasConfig, CanvasSession};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    println!("brainrack_core ping={}", brainrack_core::ping());
    println!("brainrack_core version={}", brainrack_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    let session = match CanvasSession::open_sqlite(&db_path, CanvasConfig::default()) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("failed to open `{db_path}`: {err}");
            return ExitCode::FAILURE;
        }
    };
    session.load().await;

    let registry = session.registry();
    let active = registry.active_workspace_id();
    for workspace in registry.workspaces() {
        let marker = if Some(workspace.id) == active { '*' } else { ' ' };
        println!(
            "{marker} {} {} last_opened_at={}",
            workspace.id, workspace.name, workspace.last_opened_at
        );
    }
    println!(
        "workspaces={} open_thoughts={}",
        registry.workspaces().len(),
        session.canvas().thoughts().len()
    );
    ExitCode::SUCCESS
}
