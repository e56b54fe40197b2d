//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `ascend_core` wiring end to end: config, logging, storage.
//! - Print the anonymous progression summary deterministically.
//!
//! Usage: `ascend_cli [config.toml]`

use ascend_core::{
    core_version, init_logging_from_config, AppConfig, ProgressionEngine, SessionContext,
    SqliteLocalStore, SqliteProfileStore, TaskQueue,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ascend_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    init_logging_from_config(&config)?;

    let conn = ascend_core::db::open_db(&config.database_path)?;
    let local = SqliteLocalStore::new(&conn);
    let remote =
        SqliteProfileStore::with_max_attempts(&conn, config.remote.max_transaction_attempts);
    let engine = ProgressionEngine::new(&local, &remote);
    let ctx = SessionContext::load(&local)?;
    let queue = TaskQueue::load(&local, &engine)?;
    let progress = engine.current(ctx.identity())?;

    println!("ascend_core version={}", core_version());
    println!("database={}", config.database_path.display());
    println!("persona={}", ctx.persona().as_str());
    println!("xp={} level={}", progress.xp, progress.level);
    println!("tasks={}", queue.len());
    for (index, task) in queue.tasks().iter().enumerate() {
        println!("  [{index}] {}", task.title);
    }
    log::info!("event=cli_summary module=cli status=ok tasks={}", queue.len());
    Ok(())
}
