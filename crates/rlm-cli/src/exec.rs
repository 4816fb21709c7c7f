//! Exec command implementation for rlm CLI.
//!
//! Loads files into a session and runs each snippet in turn.

use std::path::PathBuf;

use rlm_core::{EngineConfig, SessionRegistry, load_file, load_files};

use crate::report;

/// Load files and run snippets against them.
pub async fn execute(
    config: EngineConfig,
    files: &[PathBuf],
    session: &str,
    snippets: &[String],
) -> anyhow::Result<()> {
    let registry = SessionRegistry::new(config);

    println!("{}\n", load(&registry, session, files).await?);

    for code in snippets {
        println!("{}\n", run(&registry, session, code).await?);
    }

    Ok(())
}

/// Read `files`, replace `session` with their content and describe the load.
///
/// A single path must exist; with several, missing ones are reported and the
/// rest are loaded.
pub async fn load(
    registry: &SessionRegistry,
    session: &str,
    files: &[PathBuf],
) -> anyhow::Result<String> {
    let content = match files {
        [] => anyhow::bail!("No files given"),
        [path] => load_file(path).await?,
        paths => load_files(paths).await?,
    };
    if content.files.is_empty() {
        anyhow::bail!("None of the {} files were found", files.len());
    }

    let summary = report::load_report(&content, session, registry.config().max_executions);
    registry.load(session, content).await?;
    Ok(summary)
}

/// Run one snippet and format the outcome.
pub async fn run(registry: &SessionRegistry, session: &str, code: &str) -> anyhow::Result<String> {
    let result = registry.execute(session, code).await;
    let info = registry.info(session).await?;
    Ok(report::result_report(
        &result,
        info.execution_count,
        info.max_executions,
    ))
}
