//! Status command handler.
//!
//! Starts every service once, prints what is running as JSON, then shuts
//! everything down again.

use anyhow::Result;
use tracing::warn;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::StatusReport;

/// Execute the status command.
///
/// The report is printed even when startup fails so the failing phase is
/// visible; the command still exits non-zero in that case.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let started = ctx.orchestrator.initialize().await;
    if let Err(e) = &started {
        warn!(error = %e, "Startup failed");
    }

    let report = StatusReport::collect(&ctx.orchestrator).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    ctx.orchestrator.shutdown().await;
    started.map_err(CliError::from)?;
    Ok(())
}
