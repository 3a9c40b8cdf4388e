//! Supervise command handler.
//!
//! Starts every service, logs lifecycle events as they happen and keeps
//! the servers alive until Ctrl-C.

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{StatusReport, format_event, print_report};

/// Execute the supervise command.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let mut events = ctx.events.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!("{}", format_event(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = ctx.orchestrator.initialize().await {
        print_report(&StatusReport::collect(&ctx.orchestrator).await);
        ctx.orchestrator.shutdown().await;
        printer.abort();
        return Err(CliError::from(e).into());
    }

    print_report(&StatusReport::collect(&ctx.orchestrator).await);
    println!();
    println!("Supervising; press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");

    ctx.orchestrator.shutdown().await;
    printer.abort();
    Ok(())
}
