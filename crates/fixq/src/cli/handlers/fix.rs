//! `fixq fix`: repair queued tests until the queue drains

use anyhow::Result;
use clap::ArgMatches;
use fixq_core::{
    adapters::{default_verify_command, detect_framework},
    Error, RepairLoop, RepairOutcome, RetryCoordinator, ShellRepairAgent, ShellVerifier,
};

use super::Context;
use crate::output::{Report, Status};

pub async fn handle(ctx: &Context, matches: &ArgMatches) -> Result<Report> {
    let repair_command = ctx.config.repair.command.trim();
    if repair_command.is_empty() {
        return Err(Error::Config(
            "repair.command is not set; add it to .fixq/config.toml".to_string(),
        )
        .into());
    }
    let verify_command = verify_command(ctx)?;
    let limit = matches.get_one::<usize>("limit").copied().unwrap_or(usize::MAX);

    let queue = ctx.queue();
    if queue.is_empty().await? {
        return Ok(Report::nothing("fix", "Queue is empty"));
    }

    let retry = RetryCoordinator::new(queue.clone(), ctx.config.retry_policy());
    let agent = ShellRepairAgent::new(repair_command, &ctx.root);
    let verifier = ShellVerifier::new(verify_command, &ctx.root);
    let summary = RepairLoop::new(&queue, &retry, &agent, &verifier)
        .run(limit)
        .await?;

    let lines = summary
        .reports
        .iter()
        .map(|report| match report.outcome {
            RepairOutcome::Fixed => format!("  fixed     {}", report.file_path),
            RepairOutcome::Requeued { failure_count } => {
                format!("  requeued  {} (failures: {failure_count})", report.file_path)
            }
            RepairOutcome::GaveUp { failure_count } => {
                format!("  gave up   {} (failures: {failure_count})", report.file_path)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let text = format!(
        "Fixed {}, requeued {}, gave up on {}\n{lines}",
        summary.fixed, summary.requeued, summary.gave_up
    );

    let report = Report::done("fix", text, &summary)?;
    Ok(if summary.gave_up > 0 {
        report.with_status(Status::GaveUp)
    } else {
        report
    })
}

/// Configured verify command, or the framework default.
fn verify_command(ctx: &Context) -> Result<String> {
    let configured = ctx.config.repair.verify_command.trim();
    if !configured.is_empty() {
        return Ok(configured.to_string());
    }
    let framework = match ctx.config.framework()? {
        Some(framework) => Some(framework),
        None => detect_framework(&ctx.root)?.map(|parser| parser.framework()),
    };
    let framework = framework.ok_or_else(|| {
        Error::Config(
            "repair.verify_command is not set and no test framework was detected".to_string(),
        )
    })?;
    default_verify_command(framework)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Config(format!(
                "repair.verify_command is required for {framework}: it has no per-file test command"
            ))
            .into()
        })
}
