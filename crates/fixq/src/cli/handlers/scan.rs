//! `fixq scan`: run the suite, enqueue what failed

use std::path::PathBuf;

use anyhow::Result;
use clap::ArgMatches;
use fixq_core::{
    adapters::{self, default_test_command, Framework, OutputParser},
    config::AUTO_FRAMEWORK,
    Error,
};

use super::Context;
use crate::output::Report;

pub async fn handle(ctx: &Context, matches: &ArgMatches) -> Result<Report> {
    let root = matches
        .get_one::<PathBuf>("root")
        .map_or_else(|| ctx.root.clone(), |dir| ctx.root.join(dir));
    let framework = matches
        .get_one::<String>("framework")
        .map(String::as_str)
        .unwrap_or(ctx.config.scan.framework.as_str());
    let parser = resolve_parser(framework, &root)?;

    let command = matches
        .get_one::<String>("command")
        .cloned()
        .filter(|command| !command.trim().is_empty())
        .or_else(|| Some(ctx.config.scan.command.clone()).filter(|c| !c.trim().is_empty()))
        .unwrap_or_else(|| default_test_command(parser.framework()).to_string());
    let priority = matches
        .get_one::<i64>("priority")
        .copied()
        .unwrap_or(ctx.config.scan.default_priority);

    let report = adapters::scan(&ctx.queue(), parser.as_ref(), &command, &root, priority).await?;

    let text = if report.enqueued.is_empty() {
        format!("No failing tests found ({})", report.framework)
    } else {
        let lines = report
            .enqueued
            .iter()
            .map(|item| format!("  {} (failures: {})", item.file_path, item.failure_count))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Enqueued {} failing test(s) ({}):\n{lines}",
            report.enqueued.len(),
            report.framework
        )
    };
    Report::done("scan", text, &report)
}

/// Parser for `name`, detecting from marker files when it is `auto`.
fn resolve_parser(name: &str, root: &std::path::Path) -> Result<Box<dyn OutputParser>> {
    if name.trim().eq_ignore_ascii_case(AUTO_FRAMEWORK) {
        return adapters::detect_framework(root)?.ok_or_else(|| {
            Error::Config(format!(
                "Could not detect a test framework in {}; pass --framework",
                root.display()
            ))
            .into()
        });
    }
    let framework: Framework = name
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| Error::invalid_argument(format!("Unknown framework '{name}'")))?;
    Ok(adapters::parser_for(framework)?)
}
