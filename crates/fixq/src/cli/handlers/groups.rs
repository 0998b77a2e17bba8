//! Group commands: set, set-advanced, next, peek, dequeue, clear, stats, has

use std::path::Path;

use anyhow::{Context as _, Result};
use clap::ArgMatches;
use fixq_core::{ExecutionGroup, GroupAssignment, GroupSpec};

use super::Context;
use crate::output::Report;

pub async fn handle(ctx: &Context, matches: &ArgMatches) -> Result<Report> {
    let engine = ctx.groups();
    let Some((name, sub_m)) = matches.subcommand() else {
        anyhow::bail!("Missing groups subcommand. Run 'fixq groups --help' for usage.");
    };
    let command = format!("groups {name}");
    let command = command.as_str();

    match name {
        "set" => {
            let plan: Vec<Vec<String>> = sub_m
                .get_many::<String>("groups")
                .into_iter()
                .flatten()
                .map(|group| split_group(ctx, group))
                .collect();
            let report = engine.set_execution_groups(&plan).await?;
            Report::done(command, assignment_text(&report), &report)
        }
        "set-advanced" => {
            let raw = sub_m
                .get_one::<String>("plan")
                .ok_or_else(|| anyhow::anyhow!("Missing required argument <plan>"))?;
            let plan = read_plan(ctx, raw)?;
            let report = engine.set_execution_groups_advanced(&plan).await?;
            Report::done(command, assignment_text(&report), &report)
        }
        "next" | "peek" => match engine.peek_group().await? {
            Some(group) => Report::done(command, group_text(&group), &group),
            None => Ok(Report::nothing(command, "No groups with queued tests")),
        },
        "dequeue" => match engine.take_group().await? {
            Some(group) => Report::done(command, group.members.join("\n"), &group),
            None => Ok(Report::nothing(command, "No groups with queued tests")),
        },
        "clear" => {
            let touched = engine.clear_groups().await?;
            Report::done(
                command,
                format!("Cleared grouping from {touched} test(s)"),
                &touched,
            )
        }
        "stats" => {
            let stats = engine.group_stats().await?;
            Report::done(
                command,
                format!(
                    "Groups: {} ({} parallel, {} sequential)",
                    stats.total_groups, stats.parallel_groups, stats.sequential_groups
                ),
                &stats,
            )
        }
        "has" => {
            if engine.has_groups().await? {
                Report::done(command, "Groups are set", &true)
            } else {
                Ok(Report::nothing(command, "No groups with queued tests"))
            }
        }
        other => anyhow::bail!("Unknown groups subcommand '{other}'"),
    }
}

/// `a.js,b.js` -> absolute paths; blanks are kept so the plan is rejected.
fn split_group(ctx: &Context, group: &str) -> Vec<String> {
    if group.trim().is_empty() {
        return Vec::new();
    }
    group
        .split(',')
        .map(|path| ctx.test_path(path.trim()))
        .collect()
}

/// Parse a plan given inline or as `@file`, normalizing its paths.
fn read_plan(ctx: &Context, raw: &str) -> Result<Vec<GroupSpec>> {
    let text = match raw.strip_prefix('@') {
        Some(file) => {
            let path = ctx.root.join(Path::new(file));
            std::fs::read_to_string(&path)
                .map_err(fixq_core::Error::from)
                .with_context(|| format!("Failed to read plan file {}", path.display()))?
        }
        None => raw.to_string(),
    };
    let plan: Vec<GroupSpec> = serde_json::from_str(&text).map_err(fixq_core::Error::from)?;
    Ok(plan
        .into_iter()
        .map(|spec| GroupSpec {
            tests: spec.tests.iter().map(|test| ctx.test_path(test)).collect(),
            ..spec
        })
        .collect())
}

fn assignment_text(report: &GroupAssignment) -> String {
    let mut text = format!(
        "Assigned {} test(s) to {} group(s)",
        report.assigned, report.groups
    );
    if !report.missing.is_empty() {
        text.push_str(&format!("\nNot queued, skipped: {}", report.missing.join(", ")));
    }
    text
}

fn group_text(group: &ExecutionGroup) -> String {
    let members = group
        .members
        .iter()
        .map(|member| format!("  {member}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Group {} ({}, {} test(s))\n{members}",
        group.group_id,
        group.group_type,
        group.members.len()
    )
}
