//! Queue commands: enqueue, dequeue, peek, list, remove, clear, size,
//! contains, search, stats

use anyhow::Result;
use clap::ArgMatches;
use fixq_core::QueueStats;

use super::Context;
use crate::output::{item_table, Report};

pub async fn handle(ctx: &Context, name: &str, matches: &ArgMatches) -> Result<Report> {
    let queue = ctx.queue();
    match name {
        "enqueue" => {
            let file = ctx.test_path(required(matches, "file")?);
            let priority = matches
                .get_one::<i64>("priority")
                .copied()
                .unwrap_or(ctx.config.scan.default_priority);
            let context = matches.get_one::<String>("context").map(String::as_str);
            let item = queue.enqueue(&file, priority, context).await?;
            let text = if item.failure_count > 1 {
                format!(
                    "Updated {} (failures: {}, priority: {})",
                    item.file_path, item.failure_count, item.priority
                )
            } else {
                format!("Enqueued {} (priority: {})", item.file_path, item.priority)
            };
            Report::done(name, text, &item)
        }
        "dequeue" => match queue.dequeue_item().await? {
            Some(item) => Report::done(name, item.file_path.clone(), &item),
            None => Ok(Report::nothing(name, "Queue is empty")),
        },
        "peek" => match queue.peek_item().await? {
            Some(item) => Report::done(name, item.file_path.clone(), &item),
            None => Ok(Report::nothing(name, "Queue is empty")),
        },
        "list" => {
            let items = queue.list().await?;
            let text = if items.is_empty() {
                "Queue is empty".to_string()
            } else {
                item_table(&items)
            };
            Report::done(name, text, &items)
        }
        "remove" => {
            let file = ctx.test_path(required(matches, "file")?);
            if queue.remove(&file).await? {
                Report::done(name, format!("Removed {file}"), &file)
            } else {
                Ok(Report::nothing(name, format!("{file} is not queued")))
            }
        }
        "clear" => {
            let removed = queue.clear().await?;
            Report::done(name, format!("Removed {removed} test(s)"), &removed)
        }
        "size" => {
            let size = queue.size().await?;
            Report::done(name, size.to_string(), &size)
        }
        "contains" => {
            let file = ctx.test_path(required(matches, "file")?);
            if queue.contains(&file).await? {
                Report::done(name, format!("{file} is queued"), &true)
            } else {
                Ok(Report::nothing(name, format!("{file} is not queued")))
            }
        }
        "search" => {
            let pattern = required(matches, "pattern")?;
            let items = queue.search(pattern).await?;
            let text = if items.is_empty() {
                format!("No queued tests match '{pattern}'")
            } else {
                item_table(&items)
            };
            Report::done(name, text, &items)
        }
        "stats" => {
            let stats = queue.stats().await?;
            Report::done(name, stats_text(&stats), &stats)
        }
        other => anyhow::bail!("Unknown command '{other}'. Run 'fixq --help' for usage."),
    }
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing required argument <{id}>"))
}

fn stats_text(stats: &QueueStats) -> String {
    let fmt_time = |at: Option<chrono::DateTime<chrono::Utc>>| {
        at.map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M:%S").to_string())
    };
    let priorities = stats
        .priority_counts
        .iter()
        .rev()
        .map(|(priority, count)| format!("  priority {priority:>4}: {count}"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut text = format!(
        "Queue Statistics:\n  Total:            {}\n  Avg failures:     {:.2}\n  Oldest:           {}\n  Newest:           {}",
        stats.total_items,
        stats.average_failure_count,
        fmt_time(stats.oldest_item),
        fmt_time(stats.newest_item),
    );
    if !priorities.is_empty() {
        text.push('\n');
        text.push_str(&priorities);
    }
    text
}
