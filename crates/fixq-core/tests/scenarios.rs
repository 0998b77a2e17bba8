//! End-to-end queue, grouping and retry scenarios.
//!
//! Every scenario runs against both stores so the durable backend and the
//! in-memory model cannot drift apart.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use fixq_core::{
    Error, GroupSpec, GroupStats, GroupType, GroupingEngine, MemoryStore, QueueManager, QueueStore,
    RepairAgent, RepairAttempt, RepairLoop, RepairOutcome, Result, RetryCoordinator, RetryPolicy,
    SqliteStore, Verification, Verifier,
};
use tempfile::TempDir;

struct Harness {
    queue: QueueManager,
    groups: GroupingEngine,
}

impl Harness {
    fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            queue: QueueManager::new(Arc::clone(&store)),
            groups: GroupingEngine::new(store),
        }
    }

    async fn backends() -> Result<Vec<(&'static str, Self)>> {
        Ok(vec![
            ("memory", Self::new(Arc::new(MemoryStore::new()))),
            (
                "sqlite",
                Self::new(Arc::new(SqliteStore::open_in_memory().await?)),
            ),
        ])
    }

    async fn enqueue_all(&self, paths: &[&str]) -> Result<()> {
        for path in paths {
            self.queue.enqueue(path, 0, None).await?;
        }
        Ok(())
    }
}

fn plan(groups: &[&[&str]]) -> Vec<Vec<String>> {
    groups
        .iter()
        .map(|group| group.iter().map(|path| (*path).to_string()).collect())
        .collect()
}

#[tokio::test]
async fn priority_order_scenario() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.queue.enqueue("low.js", 0, None).await?;
        h.queue.enqueue("high.js", 10, None).await?;
        h.queue.enqueue("medium.js", 5, None).await?;

        let mut order = Vec::new();
        while let Some(path) = h.queue.dequeue().await? {
            order.push(path);
        }
        assert_eq!(order, vec!["high.js", "medium.js", "low.js"], "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn duplicate_enqueue_scenario() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.queue.enqueue("t.js", 0, None).await?;
        h.queue.enqueue("t.js", 0, None).await?;

        let items = h.queue.list().await?;
        assert_eq!(items.len(), 1, "{name}");
        assert_eq!(items[0].failure_count, 2, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn group_stats_scenario() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.enqueue_all(&["a.js", "b.js", "c.js"]).await?;
        h.groups
            .set_execution_groups(&plan(&[&["a.js", "b.js"], &["c.js"]]))
            .await?;

        assert_eq!(
            h.groups.group_stats().await?,
            GroupStats {
                total_groups: 2,
                parallel_groups: 1,
                sequential_groups: 1,
            },
            "{name}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn group_dequeue_drains_in_id_order() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.enqueue_all(&["a.js", "b.js", "c.js", "loose.js"]).await?;
        h.groups
            .set_execution_groups(&plan(&[&["a.js", "b.js"], &["c.js"]]))
            .await?;

        assert_eq!(h.groups.dequeue_group().await?, vec!["a.js", "b.js"], "{name}");
        assert_eq!(h.groups.dequeue_group().await?, vec!["c.js"], "{name}");
        assert!(h.groups.dequeue_group().await?.is_empty(), "{name}");

        // Ungrouped items stay reachable through plain dequeue.
        assert_eq!(h.queue.dequeue().await?.as_deref(), Some("loose.js"), "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn removed_members_shrink_their_group() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.enqueue_all(&["a.js", "b.js", "c.js"]).await?;
        h.groups
            .set_execution_groups(&plan(&[&["a.js"], &["b.js", "c.js"]]))
            .await?;

        assert!(h.queue.remove("a.js").await?);
        h.queue.dequeue().await?;

        let next = h.groups.peek_group().await?;
        assert_eq!(next.as_ref().map(|g| g.group_id), Some(2), "{name}");
        assert_eq!(next.map(|g| g.members.len()), Some(1), "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn advanced_plan_preserves_ids_types_and_order() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.enqueue_all(&["a.js", "b.js", "c.js"]).await?;
        let report = h
            .groups
            .set_execution_groups_advanced(&[GroupSpec {
                group_id: 42,
                group_type: GroupType::Sequential,
                tests: vec!["a.js".into(), "b.js".into(), "ghost.js".into()],
                order: Some(vec![3, 1, 2]),
            }])
            .await?;
        assert_eq!(report.assigned, 2, "{name}");
        assert_eq!(report.missing, vec!["ghost.js".to_string()], "{name}");

        let group = h.groups.take_group().await?;
        assert_eq!(group.as_ref().map(|g| g.group_id), Some(42), "{name}");
        assert_eq!(
            group.as_ref().map(|g| g.group_type),
            Some(GroupType::Sequential),
            "{name}"
        );
        assert_eq!(
            group.map(|g| g.members),
            Some(vec!["b.js".to_string(), "a.js".to_string()]),
            "{name}"
        );
        assert_eq!(h.queue.size().await?, 1, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn clear_groups_keeps_queue_size() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.enqueue_all(&["a.js", "b.js"]).await?;
        h.groups.set_execution_groups(&plan(&[&["a.js", "b.js"]])).await?;
        h.groups.clear_groups().await?;

        assert_eq!(h.queue.size().await?, 2, "{name}");
        assert!(!h.groups.has_groups().await?, "{name}");
        assert!(h.groups.dequeue_group().await?.is_empty(), "{name}");
    }
    Ok(())
}

struct NoopAgent;

#[async_trait::async_trait]
impl RepairAgent for NoopAgent {
    async fn attempt(&self, _item: &fixq_core::QueueItem) -> Result<RepairAttempt> {
        Ok(RepairAttempt {
            applied: true,
            summary: "edited assertion".into(),
        })
    }
}

struct StillFailing;

#[async_trait::async_trait]
impl Verifier for StillFailing {
    async fn verify(&self, file_path: &str) -> Result<Verification> {
        Ok(Verification {
            passed: false,
            diagnostic: format!("{file_path}: expected 4, received 5"),
        })
    }
}

#[tokio::test]
async fn retry_ceiling_scenario() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.queue.enqueue("t.js", 0, Some("TypeError")).await?;
        let retry = RetryCoordinator::new(h.queue.clone(), RetryPolicy::new(3));
        let repair = RepairLoop::new(&h.queue, &retry, &NoopAgent, &StillFailing);

        let first = repair.run_once().await?.map(|r| r.outcome);
        assert_eq!(first, Some(RepairOutcome::Requeued { failure_count: 2 }), "{name}");

        let context = h.queue.get("t.js").await?.and_then(|item| item.error_context);
        assert_eq!(
            context.as_deref(),
            Some("Previous attempt: TypeError\n\nVerification failed: t.js: expected 4, received 5"),
            "{name}"
        );

        let second = repair.run_once().await?.map(|r| r.outcome);
        assert_eq!(second, Some(RepairOutcome::Requeued { failure_count: 3 }), "{name}");

        let item = h
            .queue
            .peek_item()
            .await?
            .ok_or_else(|| Error::invalid_argument("item vanished"))?;
        let third = retry.record_failure(&item, "still red").await;
        assert!(
            matches!(third, Err(Error::RetryCeilingExceeded { failure_count: 3, max_retries: 3, .. })),
            "{name}"
        );
        assert!(!h.queue.contains("t.js").await?, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn dequeued_items_still_hit_retry_ceiling() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.queue.enqueue("t.js", 4, Some("TypeError")).await?;
        let retry = RetryCoordinator::new(h.queue.clone(), RetryPolicy::new(3));

        let mut counts = Vec::new();
        let mut gave_up = None;
        while let Some(item) = h.queue.dequeue_item().await? {
            counts.push(item.failure_count);
            match retry.record_failure(&item, "still red").await {
                Ok(_) => assert!(counts.len() < 3, "{name}: ceiling never reached"),
                Err(err) => gave_up = Some(err),
            }
        }

        assert_eq!(counts, vec![1, 2, 3], "{name}");
        assert!(
            matches!(gave_up, Some(Error::RetryCeilingExceeded { failure_count: 3, .. })),
            "{name}"
        );
        assert!(h.queue.is_empty().await?, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn requeue_keeps_priority_and_context() -> Result<()> {
    for (name, h) in Harness::backends().await? {
        h.queue.enqueue("t.js", 7, Some("first")).await?;
        let item = h
            .queue
            .dequeue_item()
            .await?
            .ok_or_else(|| Error::invalid_argument("queue unexpectedly empty"))?;

        let back = h.queue.requeue(&item, None).await?;
        assert_eq!(back.failure_count, 2, "{name}");
        assert_eq!(back.priority, 7, "{name}");
        assert!(back.id > item.id, "{name}");

        let merged = h.queue.requeue(&item, Some("second")).await?;
        assert_eq!(merged.failure_count, 3, "{name}");
        assert_eq!(merged.error_context.as_deref(), Some("second"), "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn file_store_survives_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join(".fixq").join("queue.db");

    let store = Arc::new(SqliteStore::open(&path).await?);
    let h = Harness::new(store.clone());
    h.enqueue_all(&["a.js", "b.js"]).await?;
    h.groups.set_execution_groups(&plan(&[&["a.js", "b.js"]])).await?;
    store.close().await?;
    assert_eq!(h.queue.size().await, Err(Error::StoreClosed));

    let reopened = Harness::new(Arc::new(SqliteStore::open(&path).await?));
    assert_eq!(reopened.queue.size().await?, 2);
    assert_eq!(
        reopened.groups.dequeue_group().await?,
        vec!["a.js", "b.js"]
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_group_takes_never_overlap() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("queue.db");
    let first = Harness::new(Arc::new(SqliteStore::open(&path).await?));
    let second = Harness::new(Arc::new(SqliteStore::open(&path).await?));

    let files: Vec<String> = (0..12).map(|i| format!("t{i}.js")).collect();
    let refs: Vec<&str> = files.iter().map(String::as_str).collect();
    first.enqueue_all(&refs).await?;
    let groups: Vec<Vec<String>> = files.chunks(2).map(<[String]>::to_vec).collect();
    first.groups.set_execution_groups(&groups).await?;

    let (a, b) = tokio::join!(
        async {
            let mut taken = Vec::new();
            while let Some(group) = first.groups.take_group().await? {
                taken.extend(group.members);
            }
            Ok::<_, Error>(taken)
        },
        async {
            let mut taken = Vec::new();
            while let Some(group) = second.groups.take_group().await? {
                taken.extend(group.members);
            }
            Ok::<_, Error>(taken)
        }
    );
    let mut all = a?;
    all.extend(b?);
    all.sort();
    let mut expected = files.clone();
    expected.sort();
    assert_eq!(all, expected);
    Ok(())
}
