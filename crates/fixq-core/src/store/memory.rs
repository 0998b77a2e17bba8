//! In-memory queue store.
//!
//! Rows live in a `BTreeMap` keyed by path; a second `BTreeMap` keyed by
//! `(Reverse(priority), created_at, id)` gives dequeue order without sorting.
//! Both maps sit behind one `tokio::sync::Mutex`, so every trait call is a
//! single critical section.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tokio::sync::Mutex;

use super::QueueStore;
use crate::{
    item::{ExecutionGroup, GroupMember, GroupType, QueueItem},
    Error, Result,
};

type OrderKey = (Reverse<i64>, DateTime<Utc>, i64);

fn order_key(item: &QueueItem) -> OrderKey {
    (Reverse(item.priority), item.created_at, item.id)
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<String, QueueItem>,
    order: BTreeMap<OrderKey, String>,
    /// Last id handed out; never rewinds, even after `clear`
    last_id: i64,
    closed: bool,
}

impl MemoryState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    fn ordered(&self) -> impl Iterator<Item = &QueueItem> {
        self.order.values().filter_map(|path| self.rows.get(path))
    }

    fn delete(&mut self, file_path: &str) -> Option<QueueItem> {
        let item = self.rows.remove(file_path)?;
        self.order.remove(&order_key(&item));
        Some(item)
    }

    fn reset_group_fields<F>(&mut self, mut matches: F) -> u64
    where
        F: FnMut(&QueueItem) -> bool,
    {
        self.rows
            .values_mut()
            .filter(|item| matches(item))
            .fold(0, |touched, item| {
                item.group_id = None;
                item.group_type = None;
                item.group_order = None;
                touched + 1
            })
    }

    /// Insert or merge one failure; a new row starts at `carried + 1`.
    fn merge_failure(
        &mut self,
        file_path: &str,
        priority: i64,
        error_context: Option<&str>,
        carried: i64,
        now: DateTime<Utc>,
    ) -> QueueItem {
        let floor = carried.max(0) + 1;
        if let Some(existing) = self.rows.get(file_path).cloned() {
            let merged = QueueItem {
                priority: existing.priority.max(priority),
                last_failure: now,
                failure_count: (existing.failure_count + 1).max(floor),
                error_context: error_context
                    .map(str::to_string)
                    .or_else(|| existing.error_context.clone()),
                ..existing.clone()
            };
            self.order.remove(&order_key(&existing));
            self.order.insert(order_key(&merged), file_path.to_string());
            self.rows.insert(file_path.to_string(), merged.clone());
            return merged;
        }

        self.last_id += 1;
        let item = QueueItem {
            id: self.last_id,
            file_path: file_path.to_string(),
            priority,
            created_at: now,
            last_failure: now,
            failure_count: floor,
            error_context: error_context.map(str::to_string),
            group_id: None,
            group_type: None,
            group_order: None,
        };
        self.order.insert(order_key(&item), file_path.to_string());
        self.rows.insert(file_path.to_string(), item.clone());
        item
    }

    fn write_members(&mut self, members: &[GroupMember]) -> Vec<String> {
        members
            .iter()
            .filter_map(|member| match self.rows.get_mut(&member.file_path) {
                Some(item) => {
                    item.group_id = Some(member.group_id);
                    item.group_type = Some(member.group_type);
                    item.group_order = Some(member.group_order);
                    None
                }
                None => Some(member.file_path.clone()),
            })
            .collect()
    }

    fn lowest_group(&self) -> Option<ExecutionGroup> {
        let group_id = self.rows.values().filter_map(|item| item.group_id).min()?;
        let members = self
            .rows
            .values()
            .filter(|item| item.group_id == Some(group_id))
            .sorted_by_key(|item| (item.group_order, item.id))
            .collect::<Vec<_>>();
        let group_type = members
            .iter()
            .find_map(|item| item.group_type)
            .unwrap_or_else(|| GroupType::for_size(members.len()));
        Some(ExecutionGroup {
            group_id,
            group_type,
            members: members.iter().map(|item| item.file_path.clone()).collect(),
        })
    }
}

/// Queue store that keeps everything in process memory.
///
/// Used by tests and as the model the durable store is checked against.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl QueueStore for MemoryStore {
    async fn upsert(
        &self,
        file_path: &str,
        priority: i64,
        error_context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QueueItem> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.merge_failure(file_path, priority, error_context, 0, now))
    }

    async fn requeue(
        &self,
        item: &QueueItem,
        error_context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QueueItem> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.merge_failure(
            &item.file_path,
            item.priority,
            error_context,
            item.failure_count,
            now,
        ))
    }

    async fn get(&self, file_path: &str) -> Result<Option<QueueItem>> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.rows.get(file_path).cloned())
    }

    async fn list(&self) -> Result<Vec<QueueItem>> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.ordered().cloned().collect())
    }

    async fn search(&self, pattern: &str) -> Result<Vec<QueueItem>> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state
            .ordered()
            .filter(|item| item.file_path.contains(pattern))
            .cloned()
            .collect())
    }

    async fn peek_next(&self) -> Result<Option<QueueItem>> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        let next = state.ordered().next().cloned();
        Ok(next)
    }

    async fn take_next(&self) -> Result<Option<QueueItem>> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let Some(path) = state.order.values().next().cloned() else {
            return Ok(None);
        };
        Ok(state.delete(&path))
    }

    async fn remove(&self, file_path: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.delete(file_path).is_some())
    }

    async fn clear(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let removed = state.rows.len() as u64;
        state.rows.clear();
        state.order.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.rows.len())
    }

    async fn replace_groups(&self, members: &[GroupMember]) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.reset_group_fields(|item| {
            item.group_id.is_some() || item.group_type.is_some() || item.group_order.is_some()
        });
        Ok(state.write_members(members))
    }

    async fn merge_groups(
        &self,
        group_ids: &[i64],
        members: &[GroupMember],
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let replaced: BTreeSet<i64> = group_ids.iter().copied().collect();
        state.reset_group_fields(|item| item.group_id.is_some_and(|id| replaced.contains(&id)));
        Ok(state.write_members(members))
    }

    async fn clear_groups(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.reset_group_fields(|item| {
            item.group_id.is_some() || item.group_type.is_some() || item.group_order.is_some()
        }))
    }

    async fn peek_group(&self) -> Result<Option<ExecutionGroup>> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        Ok(state.lowest_group())
    }

    async fn take_group(&self) -> Result<Option<ExecutionGroup>> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let group = state.lowest_group();
        if let Some(group) = &group {
            for path in &group.members {
                state.delete(path);
            }
        }
        Ok(group)
    }

    async fn group_types(&self) -> Result<Vec<(i64, GroupType)>> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        let grouped = state
            .rows
            .values()
            .filter_map(|item| item.group_id.map(|id| (id, item)))
            .into_group_map();
        Ok(grouped
            .into_iter()
            .sorted_by_key(|(id, _)| *id)
            .map(|(id, items)| {
                let group_type = items
                    .iter()
                    .filter_map(|item| item.group_type)
                    .min()
                    .unwrap_or_else(|| GroupType::for_size(items.len()));
                (id, group_type)
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn test_equal_priority_is_fifo() -> Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.upsert("first.js", 1, None, now).await?;
        store
            .upsert("second.js", 1, None, now + Duration::seconds(1))
            .await?;

        let order: Vec<_> = store
            .list()
            .await?
            .into_iter()
            .map(|item| item.file_path)
            .collect();
        assert_eq!(order, vec!["first.js", "second.js"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_reindexes_priority() -> Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.upsert("a.js", 0, None, now).await?;
        store.upsert("b.js", 5, None, now).await?;
        store
            .upsert("a.js", 9, None, now + Duration::seconds(1))
            .await?;

        let next = store.take_next().await?.map(|item| item.file_path);
        assert_eq!(next.as_deref(), Some("a.js"));
        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_keeps_grouping() -> Result<()> {
        let store = MemoryStore::new();
        store.upsert("a.js", 0, None, Utc::now()).await?;
        store
            .replace_groups(&[GroupMember {
                file_path: "a.js".into(),
                group_id: 2,
                group_type: GroupType::Sequential,
                group_order: 0,
            }])
            .await?;
        let merged = store.upsert("a.js", 0, None, Utc::now()).await?;
        assert_eq!(merged.group_id, Some(2));
        assert_eq!(merged.group_type, Some(GroupType::Sequential));
        Ok(())
    }

    #[tokio::test]
    async fn test_ids_keep_growing_after_clear() -> Result<()> {
        let store = MemoryStore::new();
        let first = store.upsert("a.js", 0, None, Utc::now()).await?;
        assert_eq!(store.clear().await?, 1);
        let second = store.upsert("a.js", 0, None, Utc::now()).await?;
        assert!(second.id > first.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() -> Result<()> {
        let store = MemoryStore::new();
        store.close().await?;
        assert_eq!(store.list().await, Err(Error::StoreClosed));
        assert_eq!(
            store.upsert("a.js", 0, None, Utc::now()).await,
            Err(Error::StoreClosed)
        );
        Ok(())
    }
}
