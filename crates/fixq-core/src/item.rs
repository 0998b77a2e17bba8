//! Queue item and grouping types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the members of an execution group may be run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// No ordering constraint between members
    Parallel,
    /// Members run one after another in `group_order`
    Sequential,
}

impl GroupType {
    /// Type given to a group built from a plain list of paths.
    #[must_use]
    pub const fn for_size(size: usize) -> Self {
        if size > 1 {
            Self::Parallel
        } else {
            Self::Sequential
        }
    }
}

/// A tracked failing test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Store-assigned surrogate key, never reused
    pub id: i64,
    /// Unique key
    pub file_path: String,
    /// Higher dequeues first
    pub priority: i64,
    /// First enqueue time
    pub created_at: DateTime<Utc>,
    /// Most recent enqueue time
    pub last_failure: DateTime<Utc>,
    /// Number of enqueues since the row was created
    pub failure_count: i64,
    /// Diagnostic text carried between repair attempts
    pub error_context: Option<String>,
    pub group_id: Option<i64>,
    pub group_type: Option<GroupType>,
    pub group_order: Option<i64>,
}

impl QueueItem {
    /// Whether the item belongs to an execution group.
    #[must_use]
    pub const fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }
}

/// Aggregate view over the whole queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total_items: usize,
    /// `0.0` on an empty queue
    pub average_failure_count: f64,
    /// Smallest `created_at`
    pub oldest_item: Option<DateTime<Utc>>,
    /// Largest `created_at`
    pub newest_item: Option<DateTime<Utc>>,
    /// priority -> number of items
    pub priority_counts: BTreeMap<i64, usize>,
}

impl QueueStats {
    /// Compute stats from rows.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_items(items: &[QueueItem]) -> Self {
        if items.is_empty() {
            return Self::default();
        }
        let total_failures: i64 = items.iter().map(|item| item.failure_count).sum();
        let priority_counts = items.iter().fold(BTreeMap::new(), |mut counts, item| {
            *counts.entry(item.priority).or_insert(0) += 1;
            counts
        });
        Self {
            total_items: items.len(),
            average_failure_count: total_failures as f64 / items.len() as f64,
            oldest_item: items.iter().map(|item| item.created_at).min(),
            newest_item: items.iter().map(|item| item.created_at).max(),
            priority_counts,
        }
    }
}

/// The members of one execution group, in `group_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionGroup {
    pub group_id: i64,
    pub group_type: GroupType,
    pub members: Vec<String>,
}

/// One entry of an advanced execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    pub group_id: i64,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub tests: Vec<String>,
    /// Explicit `group_order` per test; positions are used when absent
    #[serde(default)]
    pub order: Option<Vec<i64>>,
}

/// Membership of a single row, as written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub file_path: String,
    pub group_id: i64,
    pub group_type: GroupType,
    pub group_order: i64,
}

/// Result of applying an execution plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAssignment {
    /// Groups in the plan
    pub groups: usize,
    /// Rows that received grouping metadata
    pub assigned: usize,
    /// Planned paths that are not queued
    pub missing: Vec<String>,
}

/// Group counts over live rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total_groups: usize,
    pub parallel_groups: usize,
    pub sequential_groups: usize,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn item(path: &str, priority: i64, failure_count: i64, offset_secs: i64) -> QueueItem {
        let at = DateTime::from_timestamp(offset_secs, 0).unwrap_or_default();
        QueueItem {
            id: offset_secs,
            file_path: path.to_string(),
            priority,
            created_at: at,
            last_failure: at,
            failure_count,
            error_context: None,
            group_id: None,
            group_type: None,
            group_order: None,
        }
    }

    #[test]
    fn test_group_type_for_size() {
        assert_eq!(GroupType::for_size(2), GroupType::Parallel);
        assert_eq!(GroupType::for_size(1), GroupType::Sequential);
        assert_eq!(GroupType::for_size(0), GroupType::Sequential);
    }

    #[test]
    fn test_group_type_round_trips_through_text() {
        assert_eq!(GroupType::Parallel.to_string(), "parallel");
        assert_eq!(
            GroupType::from_str("sequential").ok(),
            Some(GroupType::Sequential)
        );
        assert!(GroupType::from_str("concurrent").is_err());
    }

    #[test]
    fn test_stats_on_empty_queue() {
        let stats = QueueStats::from_items(&[]);
        assert_eq!(stats.total_items, 0);
        assert!(stats.average_failure_count.abs() < f64::EPSILON);
        assert!(stats.oldest_item.is_none());
        assert!(stats.priority_counts.is_empty());
    }

    #[test]
    fn test_stats_aggregates() {
        let items = vec![
            item("a.js", 10, 1, 5),
            item("b.js", 0, 3, 1),
            item("c.js", 0, 2, 9),
        ];
        let stats = QueueStats::from_items(&items);
        assert_eq!(stats.total_items, 3);
        assert!((stats.average_failure_count - 2.0).abs() < f64::EPSILON);
        assert_eq!(stats.oldest_item, Some(items[1].created_at));
        assert_eq!(stats.newest_item, Some(items[2].created_at));
        assert_eq!(stats.priority_counts.get(&0), Some(&2));
        assert_eq!(stats.priority_counts.get(&10), Some(&1));
    }

    #[test]
    fn test_group_spec_json_shape() -> std::result::Result<(), serde_json::Error> {
        let spec: GroupSpec = serde_json::from_str(
            r#"{"groupId": 7, "type": "parallel", "tests": ["a.js", "b.js"], "order": [2, 1]}"#,
        )?;
        assert_eq!(spec.group_id, 7);
        assert_eq!(spec.group_type, GroupType::Parallel);
        assert_eq!(spec.order, Some(vec![2, 1]));

        let bare: GroupSpec =
            serde_json::from_str(r#"{"groupId": 1, "type": "sequential", "tests": []}"#)?;
        assert!(bare.order.is_none());
        Ok(())
    }
}
