//! Execution groups over queued tests
//!
//! A plan assigns `group_id`, `group_type` and `group_order` to rows that are
//! already queued. Groups are dequeued whole, lowest id first. Membership is
//! always read from live rows, so removing a member individually simply
//! shrinks its group.

use std::{collections::HashSet, sync::Arc};

use crate::{
    item::{
        ExecutionGroup, GroupAssignment, GroupMember, GroupSpec, GroupStats, GroupType,
    },
    store::QueueStore,
    Error, Result,
};

fn position(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

/// Reject empty paths and paths planned twice.
fn check_paths<'a>(paths: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let mut seen = HashSet::new();
    for path in paths {
        if path.trim().is_empty() {
            return Err(Error::invalid_argument(
                "execution plan contains an empty path",
            ));
        }
        if !seen.insert(path.as_str()) {
            return Err(Error::invalid_argument(format!(
                "'{path}' appears more than once in the execution plan"
            )));
        }
    }
    Ok(())
}

/// Turn plain path lists into members. Ids start at 1 and an empty list still
/// consumes its id.
fn plan_members(groups: &[Vec<String>]) -> Vec<GroupMember> {
    groups
        .iter()
        .zip(1_i64..)
        .flat_map(|(paths, group_id)| {
            let group_type = GroupType::for_size(paths.len());
            paths.iter().enumerate().map(move |(index, path)| GroupMember {
                file_path: path.clone(),
                group_id,
                group_type,
                group_order: position(index),
            })
        })
        .collect()
}

fn validate_specs(plan: &[GroupSpec]) -> Result<()> {
    let mut ids = HashSet::new();
    for spec in plan {
        if spec.group_id < 1 {
            return Err(Error::invalid_argument(format!(
                "group id must be at least 1, got {}",
                spec.group_id
            )));
        }
        if !ids.insert(spec.group_id) {
            return Err(Error::invalid_argument(format!(
                "group id {} appears more than once in the execution plan",
                spec.group_id
            )));
        }
        if let Some(order) = &spec.order {
            if order.len() != spec.tests.len() {
                return Err(Error::invalid_argument(format!(
                    "group {} has {} tests but {} order values",
                    spec.group_id,
                    spec.tests.len(),
                    order.len()
                )));
            }
        }
    }
    check_paths(plan.iter().flat_map(|spec| spec.tests.iter()))
}

fn spec_members(plan: &[GroupSpec]) -> Vec<GroupMember> {
    plan.iter()
        .flat_map(|spec| {
            spec.tests.iter().enumerate().map(move |(index, path)| GroupMember {
                file_path: path.clone(),
                group_id: spec.group_id,
                group_type: spec.group_type,
                group_order: spec
                    .order
                    .as_ref()
                    .and_then(|order| order.get(index).copied())
                    .unwrap_or_else(|| position(index)),
            })
        })
        .collect()
}

fn assignment(groups: usize, members: &[GroupMember], missing: Vec<String>) -> GroupAssignment {
    GroupAssignment {
        groups,
        assigned: members.len() - missing.len(),
        missing,
    }
}

/// Applies and consumes execution plans.
#[derive(Debug, Clone)]
pub struct GroupingEngine {
    store: Arc<dyn QueueStore>,
}

impl GroupingEngine {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Replace all grouping metadata with `groups`.
    ///
    /// Each inner list becomes one group: `parallel` when it has more than one
    /// path, `sequential` otherwise. Paths that are not queued are skipped and
    /// reported in [`GroupAssignment::missing`].
    pub async fn set_execution_groups(&self, groups: &[Vec<String>]) -> Result<GroupAssignment> {
        check_paths(groups.iter().flatten())?;
        let members = plan_members(groups);
        let missing = self.store.replace_groups(&members).await?;
        if !missing.is_empty() {
            tracing::warn!(?missing, "planned tests are not queued, skipped");
        }
        let report = assignment(groups.len(), &members, missing);
        tracing::debug!(groups = report.groups, assigned = report.assigned, "set execution groups");
        Ok(report)
    }

    /// Apply caller-chosen groups, overwriting only the ids named in `plan`.
    pub async fn set_execution_groups_advanced(
        &self,
        plan: &[GroupSpec],
    ) -> Result<GroupAssignment> {
        validate_specs(plan)?;
        let group_ids: Vec<i64> = plan.iter().map(|spec| spec.group_id).collect();
        let members = spec_members(plan);
        let missing = self.store.merge_groups(&group_ids, &members).await?;
        if !missing.is_empty() {
            tracing::warn!(?missing, "planned tests are not queued, skipped");
        }
        let report = assignment(plan.len(), &members, missing);
        tracing::debug!(
            groups = report.groups,
            assigned = report.assigned,
            "merged execution groups"
        );
        Ok(report)
    }

    /// The group `dequeue_group` would take.
    pub async fn peek_group(&self) -> Result<Option<ExecutionGroup>> {
        self.store.peek_group().await
    }

    /// Same as [`Self::peek_group`].
    pub async fn next_group(&self) -> Result<Option<ExecutionGroup>> {
        self.peek_group().await
    }

    /// Remove the next group and return its paths in `group_order`.
    ///
    /// Returns an empty list when no group has live members.
    pub async fn dequeue_group(&self) -> Result<Vec<String>> {
        Ok(self
            .take_group()
            .await?
            .map(|group| group.members)
            .unwrap_or_default())
    }

    /// Remove the next group and return it whole.
    pub async fn take_group(&self) -> Result<Option<ExecutionGroup>> {
        let group = self.store.take_group().await?;
        if let Some(group) = &group {
            tracing::debug!(
                group_id = group.group_id,
                group_type = %group.group_type,
                members = group.members.len(),
                "dequeued group"
            );
        }
        Ok(group)
    }

    /// Drop grouping metadata from every row. Queue contents are unchanged.
    pub async fn clear_groups(&self) -> Result<u64> {
        let touched = self.store.clear_groups().await?;
        tracing::debug!(touched, "cleared execution groups");
        Ok(touched)
    }

    pub async fn group_stats(&self) -> Result<GroupStats> {
        let types = self.store.group_types().await?;
        let parallel_groups = types
            .iter()
            .filter(|(_, kind)| *kind == GroupType::Parallel)
            .count();
        Ok(GroupStats {
            total_groups: types.len(),
            parallel_groups,
            sequential_groups: types.len() - parallel_groups,
        })
    }

    pub async fn has_groups(&self) -> Result<bool> {
        Ok(self.group_stats().await?.total_groups > 0)
    }
}
