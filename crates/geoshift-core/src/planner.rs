//! Batch schedule operation planner.
//!
//! `preview` is pure: it transforms the selected schedules per the
//! operation, runs the conflict validator with the originals removed and
//! all sibling candidates included, and returns per-item before/after
//! plus the conflicts touching each item. `execute` commits the preview
//! item by item; it is not transactional, and the per-item results let a
//! caller retry only the failed subset with the same candidate ids.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::LaborPolicy;
use crate::error::{CoreError, Result};
use crate::model::{ConflictSeverity, JobSite, Schedule, ScheduleConflict, ShiftType};
use crate::validator;

/// Partial edit applied by [`BatchOperation::Update`]. Unset fields keep
/// the schedule's current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulePatch {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub job_site_id: Option<String>,
    #[serde(default)]
    pub shift_type: Option<ShiftType>,
    #[serde(default)]
    pub break_duration_minutes: Option<u32>,
}

/// A bulk operation over a selection of schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchOperation {
    /// Shift every selected schedule by a signed offset.
    Move { offset_minutes: i64 },
    /// Duplicate every selected schedule at a signed offset, keeping the
    /// originals in place.
    Copy { offset_minutes: i64 },
    /// Hand every selected schedule to another employee.
    Reassign { employee_id: String },
    /// Apply a field patch to every selected schedule.
    Update { patch: SchedulePatch },
    /// Remove the selected schedules.
    Delete,
    /// Exchange the employees of exactly two selected schedules.
    Swap,
}

/// What committing a planned item will do to the schedule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemAction {
    WillCreate,
    WillModify,
    WillDelete,
}

/// How `execute` treats conflicts found at preview time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// Refuse the whole batch if any item carries an error conflict.
    Strict,
    /// Commit warning-only items; skip items with error conflicts.
    Permissive,
}

/// One schedule's slice of the batch preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedItem {
    /// Id of the schedule the item will commit: the candidate's id for
    /// creates/modifies, the original's for deletes.
    pub item_id: String,
    pub action: ItemAction,
    pub before: Option<Schedule>,
    pub after: Option<Schedule>,
    pub conflicts: Vec<ScheduleConflict>,
}

impl PlannedItem {
    pub fn has_errors(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.severity == ConflictSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.severity == ConflictSeverity::Warning)
    }
}

/// Full result of planning a batch, ready to render or execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPreview {
    pub items: Vec<PlannedItem>,
    pub error_count: usize,
    pub warning_count: usize,
}

impl BatchPreview {
    /// True when a strict execution would refuse this batch.
    pub fn blocked(&self) -> bool {
        self.error_count > 0
    }
}

/// Outcome of committing one planned item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemResult {
    Committed { item_id: String },
    Skipped { item_id: String, reason: String },
    Failed { item_id: String, error: String },
}

impl ItemResult {
    pub fn item_id(&self) -> &str {
        match self {
            ItemResult::Committed { item_id }
            | ItemResult::Skipped { item_id, .. }
            | ItemResult::Failed { item_id, .. } => item_id,
        }
    }
}

/// Persistence boundary the planner commits through.
#[async_trait]
pub trait ScheduleWriter: Send + Sync {
    async fn upsert_schedule(&self, schedule: &Schedule) -> Result<()>;
    async fn delete_schedule(&self, schedule_id: &str) -> Result<()>;
}

/// Build the per-item preview for `operation` over `targets`.
///
/// `all_schedules` is the current schedule set including the targets;
/// the planner removes the originals being replaced before validating so
/// a moved schedule does not conflict with its own old slot.
pub fn preview(
    operation: &BatchOperation,
    targets: &[Schedule],
    all_schedules: &[Schedule],
    sites: &[JobSite],
    policy: &LaborPolicy,
) -> Result<BatchPreview> {
    if targets.is_empty() {
        return Err(CoreError::Custom("batch selection is empty".to_string()));
    }
    if matches!(operation, BatchOperation::Swap) && targets.len() != 2 {
        return Err(CoreError::Custom(format!(
            "swap needs exactly 2 schedules, got {}",
            targets.len()
        )));
    }

    let mut items: Vec<PlannedItem> = targets
        .iter()
        .map(|target| plan_item(operation, target, targets))
        .collect::<Result<_>>()?;

    // Validator inputs: candidates are every non-delete `after`; existing
    // is the full set minus the originals the batch replaces or removes.
    let candidates: Vec<Schedule> = items.iter().filter_map(|i| i.after.clone()).collect();
    let replaced: HashSet<&str> = items
        .iter()
        .filter(|i| i.action != ItemAction::WillCreate)
        .filter_map(|i| i.before.as_ref())
        .map(|s| s.schedule_id.as_str())
        .collect();
    let existing: Vec<Schedule> = all_schedules
        .iter()
        .filter(|s| !replaced.contains(s.schedule_id.as_str()))
        .cloned()
        .collect();

    let conflicts = validator::validate(&candidates, &existing, sites, policy);
    for item in &mut items {
        item.conflicts = conflicts
            .iter()
            .filter(|c| c.affected_schedule_ids.iter().any(|id| *id == item.item_id))
            .cloned()
            .collect();
    }

    let error_count = items.iter().filter(|i| i.has_errors()).count();
    let warning_count = items.iter().filter(|i| i.has_warnings()).count();
    Ok(BatchPreview {
        items,
        error_count,
        warning_count,
    })
}

fn plan_item(
    operation: &BatchOperation,
    target: &Schedule,
    targets: &[Schedule],
) -> Result<PlannedItem> {
    let (action, after) = match operation {
        BatchOperation::Move { offset_minutes } => {
            let mut moved = target.clone();
            moved.start += Duration::minutes(*offset_minutes);
            moved.end += Duration::minutes(*offset_minutes);
            (ItemAction::WillModify, Some(moved))
        }
        BatchOperation::Copy { offset_minutes } => {
            let mut copy = target.clone();
            copy.schedule_id = uuid::Uuid::new_v4().to_string();
            copy.start += Duration::minutes(*offset_minutes);
            copy.end += Duration::minutes(*offset_minutes);
            (ItemAction::WillCreate, Some(copy))
        }
        BatchOperation::Reassign { employee_id } => {
            let mut reassigned = target.clone();
            reassigned.employee_id = employee_id.clone();
            (ItemAction::WillModify, Some(reassigned))
        }
        BatchOperation::Update { patch } => {
            let mut updated = target.clone();
            if let Some(start) = patch.start {
                updated.start = start;
            }
            if let Some(end) = patch.end {
                updated.end = end;
            }
            if let Some(site) = &patch.job_site_id {
                updated.job_site_id = site.clone();
            }
            if let Some(shift_type) = patch.shift_type {
                updated.shift_type = shift_type;
            }
            if let Some(minutes) = patch.break_duration_minutes {
                updated.break_duration_minutes = minutes;
            }
            if updated.end <= updated.start {
                return Err(CoreError::Custom(format!(
                    "patch leaves schedule {} with a non-positive duration",
                    target.schedule_id
                )));
            }
            (ItemAction::WillModify, Some(updated))
        }
        BatchOperation::Delete => (ItemAction::WillDelete, None),
        BatchOperation::Swap => {
            let other = targets
                .iter()
                .find(|s| s.schedule_id != target.schedule_id)
                .ok_or_else(|| {
                    CoreError::Custom("swap selection repeats one schedule".to_string())
                })?;
            let mut swapped = target.clone();
            swapped.employee_id = other.employee_id.clone();
            (ItemAction::WillModify, Some(swapped))
        }
    };

    let item_id = after
        .as_ref()
        .map(|s| s.schedule_id.clone())
        .unwrap_or_else(|| target.schedule_id.clone());
    Ok(PlannedItem {
        item_id,
        action,
        before: Some(target.clone()),
        after,
        conflicts: Vec::new(),
    })
}

/// Commit a preview through `writer`, one item at a time.
///
/// Strict policy refuses the whole batch when the preview is blocked.
/// Permissive policy commits everything that carries at most warnings
/// and reports error-bearing items as skipped. Failures do not stop the
/// remaining items; rerun `execute` with the same preview to retry them,
/// since upserts are idempotent by schedule id.
pub async fn execute<W: ScheduleWriter>(
    writer: &W,
    preview: &BatchPreview,
    policy: ExecutionPolicy,
) -> Result<Vec<ItemResult>> {
    if policy == ExecutionPolicy::Strict && preview.blocked() {
        return Err(CoreError::BatchBlocked(preview.error_count));
    }

    let mut results = Vec::with_capacity(preview.items.len());
    for item in &preview.items {
        if item.has_errors() {
            results.push(ItemResult::Skipped {
                item_id: item.item_id.clone(),
                reason: "blocking conflicts".to_string(),
            });
            continue;
        }
        let outcome = match (&item.action, &item.after) {
            (ItemAction::WillDelete, _) => writer.delete_schedule(&item.item_id).await,
            (_, Some(after)) => writer.upsert_schedule(after).await,
            (_, None) => Err(CoreError::Custom(format!(
                "planned item {} has no candidate to commit",
                item.item_id
            ))),
        };
        match outcome {
            Ok(()) => {
                info!(item_id = %item.item_id, action = ?item.action, "batch item committed");
                results.push(ItemResult::Committed {
                    item_id: item.item_id.clone(),
                });
            }
            Err(err) => {
                warn!(item_id = %item.item_id, error = %err, "batch item failed");
                results.push(ItemResult::Failed {
                    item_id: item.item_id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(results)
}
