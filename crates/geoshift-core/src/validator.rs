//! Schedule conflict validator.
//!
//! `validate` is pure and synchronous: given candidate schedules, the
//! existing set, and the labor policy, it returns conflicts as data and
//! never mutates its inputs. Batch semantics are the caller's contract:
//! `existing` must exclude the originals being replaced and `candidates`
//! must include every sibling of the batch, so a batch can conflict with
//! itself, not only with untouched schedules.
//!
//! Output ordering: `error` before `warning`, then by earliest affected
//! schedule start.

use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::LaborPolicy;
use crate::model::{
    ConflictKind, ConflictSeverity, JobSite, Schedule, ScheduleConflict,
};

/// Internal accumulator pairing each conflict with its sort key.
struct Found {
    conflict: ScheduleConflict,
    earliest_start: DateTime<Utc>,
}

/// Check candidate schedules against existing commitments and labor policy.
///
/// `sites` feeds the capacity check; employees are checked independently,
/// capacity is checked per site across employees.
pub fn validate(
    candidates: &[Schedule],
    existing: &[Schedule],
    sites: &[JobSite],
    policy: &LaborPolicy,
) -> Vec<ScheduleConflict> {
    let mut found: Vec<Found> = Vec::new();

    let candidates: Vec<&Schedule> = candidates
        .iter()
        .filter(|s| s.counts_for_conflicts())
        .collect();
    let existing: Vec<&Schedule> = existing
        .iter()
        .filter(|s| s.counts_for_conflicts())
        .collect();
    let candidate_ids: HashSet<&str> = candidates
        .iter()
        .map(|s| s.schedule_id.as_str())
        .collect();

    // Per-employee view over candidates plus existing.
    let mut by_employee: BTreeMap<&str, Vec<&Schedule>> = BTreeMap::new();
    for s in candidates.iter().chain(existing.iter()) {
        by_employee.entry(s.employee_id.as_str()).or_default().push(s);
    }

    for (employee_id, mut schedules) in by_employee {
        schedules.sort_by_key(|s| (s.start, s.schedule_id.clone()));
        check_overlaps(employee_id, &schedules, &candidate_ids, &mut found);
        check_rest_periods(employee_id, &schedules, &candidate_ids, policy, &mut found);
        check_daily_hours(employee_id, &schedules, &candidate_ids, policy, &mut found);
        check_weekly_hours(employee_id, &schedules, &candidate_ids, policy, &mut found);
    }

    check_site_capacity(&candidates, &existing, sites, policy, &mut found);

    found.sort_by(|a, b| {
        a.conflict
            .severity
            .cmp(&b.conflict.severity)
            .then(a.earliest_start.cmp(&b.earliest_start))
    });
    found.into_iter().map(|f| f.conflict).collect()
}

/// Convenience for single-schedule create/edit from the admin UI.
pub fn validate_one(
    candidate: &Schedule,
    existing: &[Schedule],
    sites: &[JobSite],
    policy: &LaborPolicy,
) -> Vec<ScheduleConflict> {
    validate(std::slice::from_ref(candidate), existing, sites, policy)
}

fn involves_candidate(ids: &[&str], candidate_ids: &HashSet<&str>) -> bool {
    ids.iter().any(|id| candidate_ids.contains(id))
}

fn conflict(
    kind: ConflictKind,
    severity: ConflictSeverity,
    message: String,
    affected: Vec<String>,
    employee_id: &str,
    earliest_start: DateTime<Utc>,
) -> Found {
    Found {
        conflict: ScheduleConflict {
            conflict_id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity,
            message,
            affected_schedule_ids: affected,
            employee_id: employee_id.to_string(),
        },
        earliest_start,
    }
}

fn check_overlaps(
    employee_id: &str,
    schedules: &[&Schedule],
    candidate_ids: &HashSet<&str>,
    found: &mut Vec<Found>,
) {
    for (i, a) in schedules.iter().enumerate() {
        for b in &schedules[i + 1..] {
            // Sorted by start, so past the end of `a` nothing overlaps it.
            if b.start >= a.end {
                break;
            }
            if !a.overlaps(b) {
                continue;
            }
            if !involves_candidate(&[&a.schedule_id, &b.schedule_id], candidate_ids) {
                continue;
            }
            found.push(conflict(
                ConflictKind::Overlap,
                ConflictSeverity::Error,
                format!(
                    "Schedules {} and {} overlap between {} and {}",
                    a.schedule_id,
                    b.schedule_id,
                    a.start.max(b.start).to_rfc3339(),
                    a.end.min(b.end).to_rfc3339(),
                ),
                vec![a.schedule_id.clone(), b.schedule_id.clone()],
                employee_id,
                a.start.min(b.start),
            ));
        }
    }
}

fn check_rest_periods(
    employee_id: &str,
    schedules: &[&Schedule],
    candidate_ids: &HashSet<&str>,
    policy: &LaborPolicy,
    found: &mut Vec<Found>,
) {
    for pair in schedules.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let gap = next.start - prev.end;
        // Negative gap is already an overlap; don't double-report.
        if gap < chrono::Duration::zero() {
            continue;
        }
        if gap >= chrono::Duration::minutes(policy.min_break_minutes) {
            continue;
        }
        if !involves_candidate(&[&prev.schedule_id, &next.schedule_id], candidate_ids) {
            continue;
        }
        found.push(conflict(
            ConflictKind::RestPeriodViolation,
            ConflictSeverity::Warning,
            format!(
                "Only {} minutes rest between {} and {} (minimum {})",
                gap.num_minutes(),
                prev.schedule_id,
                next.schedule_id,
                policy.min_break_minutes,
            ),
            vec![prev.schedule_id.clone(), next.schedule_id.clone()],
            employee_id,
            prev.start,
        ));
    }
}

fn check_daily_hours(
    employee_id: &str,
    schedules: &[&Schedule],
    candidate_ids: &HashSet<&str>,
    policy: &LaborPolicy,
    found: &mut Vec<Found>,
) {
    let mut by_day: BTreeMap<chrono::NaiveDate, Vec<&Schedule>> = BTreeMap::new();
    for s in schedules {
        by_day.entry(s.start.date_naive()).or_default().push(s);
    }
    for (day, day_schedules) in by_day {
        let ids: Vec<&str> = day_schedules.iter().map(|s| s.schedule_id.as_str()).collect();
        if !involves_candidate(&ids, candidate_ids) {
            continue;
        }
        let total: f64 = day_schedules.iter().map(|s| s.scheduled_hours()).sum();
        if total <= policy.max_daily_hours {
            continue;
        }
        let earliest = day_schedules
            .iter()
            .map(|s| s.start)
            .min()
            .unwrap_or_default();
        found.push(conflict(
            ConflictKind::MaxHoursExceeded,
            ConflictSeverity::Warning,
            format!(
                "{total:.1}h scheduled on {day} exceeds the daily limit of {:.1}h",
                policy.max_daily_hours,
            ),
            ids.iter().map(|id| id.to_string()).collect(),
            employee_id,
            earliest,
        ));
    }
}

fn check_weekly_hours(
    employee_id: &str,
    schedules: &[&Schedule],
    candidate_ids: &HashSet<&str>,
    policy: &LaborPolicy,
    found: &mut Vec<Found>,
) {
    let mut by_week: BTreeMap<(i32, u32), Vec<&Schedule>> = BTreeMap::new();
    for s in schedules {
        let week = s.start.iso_week();
        by_week
            .entry((week.year(), week.week()))
            .or_default()
            .push(s);
    }
    for ((year, week), week_schedules) in by_week {
        let ids: Vec<&str> = week_schedules
            .iter()
            .map(|s| s.schedule_id.as_str())
            .collect();
        if !involves_candidate(&ids, candidate_ids) {
            continue;
        }
        let total: f64 = week_schedules.iter().map(|s| s.scheduled_hours()).sum();
        if total <= policy.max_weekly_hours {
            continue;
        }
        let earliest = week_schedules
            .iter()
            .map(|s| s.start)
            .min()
            .unwrap_or_default();
        found.push(conflict(
            ConflictKind::MaxHoursExceeded,
            ConflictSeverity::Error,
            format!(
                "{total:.1}h scheduled in ISO week {year}-W{week:02} exceeds the weekly limit of {:.1}h",
                policy.max_weekly_hours,
            ),
            ids.iter().map(|id| id.to_string()).collect(),
            employee_id,
            earliest,
        ));
    }
}

fn check_site_capacity(
    candidates: &[&Schedule],
    existing: &[&Schedule],
    sites: &[JobSite],
    policy: &LaborPolicy,
    found: &mut Vec<Found>,
) {
    let capacities: HashMap<&str, u32> = sites
        .iter()
        .filter_map(|site| policy.capacity_for(site).map(|c| (site.site_id.as_str(), c)))
        .collect();
    if capacities.is_empty() {
        return;
    }

    let mut reported: HashSet<Vec<String>> = HashSet::new();
    for candidate in candidates {
        let Some(&capacity) = capacities.get(candidate.job_site_id.as_str()) else {
            continue;
        };
        // Everyone at this site overlapping the candidate, the candidate
        // included.
        let mut concurrent: Vec<&&Schedule> = candidates
            .iter()
            .chain(existing.iter())
            .filter(|s| s.job_site_id == candidate.job_site_id)
            .filter(|s| s.schedule_id == candidate.schedule_id || s.overlaps(candidate))
            .collect();
        if concurrent.len() <= capacity as usize {
            continue;
        }
        concurrent.sort_by_key(|s| (s.start, s.schedule_id.clone()));
        let affected: Vec<String> = concurrent.iter().map(|s| s.schedule_id.clone()).collect();
        if !reported.insert(affected.clone()) {
            continue;
        }
        let earliest = concurrent
            .iter()
            .map(|s| s.start)
            .min()
            .unwrap_or(candidate.start);
        found.push(conflict(
            ConflictKind::DoubleBooking,
            ConflictSeverity::Warning,
            format!(
                "{} concurrent schedules at site {} exceed its capacity of {}",
                concurrent.len(),
                candidate.job_site_id,
                capacity,
            ),
            affected,
            &candidate.employee_id,
            earliest,
        ));
    }
}
