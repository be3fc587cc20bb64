//! Validation and auto-repair.
//!
//! RULE: `scan` never writes. `run` with auto-fix on repairs only
//! DUPLICATE_ASSIGNMENT (keep the earliest row, delete the rest) and
//! LEAVE_CONFLICT (delete the conflicting work row). Each fix is its own
//! transaction with one IssueFixed event, and a pass applies at most
//! `max_auto_fixes`. Every other issue is reported only.

use crate::{
    calendar::{month_range, HolidayCalendar},
    config::RotaConfig,
    context::load_demand,
    error::RotaResult,
    event::RunEvent,
    requirement::DemandCalendar,
    store::{AssignmentRow, RotaStore, StaffRecord},
    types::{AssignmentId, EntityId, IssueType, PoolKey, RunId, ScheduleId, Severity},
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub date: NaiveDate,
    pub staff_id: Option<EntityId>,
    pub department: Option<String>,
    pub category: Option<String>,
    pub expected: Option<u32>,
    pub actual: Option<u32>,
    /// Rows an auto-fix would delete.
    pub assignment_ids: Vec<AssignmentId>,
    pub message: String,
}

impl ValidationIssue {
    fn count(
        issue_type: IssueType,
        severity: Severity,
        date: NaiveDate,
        department: &str,
        category: Option<&str>,
        expected: u32,
        actual: u32,
    ) -> Self {
        let what = match category {
            Some(c) => format!("{department}/{c}"),
            None => department.to_string(),
        };
        Self {
            issue_type,
            severity,
            date,
            staff_id: None,
            department: Some(department.to_string()),
            category: category.map(str::to_string),
            expected: Some(expected),
            actual: Some(actual),
            assignment_ids: Vec::new(),
            message: format!("{date} {what}: {actual} working, expected {expected}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub run_id: RunId,
    pub schedule_id: ScheduleId,
    /// Issues still present after the pass.
    pub issues: Vec<ValidationIssue>,
    pub fixed: Vec<ValidationIssue>,
    pub fix_limit_reached: bool,
}

impl ValidationReport {
    pub fn of_type(&self, issue_type: IssueType) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.issue_type == issue_type)
    }

    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn worst_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

/// Everything a scan looks at. Built from the store by `Validator`, or by
/// hand in tests.
pub struct ScanInput<'a> {
    pub rows: &'a [AssignmentRow],
    /// Clinic staff, active or not.
    pub staff: &'a [StaffRecord],
    pub demand: &'a DemandCalendar,
    pub holidays: &'a HolidayCalendar,
    pub confirmed_leave: &'a HashSet<(EntityId, NaiveDate)>,
    pub config: &'a RotaConfig,
}

fn shortage_severity(required: u32, working: u32) -> Severity {
    if working == 0 {
        Severity::Critical
    } else if required - working > 1 {
        Severity::Error
    } else {
        Severity::Warning
    }
}

pub fn scan_rows(input: &ScanInput<'_>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let staff: HashMap<&str, &StaffRecord> =
        input.staff.iter().map(|s| (s.staff_id.as_str(), s)).collect();

    // ── Row-level: duplicates and leave conflicts ──────────────────
    let mut by_pair: BTreeMap<(NaiveDate, &str), Vec<&AssignmentRow>> = BTreeMap::new();
    for row in input.rows {
        by_pair
            .entry((row.date, row.staff_id.as_str()))
            .or_default()
            .push(row);
        if row.shift_type.is_work()
            && input
                .confirmed_leave
                .contains(&(row.staff_id.clone(), row.date))
        {
            issues.push(ValidationIssue {
                issue_type: IssueType::LeaveConflict,
                severity: Severity::Error,
                date: row.date,
                staff_id: Some(row.staff_id.clone()),
                department: None,
                category: None,
                expected: None,
                actual: None,
                assignment_ids: vec![row.assignment_id],
                message: format!(
                    "{} works {} on {} despite confirmed leave",
                    row.staff_id, row.shift_type, row.date
                ),
            });
        }
    }

    // Working counts use the earliest row of each (staff, date).
    let mut pool_working: BTreeMap<(NaiveDate, PoolKey), u32> = BTreeMap::new();
    for ((date, staff_id), rows) in &by_pair {
        if rows.len() > 1 {
            let mut ids: Vec<AssignmentId> = rows.iter().map(|r| r.assignment_id).collect();
            ids.sort_unstable();
            issues.push(ValidationIssue {
                issue_type: IssueType::DuplicateAssignment,
                severity: Severity::Error,
                date: *date,
                staff_id: Some(staff_id.to_string()),
                department: None,
                category: None,
                expected: Some(1),
                actual: Some(rows.len() as u32),
                assignment_ids: ids[1..].to_vec(),
                message: format!("{staff_id} has {} rows on {date}", rows.len()),
            });
        }
        let Some(first) = rows.iter().min_by_key(|r| r.assignment_id) else {
            continue;
        };
        if !first.shift_type.is_work() {
            continue;
        }
        if let Some(s) = staff.get(staff_id) {
            *pool_working.entry((*date, s.pool())).or_insert(0) += 1;
        }
    }

    // ── Count-level: slots, departments, category ratios ───────────
    for day in input.demand.days() {
        let date = day.date;
        if input.holidays.is_holiday(date) {
            continue;
        }
        let working_today: BTreeMap<&PoolKey, u32> = pool_working
            .range((date, (String::new(), String::new()))..)
            .take_while(|((d, _), _)| *d == date)
            .map(|((_, pool), n)| (pool, *n))
            .collect();
        let pools: BTreeSet<&PoolKey> = day
            .requirement
            .counts
            .keys()
            .chain(working_today.keys().copied())
            .collect();

        let mut dept_required: BTreeMap<&str, u32> = BTreeMap::new();
        let mut dept_working: BTreeMap<&str, u32> = BTreeMap::new();
        for pool in pools {
            let required = day.requirement.required(pool);
            let working = working_today.get(pool).copied().unwrap_or(0);
            *dept_required.entry(pool.0.as_str()).or_insert(0) += required;
            *dept_working.entry(pool.0.as_str()).or_insert(0) += working;
            if working < required {
                issues.push(ValidationIssue::count(
                    IssueType::SlotShortage,
                    shortage_severity(required, working),
                    date,
                    &pool.0,
                    Some(pool.1.as_str()),
                    required,
                    working,
                ));
            } else if working > required {
                issues.push(ValidationIssue::count(
                    IssueType::SlotExcess,
                    Severity::Info,
                    date,
                    &pool.0,
                    Some(pool.1.as_str()),
                    required,
                    working,
                ));
            }
        }

        for (dept, &required) in &dept_required {
            let working = dept_working.get(dept).copied().unwrap_or(0);
            if working < required {
                issues.push(ValidationIssue::count(
                    IssueType::StaffShortage,
                    Severity::Warning,
                    date,
                    dept,
                    None,
                    required,
                    working,
                ));
            } else if working > required {
                issues.push(ValidationIssue::count(
                    IssueType::StaffExcess,
                    Severity::Info,
                    date,
                    dept,
                    None,
                    required,
                    working,
                ));
            }

            let Some(ratios) = input.config.category_ratios.get(*dept) else {
                continue;
            };
            if working == 0 {
                continue;
            }
            let mut categories: Vec<&String> = ratios.keys().collect();
            categories.sort();
            for category in categories {
                let Some(ratio) = input.config.category_ratio(dept, category) else {
                    continue;
                };
                let expected = (ratio * f64::from(working)).floor() as u32;
                let actual = working_today
                    .get(&(dept.to_string(), category.clone()))
                    .copied()
                    .unwrap_or(0);
                if actual < expected {
                    issues.push(ValidationIssue::count(
                        IssueType::CategoryShortage,
                        Severity::Warning,
                        date,
                        dept,
                        Some(category.as_str()),
                        expected,
                        actual,
                    ));
                }
            }
        }
    }

    issues.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.issue_type.cmp(&b.issue_type))
            .then_with(|| a.staff_id.cmp(&b.staff_id))
            .then_with(|| a.department.cmp(&b.department))
            .then_with(|| a.category.cmp(&b.category))
    });
    issues
}

pub struct Validator<'a> {
    store: &'a RotaStore,
    config: &'a RotaConfig,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a RotaStore, config: &'a RotaConfig) -> Self {
        Self { store, config }
    }

    /// Read-only scan of a schedule's whole month.
    pub fn scan(&self, schedule_id: ScheduleId) -> RotaResult<Vec<ValidationIssue>> {
        let schedule = self.store.get_schedule(schedule_id)?;
        let (start, end) = month_range(schedule.year, schedule.month)?;
        let rows = self.store.assignments(schedule_id, start, end)?;
        let staff = self.store.clinic_staff(&schedule.clinic_id)?;
        let load = load_demand(self.store, &schedule, start, end)?;
        let confirmed_leave: HashSet<(EntityId, NaiveDate)> = self
            .store
            .confirmed_leaves(&schedule.clinic_id, start, end)?
            .into_iter()
            .map(|l| (l.staff_id, l.date))
            .collect();
        Ok(scan_rows(&ScanInput {
            rows: &rows,
            staff: &staff,
            demand: &load.demand,
            holidays: &load.holidays,
            confirmed_leave: &confirmed_leave,
            config: self.config,
        }))
    }

    pub fn run(&self, schedule_id: ScheduleId, auto_fix: bool) -> RotaResult<ValidationReport> {
        let run_id = format!("validate-{}", Uuid::new_v4());
        let issues = self.scan(schedule_id)?;
        let mut report = ValidationReport {
            run_id: run_id.clone(),
            schedule_id,
            issues,
            fixed: Vec::new(),
            fix_limit_reached: false,
        };
        if !auto_fix {
            self.log_summary(&report);
            return Ok(report);
        }

        let mut fixable: Vec<&ValidationIssue> = report
            .issues
            .iter()
            .filter(|i| i.issue_type.is_auto_fixable())
            .collect();
        // Duplicates first so a leave conflict never deletes the kept row
        // of a pair whose later rows are also going away.
        fixable.sort_by_key(|i| (i.issue_type, i.date));

        let limit = self.config.engine.max_auto_fixes;
        let mut fixed = Vec::new();
        let mut limit_reached = false;
        for issue in fixable {
            if fixed.len() >= limit {
                limit_reached = true;
                break;
            }
            match self.fix(&run_id, schedule_id, issue) {
                Ok(0) => {}
                Ok(removed) => {
                    log::debug!("Fixed {} ({removed} row(s)): {}", issue.issue_type, issue.message);
                    fixed.push(issue.clone());
                }
                Err(e) => log::warn!("Auto-fix of {} failed: {e}", issue.issue_type),
            }
        }

        report.fixed = fixed;
        report.fix_limit_reached = limit_reached;
        if !report.fixed.is_empty() {
            report.issues = self.scan(schedule_id)?;
        }
        self.log_summary(&report);
        Ok(report)
    }

    fn fix(&self, run_id: &str, schedule_id: ScheduleId, issue: &ValidationIssue) -> RotaResult<usize> {
        self.store.in_transaction(|store| {
            let mut removed = Vec::new();
            for id in &issue.assignment_ids {
                if store.delete_assignment(*id)? > 0 {
                    removed.push(*id);
                }
            }
            if removed.is_empty() {
                return Ok(0);
            }
            store.append_event(
                run_id,
                Some(schedule_id),
                &RunEvent::IssueFixed {
                    issue_type: issue.issue_type,
                    staff_id: issue.staff_id.clone().unwrap_or_default(),
                    date: issue.date,
                    removed: removed.clone(),
                },
            )?;
            Ok(removed.len())
        })
    }

    fn log_summary(&self, report: &ValidationReport) {
        log::info!(
            "Validation of schedule {}: {} issue(s), {} fixed{}",
            report.schedule_id,
            report.issues.len(),
            report.fixed.len(),
            if report.fix_limit_reached {
                " (fix limit reached)"
            } else {
                ""
            }
        );
    }
}
