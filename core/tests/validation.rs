//! Validation pass against a real store: read-only scans, bounded
//! auto-repair of duplicates and leave conflicts, and the rescan after it.

use chrono::NaiveDate;
use rota_core::{
    config::RotaConfig,
    engine::{AssignmentEngine, RunRequest},
    seed::{apply_seed, SeedCombination, SeedFile, SeedMonth, SeedRequirement, SeedRosterDay, SeedStaff},
    store::{RotaStore, ScheduleRow},
    types::{AssignMode, IssueType, LeaveStatus, LeaveType, Severity, ShiftType},
    validation::Validator,
};
use std::collections::HashMap;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

fn member(id: &str, department: &str, category: &str) -> SeedStaff {
    SeedStaff {
        staff_id: id.into(),
        name: id.to_uppercase(),
        department: department.into(),
        category: category.into(),
        target_weekly_workdays: None,
        active: true,
    }
}

/// KIM works only on Tuesday 4 March, needing two hygienists and one
/// receptionist. No other day of the month has demand.
fn build() -> (RotaStore, ScheduleRow) {
    let seed = SeedFile {
        clinic_id: "c1".into(),
        staff: vec![
            member("h1", "hygiene", "hygienist"),
            member("h2", "hygiene", "hygienist"),
            member("h3", "hygiene", "assistant"),
            member("r1", "front", "reception"),
        ],
        combinations: vec![SeedCombination {
            doctors: vec!["KIM".into()],
            has_night: false,
            requirements: vec![
                SeedRequirement {
                    department: "hygiene".into(),
                    category: "hygienist".into(),
                    required: 2,
                },
                SeedRequirement {
                    department: "front".into(),
                    category: "reception".into(),
                    required: 1,
                },
            ],
        }],
        holidays: Vec::new(),
        months: vec![SeedMonth {
            year: 2025,
            month: 3,
            doctors: Vec::new(),
            has_night: false,
            closed_weekdays: Vec::new(),
            overrides: vec![SeedRosterDay {
                date: d(4),
                doctors: vec!["KIM".into()],
                has_night: false,
            }],
        }],
    };
    let store = RotaStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let schedule = apply_seed(&store, &seed).expect("seed").remove(0);
    (store, schedule)
}

/// h1 twice, h2 and r1 once, all working; r1 has confirmed leave.
fn broken_day(store: &RotaStore, schedule: &ScheduleRow) {
    let id = schedule.schedule_id;
    store.insert_assignment(id, "h1", d(4), ShiftType::Day).unwrap();
    store.insert_assignment(id, "h1", d(4), ShiftType::Day).unwrap();
    store.insert_assignment(id, "h2", d(4), ShiftType::Day).unwrap();
    store.insert_assignment(id, "r1", d(4), ShiftType::Day).unwrap();
    store
        .insert_leave("r1", d(4), LeaveType::Annual, LeaveStatus::Confirmed)
        .unwrap();
}

#[test]
fn scan_reports_without_touching_rows() {
    let (store, schedule) = build();
    broken_day(&store, &schedule);
    let config = RotaConfig::default_test();

    let report = Validator::new(&store, &config)
        .run(schedule.schedule_id, false)
        .unwrap();

    assert_eq!(report.issues.len(), 2, "{:#?}", report.issues);
    assert_eq!(report.of_type(IssueType::DuplicateAssignment).count(), 1);
    assert_eq!(report.of_type(IssueType::LeaveConflict).count(), 1);
    assert!(report.fixed.is_empty());
    assert_eq!(store.assignment_count(schedule.schedule_id).unwrap(), 4);
}

#[test]
fn auto_fix_removes_duplicates_and_leave_conflicts() {
    let (store, schedule) = build();
    broken_day(&store, &schedule);
    let config = RotaConfig::default_test();

    let report = Validator::new(&store, &config)
        .run(schedule.schedule_id, true)
        .unwrap();

    assert_eq!(report.fixed.len(), 2);
    assert_eq!(report.fixed[0].issue_type, IssueType::DuplicateAssignment);
    assert!(!report.fix_limit_reached);
    assert_eq!(store.assignment_count(schedule.schedule_id).unwrap(), 2);
    assert_eq!(store.duplicate_pair_count(schedule.schedule_id).unwrap(), 0);
    assert_eq!(store.event_count(&report.run_id, "issue_fixed").unwrap(), 2);

    // Removing r1's row leaves the front desk empty.
    assert_eq!(report.of_type(IssueType::LeaveConflict).count(), 0);
    let shortage = report
        .of_type(IssueType::SlotShortage)
        .next()
        .expect("reception shortage after the fix");
    assert_eq!(shortage.category.as_deref(), Some("reception"));
    assert_eq!(shortage.severity, Severity::Critical);
    assert_eq!(report.worst_severity(), Some(Severity::Critical));
}

#[test]
fn fix_limit_stops_the_pass() {
    let (store, schedule) = build();
    broken_day(&store, &schedule);
    let mut config = RotaConfig::default_test();
    config.engine.max_auto_fixes = 1;

    let report = Validator::new(&store, &config)
        .run(schedule.schedule_id, true)
        .unwrap();

    assert_eq!(report.fixed.len(), 1);
    assert_eq!(report.fixed[0].issue_type, IssueType::DuplicateAssignment);
    assert!(report.fix_limit_reached);
    assert_eq!(report.of_type(IssueType::LeaveConflict).count(), 1);
    assert_eq!(store.assignment_count(schedule.schedule_id).unwrap(), 3);
}

#[test]
fn category_ratio_and_excess_checks() {
    let (store, schedule) = build();
    let id = schedule.schedule_id;
    for staff_id in ["h1", "h2", "h3", "r1"] {
        store.insert_assignment(id, staff_id, d(4), ShiftType::Day).unwrap();
    }
    let mut config = RotaConfig::default_test();
    config.category_ratios = HashMap::from([(
        "hygiene".to_string(),
        HashMap::from([("hygienist".to_string(), 100.0)]),
    )]);

    let issues = Validator::new(&store, &config).scan(id).unwrap();

    let excess: Vec<_> = issues
        .iter()
        .filter(|i| i.issue_type == IssueType::SlotExcess)
        .collect();
    assert_eq!(excess.len(), 1);
    assert_eq!(excess[0].category.as_deref(), Some("assistant"));

    let dept = issues
        .iter()
        .find(|i| i.issue_type == IssueType::StaffExcess)
        .expect("department excess");
    assert_eq!((dept.expected, dept.actual), (Some(2), Some(3)));

    let ratio = issues
        .iter()
        .find(|i| i.issue_type == IssueType::CategoryShortage)
        .expect("ratio shortage");
    assert_eq!((ratio.expected, ratio.actual), (Some(3), Some(2)));
}

#[test]
fn engine_output_has_nothing_to_repair() {
    let (store, schedule) = build();
    let config = RotaConfig::default_test();
    store
        .insert_leave("h1", d(4), LeaveType::Annual, LeaveStatus::Confirmed)
        .unwrap();
    let summary =
        AssignmentEngine::new(&store, &config).run(&RunRequest::month("c1", 2025, 3, AssignMode::Smart));
    assert!(summary.success);

    let report = Validator::new(&store, &config)
        .run(schedule.schedule_id, true)
        .unwrap();

    assert!(report.fixed.is_empty());
    assert_eq!(report.of_type(IssueType::DuplicateAssignment).count(), 0);
    assert_eq!(report.of_type(IssueType::LeaveConflict).count(), 0);
}
