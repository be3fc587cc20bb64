//! Holiday enforcement: every work row on a registered holiday ends the
//! run as OFF, and holidays never count toward weekly balancing.

use chrono::{NaiveDate, Weekday};
use rota_core::{
    config::RotaConfig,
    engine::{AssignmentEngine, RunRequest},
    seed::{apply_seed, SeedCombination, SeedFile, SeedHoliday, SeedMonth, SeedRequirement, SeedStaff},
    store::{RotaStore, ScheduleRow},
    types::AssignMode,
};

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

/// Six hygienists and two receptionists; the roster needs five of them
/// every day but Sunday. Monday 3 March is a holiday.
fn build() -> (RotaStore, ScheduleRow) {
    let mut staff: Vec<SeedStaff> = (1..=6)
        .map(|i| member(&format!("h{i}"), "hygiene", "hygienist"))
        .collect();
    staff.push(member("r1", "front", "reception"));
    staff.push(member("r2", "front", "reception"));
    let seed = SeedFile {
        clinic_id: "c1".into(),
        staff,
        combinations: vec![SeedCombination {
            doctors: vec!["KIM".into(), "LEE".into()],
            has_night: false,
            requirements: vec![
                SeedRequirement {
                    department: "hygiene".into(),
                    category: "hygienist".into(),
                    required: 4,
                },
                SeedRequirement {
                    department: "front".into(),
                    category: "reception".into(),
                    required: 1,
                },
            ],
        }],
        holidays: vec![SeedHoliday {
            date: d(3),
            name: "Substitute holiday".into(),
        }],
        months: vec![SeedMonth {
            year: 2025,
            month: 3,
            doctors: vec!["KIM".into(), "LEE".into()],
            has_night: false,
            closed_weekdays: vec![Weekday::Sun],
            overrides: Vec::new(),
        }],
    };

    let store = RotaStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let schedule = apply_seed(&store, &seed).expect("seed").remove(0);
    (store, schedule)
}

#[test]
fn five_work_rows_on_a_holiday_become_off() {
    let (store, schedule) = build();
    let config = RotaConfig::default_test();

    let summary =
        AssignmentEngine::new(&store, &config).run(&RunRequest::month("c1", 2025, 3, AssignMode::Smart));

    assert!(summary.success, "run failed: {:?}", summary.failure);
    assert_eq!(summary.stats.holiday_changes, 5);
    assert_eq!(store.event_count(&summary.run_id, "holiday_enforced").unwrap(), 1);

    let holiday_rows = store.assignments(schedule.schedule_id, d(3), d(3)).unwrap();
    assert_eq!(holiday_rows.len(), 8);
    assert!(holiday_rows.iter().all(|r| !r.shift_type.is_work()));
}

#[test]
fn holiday_outside_the_range_is_left_alone() {
    let (store, schedule) = build();
    let config = RotaConfig::default_test();
    let req = RunRequest::month("c1", 2025, 3, AssignMode::Smart).with_range(d(4), d(8));

    let summary = AssignmentEngine::new(&store, &config).run(&req);

    assert!(summary.success);
    assert_eq!(summary.stats.holiday_changes, 0);
    assert!(store.assignments(schedule.schedule_id, d(3), d(3)).unwrap().is_empty());
}

#[test]
fn rerun_finds_nothing_left_to_enforce() {
    let (store, _) = build();
    let config = RotaConfig::default_test();
    let engine = AssignmentEngine::new(&store, &config);
    let req = RunRequest::month("c1", 2025, 3, AssignMode::Smart);

    assert_eq!(engine.run(&req).stats.holiday_changes, 5);
    let again = engine.run(&req);

    assert!(again.success);
    assert_eq!(again.stats.holiday_changes, 0);
    assert_eq!(again.stats.off_flips, 0);
}
