//! Fairness snapshot recompute across two deployed months: deviations,
//! the running cumulative, partial deployed ranges, and idempotence.

use chrono::NaiveDate;
use rota_core::{
    error::ErrorClass,
    schedule::ScheduleDesk,
    seed::{apply_seed, SeedCombination, SeedFile, SeedMonth, SeedRequirement, SeedRosterDay, SeedStaff},
    snapshot::SnapshotRecompute,
    store::RotaStore,
    types::{Dimension, ScheduleId, ShiftType},
};

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

fn feb(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
}

fn month(month: u32, kim_days: &[NaiveDate]) -> SeedMonth {
    SeedMonth {
        year: 2025,
        month,
        doctors: Vec::new(),
        has_night: false,
        closed_weekdays: Vec::new(),
        overrides: kim_days
            .iter()
            .map(|date| SeedRosterDay {
                date: *date,
                doctors: vec!["KIM".into()],
                has_night: false,
            })
            .collect(),
    }
}

/// Two hygienists. January: h1 works Mon–Wed and Saturday 11th, h2 works
/// Mon–Tue. February: h1 works the 3rd and 17th, h2 the 4th and 5th.
fn build() -> (RotaStore, ScheduleId, ScheduleId) {
    let seed = SeedFile {
        clinic_id: "c1".into(),
        staff: ["h1", "h2"]
            .into_iter()
            .map(|id| SeedStaff {
                staff_id: id.into(),
                name: id.to_uppercase(),
                department: "hygiene".into(),
                category: "hygienist".into(),
                target_weekly_workdays: None,
                active: true,
            })
            .collect(),
        combinations: vec![SeedCombination {
            doctors: vec!["KIM".into()],
            has_night: false,
            requirements: vec![SeedRequirement {
                department: "hygiene".into(),
                category: "hygienist".into(),
                required: 1,
            }],
        }],
        holidays: Vec::new(),
        months: vec![
            month(1, &[jan(6), jan(7), jan(8), jan(11)]),
            month(2, &[feb(3), feb(4), feb(5), feb(17)]),
        ],
    };
    let store = RotaStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let schedules = apply_seed(&store, &seed).expect("seed");
    let (january, february) = (schedules[0].schedule_id, schedules[1].schedule_id);

    let work = [
        (january, "h1", jan(6)),
        (january, "h1", jan(7)),
        (january, "h1", jan(8)),
        (january, "h1", jan(11)),
        (january, "h2", jan(6)),
        (january, "h2", jan(7)),
        (february, "h1", feb(3)),
        (february, "h1", feb(17)),
        (february, "h2", feb(4)),
        (february, "h2", feb(5)),
    ];
    for (schedule_id, staff_id, date) in work {
        store
            .insert_assignment(schedule_id, staff_id, date, ShiftType::Day)
            .unwrap();
    }
    (store, january, february)
}

fn deploy(store: &RotaStore, schedule_id: ScheduleId, start: NaiveDate, end: NaiveDate) {
    let desk = ScheduleDesk::new(store);
    desk.confirm(schedule_id).unwrap();
    desk.deploy(schedule_id, start, end).unwrap();
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn recompute_requires_a_deployed_schedule() {
    let (store, january, _) = build();

    let err = SnapshotRecompute::new(&store).recompute(january).unwrap_err();

    assert_eq!(err.class(), ErrorClass::Conflict);
    assert_eq!(store.cumulative_deviation("h1", Dimension::Total).unwrap(), 0.0);
}

#[test]
fn first_month_deviation_per_dimension() {
    let (store, january, _) = build();
    deploy(&store, january, jan(1), jan(31));

    let summary = SnapshotRecompute::new(&store).recompute(january).unwrap();

    assert_eq!(summary.staff_count, 2);
    assert_eq!(summary.rows_written, 2 * Dimension::ALL.len());
    assert_eq!(
        store
            .event_count(&summary.run_id, "snapshot_recomputed")
            .unwrap(),
        1
    );

    let h1 = SnapshotRecompute::new(&store).staff_snapshot("h1", 2025, 1).unwrap();
    let total = h1.dimension(Dimension::Total).unwrap();
    assert_eq!(total.actual, 4);
    assert!(close(total.deviation, -1.0));
    let weekend = h1.dimension(Dimension::Weekend).unwrap();
    assert_eq!(weekend.actual, 1);
    assert!(close(weekend.deviation, -0.5));

    assert!(close(store.cumulative_deviation("h1", Dimension::Total).unwrap(), -1.0));
    assert!(close(store.cumulative_deviation("h2", Dimension::Total).unwrap(), 1.0));
    assert!(close(store.cumulative_deviation("h2", Dimension::Weekend).unwrap(), 0.5));
}

#[test]
fn second_month_carries_the_cumulative_forward() {
    let (store, january, february) = build();
    deploy(&store, january, jan(1), jan(31));
    // The 17th stays outside the deployed range.
    deploy(&store, february, feb(1), feb(14));
    let recompute = SnapshotRecompute::new(&store);
    recompute.recompute(january).unwrap();

    recompute.recompute(february).unwrap();

    // February: h1 1 day, h2 2 days, average 1.5.
    let h1 = recompute.staff_snapshot("h1", 2025, 2).unwrap();
    let total = h1.dimension(Dimension::Total).unwrap();
    assert_eq!(total.actual, 1);
    assert!(close(total.deviation, 0.5));
    assert!(close(total.cumulative_deviation, -0.5));
    assert!(close(store.cumulative_deviation("h1", Dimension::Total).unwrap(), -0.5));
    assert!(close(store.cumulative_deviation("h2", Dimension::Total).unwrap(), 0.5));
}

#[test]
fn recomputing_a_month_again_changes_nothing() {
    let (store, january, february) = build();
    deploy(&store, january, jan(1), jan(31));
    deploy(&store, february, feb(1), feb(28));
    let recompute = SnapshotRecompute::new(&store);
    recompute.recompute(january).unwrap();
    recompute.recompute(february).unwrap();
    let before = recompute.staff_snapshot("h1", 2025, 2).unwrap();
    let ledger_before = store.cumulative_deviation("h1", Dimension::Total).unwrap();

    recompute.recompute(february).unwrap();
    recompute.recompute(january).unwrap();

    assert_eq!(recompute.staff_snapshot("h1", 2025, 2).unwrap(), before);
    assert!(close(
        store.cumulative_deviation("h1", Dimension::Total).unwrap(),
        ledger_before
    ));
}
