//! Background worker: jobs run on their own connection and report back in
//! submission order.

use chrono::NaiveDate;
use rota_core::{
    config::RotaConfig,
    error::ErrorClass,
    schedule::ScheduleDesk,
    seed::{apply_seed, SeedCombination, SeedFile, SeedMonth, SeedRequirement, SeedRosterDay, SeedStaff},
    store::RotaStore,
    types::{Dimension, IssueType, ScheduleId, ShiftType},
    worker::{BackgroundWorker, Job, JobOutcome},
};
use std::{path::PathBuf, time::Duration};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(30);

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("rota-worker-{}.db", Uuid::new_v4())),
        }
    }

    fn uri(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

/// Two hygienists, KIM on the 4th only, h1 booked twice that day.
fn prepare(db: &TempDb) -> ScheduleId {
    let store = RotaStore::open(&db.uri()).expect("file store");
    store.migrate().expect("migration");
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
    let schedule_id = apply_seed(&store, &seed).expect("seed")[0].schedule_id;
    store.insert_assignment(schedule_id, "h1", d(4), ShiftType::Day).unwrap();
    store.insert_assignment(schedule_id, "h1", d(4), ShiftType::Day).unwrap();
    store.insert_assignment(schedule_id, "h2", d(4), ShiftType::Off).unwrap();
    schedule_id
}

#[test]
fn validate_then_recompute_in_order() {
    let db = TempDb::new();
    let schedule_id = prepare(&db);
    let worker = BackgroundWorker::spawn(&db.uri(), RotaConfig::default_test()).expect("worker");

    worker
        .submit(Job::Validate {
            schedule_id,
            auto_fix: true,
        })
        .unwrap();
    worker.submit(Job::Recompute { schedule_id }).unwrap();

    match worker.recv_timeout(WAIT).expect("validation outcome") {
        JobOutcome::Validated(report) => {
            assert_eq!(report.fixed.len(), 1);
            assert_eq!(report.fixed[0].issue_type, IssueType::DuplicateAssignment);
        }
        other => panic!("expected a validation report, got {other:?}"),
    }
    // Not deployed yet.
    match worker.recv_timeout(WAIT).expect("recompute outcome") {
        JobOutcome::Failed { class, .. } => assert_eq!(class, ErrorClass::Conflict),
        other => panic!("expected a failure, got {other:?}"),
    }
    worker.shutdown();

    let store = RotaStore::open(&db.uri()).unwrap();
    assert_eq!(store.duplicate_pair_count(schedule_id).unwrap(), 0);
}

#[test]
fn recompute_after_deploy_updates_the_ledger() {
    let db = TempDb::new();
    let schedule_id = prepare(&db);
    let store = RotaStore::open(&db.uri()).unwrap();
    let desk = ScheduleDesk::new(&store);
    desk.confirm(schedule_id).unwrap();
    desk.deploy(schedule_id, d(1), d(31)).unwrap();

    let worker = BackgroundWorker::spawn(&db.uri(), RotaConfig::default_test()).expect("worker");
    worker.submit(Job::Recompute { schedule_id }).unwrap();

    match worker.recv_timeout(WAIT).expect("recompute outcome") {
        JobOutcome::Recomputed(summary) => assert_eq!(summary.staff_count, 2),
        other => panic!("expected a recompute summary, got {other:?}"),
    }
    drop(worker);

    // h1 worked 1 day, h2 none: average 0.5.
    assert!((store.cumulative_deviation("h1", Dimension::Total).unwrap() + 0.5).abs() < 1e-9);
    assert!((store.cumulative_deviation("h2", Dimension::Total).unwrap() - 0.5).abs() < 1e-9);
}
