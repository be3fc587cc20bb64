//! Fairness snapshot recompute.
//!
//! RULE: this is the only writer of cumulative deviation.
//!
//! After a schedule is DEPLOYED, every active staff member's worked days in
//! the deployed range are counted per dimension. For each dimension:
//!
//!   deviation  = departmentAverage − actual
//!   cumulative = Σ deviation of earlier months this year + deviation
//!
//! Positive means under-worked. Re-running a month replaces its rows, so
//! the recompute is idempotent.

use crate::{
    context::{load_demand, AssignmentBook},
    error::{RotaError, RotaResult},
    event::RunEvent,
    requirement::DemandCalendar,
    store::{AssignmentRow, RotaStore, SnapshotRow, StaffRecord},
    types::{Dimension, EntityId, ScheduleId, ScheduleStatus},
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Per-staff view exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionSnapshot {
    pub dimension: Dimension,
    pub actual: u32,
    pub deviation: f64,
    pub cumulative_deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffSnapshot {
    pub staff_id: EntityId,
    pub year: i32,
    pub month: u32,
    pub dimensions: Vec<DimensionSnapshot>,
}

impl StaffSnapshot {
    pub fn dimension(&self, dimension: Dimension) -> Option<&DimensionSnapshot> {
        self.dimensions.iter().find(|d| d.dimension == dimension)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeSummary {
    pub run_id: String,
    pub schedule_id: ScheduleId,
    pub year: i32,
    pub month: u32,
    pub period: (NaiveDate, NaiveDate),
    pub staff_count: usize,
    pub rows_written: usize,
}

/// Snapshot rows for one month. `prior` holds each (staff, dimension)'s sum
/// of earlier months' deviations this year; missing entries read as zero.
pub fn compute_month_snapshots(
    staff: &[StaffRecord],
    rows: &[AssignmentRow],
    demand: &DemandCalendar,
    period: (NaiveDate, NaiveDate),
    year: i32,
    month: u32,
    prior: &HashMap<(EntityId, Dimension), f64>,
) -> Vec<SnapshotRow> {
    let book = AssignmentBook::from_rows(rows);
    let active: Vec<&StaffRecord> = staff.iter().filter(|s| s.active).collect();

    let mut actuals: BTreeMap<(&str, Dimension), u32> = BTreeMap::new();
    for s in &active {
        for dimension in Dimension::ALL {
            actuals.insert((s.staff_id.as_str(), *dimension), 0);
        }
        for day in demand.days() {
            if day.date < period.0 || day.date > period.1 || !book.worked(&s.staff_id, day.date) {
                continue;
            }
            for dimension in day.class.dimensions() {
                *actuals.entry((s.staff_id.as_str(), dimension)).or_insert(0) += 1;
            }
        }
    }

    let mut dept_totals: HashMap<(&str, Dimension), (u32, u32)> = HashMap::new();
    for s in &active {
        for dimension in Dimension::ALL {
            let actual = actuals[&(s.staff_id.as_str(), *dimension)];
            let entry = dept_totals
                .entry((s.department.as_str(), *dimension))
                .or_insert((0, 0));
            entry.0 += actual;
            entry.1 += 1;
        }
    }

    let mut out = Vec::with_capacity(active.len() * Dimension::ALL.len());
    for s in &active {
        for dimension in Dimension::ALL {
            let actual = actuals[&(s.staff_id.as_str(), *dimension)];
            let (sum, n) = dept_totals[&(s.department.as_str(), *dimension)];
            let department_average = f64::from(sum) / f64::from(n);
            let deviation = department_average - f64::from(actual);
            let earlier = prior
                .get(&(s.staff_id.clone(), *dimension))
                .copied()
                .unwrap_or(0.0);
            out.push(SnapshotRow {
                staff_id: s.staff_id.clone(),
                year,
                month,
                dimension: *dimension,
                actual,
                department_average,
                deviation,
                cumulative_deviation: earlier + deviation,
            });
        }
    }
    out
}

pub struct SnapshotRecompute<'a> {
    store: &'a RotaStore,
}

impl<'a> SnapshotRecompute<'a> {
    pub fn new(store: &'a RotaStore) -> Self {
        Self { store }
    }

    pub fn recompute(&self, schedule_id: ScheduleId) -> RotaResult<RecomputeSummary> {
        let schedule = self.store.get_schedule(schedule_id)?;
        let period = match (schedule.status, schedule.frozen_range()) {
            (ScheduleStatus::Deployed, Some(range)) => range,
            _ => {
                return Err(RotaError::NotDeployed {
                    schedule_id,
                    status: schedule.status,
                })
            }
        };
        let (year, month) = (schedule.year, schedule.month);
        let run_id = format!("recompute-{}", Uuid::new_v4());

        let summary = self.store.in_transaction(|store| {
            let staff = store.active_staff(&schedule.clinic_id)?;
            let rows = store.assignments(schedule_id, period.0, period.1)?;
            let demand = load_demand(store, &schedule, period.0, period.1)?.demand;

            let mut prior = HashMap::new();
            for s in &staff {
                for dimension in Dimension::ALL {
                    prior.insert(
                        (s.staff_id.clone(), *dimension),
                        store.prior_deviation_sum(&s.staff_id, year, month, *dimension)?,
                    );
                }
            }

            let snapshots =
                compute_month_snapshots(&staff, &rows, &demand, period, year, month, &prior);
            store.clear_month_snapshots(&schedule.clinic_id, year, month)?;
            for row in &snapshots {
                store.upsert_snapshot(row)?;
            }
            // The ledger carries the year's running total, which includes
            // months recomputed after this one.
            for s in &staff {
                for dimension in Dimension::ALL {
                    let total = store.prior_deviation_sum(&s.staff_id, year, 13, *dimension)?;
                    store.set_cumulative_deviation(&s.staff_id, *dimension, total)?;
                }
            }
            store.append_event(
                &run_id,
                Some(schedule_id),
                &RunEvent::SnapshotRecomputed {
                    year,
                    month,
                    staff_count: staff.len(),
                },
            )?;
            Ok(RecomputeSummary {
                run_id: run_id.clone(),
                schedule_id,
                year,
                month,
                period,
                staff_count: staff.len(),
                rows_written: snapshots.len(),
            })
        })?;

        log::info!(
            "Fairness snapshot {year}-{month:02} recomputed for {} staff over {}..={}",
            summary.staff_count,
            period.0,
            period.1
        );
        Ok(summary)
    }

    pub fn staff_snapshot(&self, staff_id: &str, year: i32, month: u32) -> RotaResult<StaffSnapshot> {
        let rows = self.store.snapshot_for(staff_id, year, month)?;
        Ok(StaffSnapshot {
            staff_id: staff_id.to_string(),
            year,
            month,
            dimensions: rows
                .into_iter()
                .map(|r| DimensionSnapshot {
                    dimension: r.dimension,
                    actual: r.actual,
                    deviation: r.deviation,
                    cumulative_deviation: r.cumulative_deviation,
                })
                .collect(),
        })
    }
}
