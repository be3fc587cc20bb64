//! Leave desk: submit, evaluate, approve, hold, reject.
//!
//! Approval re-evaluates the quota inside a `BEGIN IMMEDIATE` transaction.
//! SQLite grants the write lock to one connection at a time, so two
//! approvals racing for the last slot of a (date, category) are decided one
//! after the other: the second sees the first's CONFIRMED row in its
//! `used_slots` and is parked ON_HOLD.

use crate::{
    context::load_demand,
    error::{RotaError, RotaResult},
    event::RunEvent,
    fairness::{FairnessLedger, LeaveQuotaDecision, QuotaCalculator, QuotaRequest},
    schedule::eligibility_period,
    store::{LeaveRow, RotaStore, ScheduleRow, StaffRecord},
    types::{Dimension, LeaveId, LeaveStatus, LeaveType},
};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct LeaveOutcome {
    pub leave_id: LeaveId,
    pub status: LeaveStatus,
    pub decision: LeaveQuotaDecision,
}

pub struct LeaveDesk<'a> {
    store: &'a RotaStore,
}

impl<'a> LeaveDesk<'a> {
    pub fn new(store: &'a RotaStore) -> Self {
        Self { store }
    }

    /// File a PENDING application. Dates with no open period (no schedule,
    /// frozen, or before the deployed range) are refused here.
    pub fn submit(
        &self,
        staff_id: &str,
        date: NaiveDate,
        leave_type: LeaveType,
    ) -> RotaResult<LeaveId> {
        let staff = find_staff(self.store, staff_id)?;
        open_period(self.store, &staff, date)?;
        let id = self
            .store
            .insert_leave(staff_id, date, leave_type, LeaveStatus::Pending)?;
        log::debug!("Leave {id} submitted: {staff_id} {date} {leave_type}");
        Ok(id)
    }

    /// Read-only quota decision for an existing application.
    pub fn evaluate(&self, leave_id: LeaveId) -> RotaResult<LeaveQuotaDecision> {
        let leave = self.store.get_leave(leave_id)?;
        quota_decision(self.store, &leave.staff_id, leave.date, Some(leave_id))
    }

    /// Read-only quota decision for a request that has not been filed yet.
    pub fn preview(&self, staff_id: &str, date: NaiveDate) -> RotaResult<LeaveQuotaDecision> {
        quota_decision(self.store, staff_id, date, None)
    }

    /// CONFIRMED when every triggered gate passes, ON_HOLD otherwise.
    pub fn approve(&self, leave_id: LeaveId) -> RotaResult<LeaveOutcome> {
        self.store.in_transaction(|store| {
            let leave = store.get_leave(leave_id)?;
            ensure_open(&leave)?;
            let decision = quota_decision(store, &leave.staff_id, leave.date, Some(leave_id))?;
            let status = if decision.can_approve {
                LeaveStatus::Confirmed
            } else {
                LeaveStatus::OnHold
            };
            store.set_leave_status(leave_id, status)?;
            store.append_event(
                &format!("leave-{leave_id}"),
                None,
                &RunEvent::LeaveDecided {
                    leave_id,
                    staff_id: leave.staff_id.clone(),
                    date: leave.date,
                    status,
                },
            )?;
            log::info!(
                "Leave {leave_id} ({} {}) -> {status} [{} used {}/{}]",
                leave.staff_id,
                leave.date,
                decision.binding_dimension,
                decision.approved_count,
                decision.allowed_count
            );
            Ok(LeaveOutcome {
                leave_id,
                status,
                decision,
            })
        })
    }

    pub fn reject(&self, leave_id: LeaveId) -> RotaResult<()> {
        self.store.in_transaction(|store| {
            let leave = store.get_leave(leave_id)?;
            ensure_open(&leave)?;
            store.set_leave_status(leave_id, LeaveStatus::Rejected)?;
            store.append_event(
                &format!("leave-{leave_id}"),
                None,
                &RunEvent::LeaveDecided {
                    leave_id,
                    staff_id: leave.staff_id,
                    date: leave.date,
                    status: LeaveStatus::Rejected,
                },
            )
        })
    }
}

fn ensure_open(leave: &LeaveRow) -> RotaResult<()> {
    match leave.status {
        LeaveStatus::Pending | LeaveStatus::OnHold => Ok(()),
        status => Err(RotaError::LeaveNotOpen {
            leave_id: leave.leave_id,
            status,
        }),
    }
}

/// Quota decision for `staff_id` taking leave on `date`, counting the
/// staff member's other confirmed/pending leave but not `exclude`.
pub fn quota_decision(
    store: &RotaStore,
    staff_id: &str,
    date: NaiveDate,
    exclude: Option<LeaveId>,
) -> RotaResult<LeaveQuotaDecision> {
    let staff = find_staff(store, staff_id)?;
    let (schedule, period) = open_period(store, &staff, date)?;
    let demand = load_demand(store, &schedule, period.0, period.1)?.demand;

    let pool = staff.pool();
    let pool_size = store.pool_size(&staff.clinic_id, &pool.0, &pool.1)?;
    let pool_sizes: HashMap<_, _> = [(pool.clone(), pool_size)].into();

    let ledger = FairnessLedger::from_rows(
        Dimension::ALL
            .iter()
            .map(|d| Ok((staff.staff_id.clone(), *d, store.cumulative_deviation(&staff.staff_id, *d)?)))
            .collect::<RotaResult<Vec<_>>>()?,
    );

    let counted: Vec<NaiveDate> = store
        .staff_leaves(&staff.staff_id, period.0, period.1, LeaveStatus::COUNTED)?
        .into_iter()
        .filter(|l| Some(l.leave_id) != exclude)
        .map(|l| l.date)
        .collect();

    let calc = QuotaCalculator {
        demand: &demand,
        ledger: &ledger,
        pool_sizes: &pool_sizes,
        period,
    };
    let mut decision = calc.decide(&QuotaRequest {
        staff_id: &staff.staff_id,
        pool: &pool,
        date,
        counted_leave: &counted,
    });
    if !staff.active {
        decision.can_approve = false;
        decision.should_hold = true;
    }
    Ok(decision)
}

fn find_staff(store: &RotaStore, staff_id: &str) -> RotaResult<StaffRecord> {
    store
        .get_staff(staff_id)?
        .ok_or_else(|| RotaError::StaffNotFound {
            staff_id: staff_id.to_string(),
        })
}

/// The schedule covering `date` and its open period, which must contain
/// `date`. Open dates before a mid-month deployed range have no period.
fn open_period(
    store: &RotaStore,
    staff: &StaffRecord,
    date: NaiveDate,
) -> RotaResult<(ScheduleRow, (NaiveDate, NaiveDate))> {
    let (year, month) = (date.year(), date.month());
    let schedule = store
        .find_schedule(&staff.clinic_id, year, month)?
        .ok_or_else(|| RotaError::ScheduleNotFound {
            clinic_id: staff.clinic_id.clone(),
            year,
            month,
        })?;
    if schedule.is_frozen(date) {
        return Err(RotaError::FrozenDate { date });
    }
    match eligibility_period(&schedule)? {
        Some((start, end)) if start <= date && date <= end => Ok((schedule, (start, end))),
        _ => Err(RotaError::OutsideEligibility { date }),
    }
}
