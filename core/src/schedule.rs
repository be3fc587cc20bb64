//! Schedule lifecycle: roster application and DRAFT → CONFIRMED → DEPLOYED.
//!
//! Applying a doctor roster creates the month's schedule (DRAFT) and its
//! doctor day slots. Deploying freezes a date range inside the month; the
//! engine never mutates frozen dates afterwards, and the fairness snapshot
//! recompute reads exactly that range.

use crate::{
    calendar::month_range,
    error::{RotaError, RotaResult},
    requirement::DoctorRoster,
    store::{RotaStore, ScheduleRow},
    types::{ScheduleId, ScheduleStatus},
};
use chrono::NaiveDate;

pub struct ScheduleDesk<'a> {
    store: &'a RotaStore,
}

impl<'a> ScheduleDesk<'a> {
    pub fn new(store: &'a RotaStore) -> Self {
        Self { store }
    }

    /// Record the realized doctor roster for some days of a month.
    ///
    /// Creates the schedule if needed. Days outside the month or inside a
    /// frozen range are rejected before anything is written.
    pub fn apply_roster(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        days: &[(NaiveDate, DoctorRoster)],
    ) -> RotaResult<ScheduleRow> {
        let (start, end) = month_range(year, month)?;
        self.store.in_transaction(|store| {
            let schedule = store.get_or_create_schedule(clinic_id, year, month)?;
            for (date, roster) in days {
                if *date < start || *date > end {
                    return Err(RotaError::RangeOutsideMonth {
                        start: *date,
                        end: *date,
                        year,
                        month,
                    });
                }
                if schedule.is_frozen(*date) {
                    return Err(RotaError::FrozenDate { date: *date });
                }
                store.upsert_day_slot(schedule.schedule_id, *date, roster)?;
            }
            log::info!(
                "Applied roster for {} day(s) to schedule {} ({clinic_id} {year}-{month:02})",
                days.len(),
                schedule.schedule_id
            );
            Ok(schedule)
        })
    }

    pub fn confirm(&self, schedule_id: ScheduleId) -> RotaResult<ScheduleRow> {
        self.transition(schedule_id, ScheduleStatus::Confirmed)
    }

    /// Move a CONFIRMED schedule back to DRAFT for more edits.
    pub fn reopen(&self, schedule_id: ScheduleId) -> RotaResult<ScheduleRow> {
        self.transition(schedule_id, ScheduleStatus::Draft)
    }

    /// Deploy and freeze `start..=end`.
    ///
    /// The fairness snapshot recompute should follow; callers hand it to
    /// the background worker rather than running it inline.
    pub fn deploy(
        &self,
        schedule_id: ScheduleId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RotaResult<ScheduleRow> {
        self.store.in_transaction(|store| {
            let schedule = store.get_schedule(schedule_id)?;
            let (month_start, month_end) = month_range(schedule.year, schedule.month)?;
            if start > end || start < month_start || end > month_end {
                return Err(RotaError::RangeOutsideMonth {
                    start,
                    end,
                    year: schedule.year,
                    month: schedule.month,
                });
            }
            if !schedule.status.can_transition_to(ScheduleStatus::Deployed) {
                return Err(RotaError::InvalidTransition {
                    from: schedule.status,
                    to: ScheduleStatus::Deployed,
                });
            }
            store.set_deployed_range(schedule_id, start, end)?;
            store.set_schedule_status(schedule_id, ScheduleStatus::Deployed)?;
            log::info!("Schedule {schedule_id} deployed; {start}..={end} frozen");
            store.get_schedule(schedule_id)
        })
    }

    fn transition(&self, schedule_id: ScheduleId, to: ScheduleStatus) -> RotaResult<ScheduleRow> {
        self.store.in_transaction(|store| {
            let schedule = store.get_schedule(schedule_id)?;
            if !schedule.status.can_transition_to(to) {
                return Err(RotaError::InvalidTransition {
                    from: schedule.status,
                    to,
                });
            }
            store.set_schedule_status(schedule_id, to)?;
            log::debug!("Schedule {schedule_id}: {} -> {to}", schedule.status);
            store.get_schedule(schedule_id)
        })
    }
}

/// The open part of a schedule's month: everything after the frozen range
/// when deployed, else the whole month.
pub fn eligibility_period(schedule: &ScheduleRow) -> RotaResult<Option<(NaiveDate, NaiveDate)>> {
    let (start, end) = month_range(schedule.year, schedule.month)?;
    match schedule.frozen_range() {
        Some((_, frozen_end)) if frozen_end >= end => Ok(None),
        Some((_, frozen_end)) => Ok(frozen_end.succ_opt().map(|s| (s.max(start), end))),
        None => Ok(Some((start, end))),
    }
}
