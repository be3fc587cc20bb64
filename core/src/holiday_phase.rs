//! Phase 3: holiday enforcement.
//!
//! RULE: runs last. Every DAY/NIGHT row on a registered holiday inside the
//! run range becomes OFF, whatever Phases 1 and 2 decided. Frozen holidays
//! are left as deployed.

use crate::{
    context::{AssignmentBook, AssignmentChange, RunContext},
    types::ShiftType,
};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolidayOutcome {
    pub date: NaiveDate,
    pub name: String,
    /// Rows converted to OFF, counting duplicate rows too.
    pub changed: usize,
}

/// Holidays this run is allowed to touch, ascending.
pub fn holiday_dates(ctx: &RunContext) -> Vec<(NaiveDate, String)> {
    ctx.holidays
        .within(ctx.range.0, ctx.range.1)
        .into_iter()
        .filter(|(date, _)| !ctx.is_frozen(*date))
        .map(|(date, name)| (date, name.to_string()))
        .collect()
}

/// Work rows on `date` that must become OFF.
pub fn plan_holiday(book: &AssignmentBook, date: NaiveDate) -> Vec<AssignmentChange> {
    book.on(date)
        .filter(|(_, entry)| entry.shift.is_work())
        .map(|(staff_id, entry)| AssignmentChange::Update {
            assignment_id: entry.assignment_id,
            staff_id: staff_id.clone(),
            date,
            from: entry.shift,
            to: ShiftType::Off,
        })
        .collect()
}
