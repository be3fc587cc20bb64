//! Phase 2: weekly OFF balancing.
//!
//! For every Sunday–Saturday week intersecting the run range:
//!
//!   offTarget = (businessDays − defaultWorkDays) × eligibleStaff
//!
//! and OFF rows are flipped one at a time until the week's OFF count on
//! business days meets the target or no flip is possible.
//!
//! RULE: every flip moves the OFF count one step toward the target, so the
//! loop is capped at the week's initial |actual − target|.
//!
//! Weeks clipped by the range edges scale the default and personal work-day
//! targets by `days / 7`, rounded.

use crate::{
    calendar::Week,
    context::{AssignmentBook, AssignmentChange, BookEntry, RunContext},
    error::{RotaError, RotaResult},
    store::StaffRecord,
    types::ShiftType,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::{cmp::Reverse, collections::HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekStatus {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub business_days: Vec<NaiveDate>,
    pub eligible_staff: u32,
    pub default_work_days: u32,
    pub off_target: u32,
    pub actual_off: u32,
}

impl WeekStatus {
    /// Positive when the week has too many OFF rows.
    pub fn gap(&self) -> i64 {
        i64::from(self.actual_off) - i64::from(self.off_target)
    }
}

#[derive(Debug, Serialize)]
pub struct WeekOutcome {
    pub week_start: NaiveDate,
    pub off_target: u32,
    pub initial_off: u32,
    pub final_off: u32,
    pub iteration_cap: u32,
    pub flips: u32,
    pub failed: u32,
    #[serde(skip)]
    pub failures: Vec<(NaiveDate, RotaError)>,
}

impl WeekOutcome {
    pub fn converged(&self) -> bool {
        self.final_off == self.off_target
    }
}

fn prorate(target: u32, week: &Week) -> u32 {
    if week.is_clipped() {
        (f64::from(target) * f64::from(week.days) / 7.0).round() as u32
    } else {
        target
    }
}

pub fn personal_target(ctx: &RunContext, staff: &StaffRecord, week: &Week) -> u32 {
    prorate(ctx.weekly_target(staff), week)
}

/// Days worked in the week, not counting holidays (Phase 3 clears those).
pub fn week_work_days(ctx: &RunContext, book: &AssignmentBook, staff_id: &str, week: &Week) -> u32 {
    week.dates()
        .filter(|d| !ctx.holidays.is_holiday(*d) && book.worked(staff_id, *d))
        .count() as u32
}

fn off_on(ctx: &RunContext, book: &AssignmentBook, date: NaiveDate) -> u32 {
    ctx.staff
        .iter()
        .filter(|s| matches!(book.get(&s.staff_id, date), Some(e) if !e.shift.is_work()))
        .count() as u32
}

pub fn week_status(ctx: &RunContext, book: &AssignmentBook, week: &Week) -> WeekStatus {
    let business_days: Vec<NaiveDate> = week.dates().filter(|d| ctx.is_business_day(*d)).collect();
    let eligible_staff = ctx.staff.len() as u32;
    let default_work_days = prorate(ctx.engine.default_work_days, week);
    let off_target = (business_days.len() as u32).saturating_sub(default_work_days) * eligible_staff;
    let actual_off = business_days.iter().map(|d| off_on(ctx, book, *d)).sum();
    WeekStatus {
        week_start: week.start,
        week_end: week.end,
        business_days,
        eligible_staff,
        default_work_days,
        off_target,
        actual_off,
    }
}

/// The single flip that moves `status` one step toward its target, if any.
///
/// Below target: a work row of someone over their personal target, on the
/// business day with the fewest OFF rows. Above target: an OFF row of
/// someone under their personal target, on the business day with the most
/// OFF rows, skipping their CONFIRMED leave. Ties fall to date, then the
/// seeded balance key, then staff id.
pub fn next_flip(
    ctx: &RunContext,
    book: &AssignmentBook,
    week: &Week,
    status: &WeekStatus,
) -> Option<AssignmentChange> {
    let off_counts: HashMap<NaiveDate, u32> = status
        .business_days
        .iter()
        .map(|d| (*d, off_on(ctx, book, *d)))
        .collect();
    let key_of = |id: &str| ctx.balance_keys.get(id).copied().unwrap_or_default();

    if status.actual_off < status.off_target {
        let mut best: Option<((u32, NaiveDate, u64, &str), BookEntry)> = None;
        for s in &ctx.staff {
            if week_work_days(ctx, book, &s.staff_id, week) <= personal_target(ctx, s, week) {
                continue;
            }
            for d in &status.business_days {
                let Some(entry) = book.get(&s.staff_id, *d) else {
                    continue;
                };
                if !entry.shift.is_work() {
                    continue;
                }
                let key = (off_counts[d], *d, key_of(&s.staff_id), s.staff_id.as_str());
                if best.as_ref().map_or(true, |(k, _)| key < *k) {
                    best = Some((key, entry));
                }
            }
        }
        best.map(|((_, date, _, staff_id), entry)| AssignmentChange::Update {
            assignment_id: entry.assignment_id,
            staff_id: staff_id.to_string(),
            date,
            from: entry.shift,
            to: ShiftType::Off,
        })
    } else if status.actual_off > status.off_target {
        let mut best: Option<((Reverse<u32>, NaiveDate, u64, &str), BookEntry)> = None;
        for s in &ctx.staff {
            if week_work_days(ctx, book, &s.staff_id, week) >= personal_target(ctx, s, week) {
                continue;
            }
            for d in &status.business_days {
                let Some(entry) = book.get(&s.staff_id, *d) else {
                    continue;
                };
                if entry.shift.is_work() || ctx.on_leave(&s.staff_id, *d) {
                    continue;
                }
                let key = (
                    Reverse(off_counts[d]),
                    *d,
                    key_of(&s.staff_id),
                    s.staff_id.as_str(),
                );
                if best.as_ref().map_or(true, |(k, _)| key < *k) {
                    best = Some((key, entry));
                }
            }
        }
        best.map(|((_, date, _, staff_id), entry)| AssignmentChange::Update {
            assignment_id: entry.assignment_id,
            staff_id: staff_id.to_string(),
            date,
            from: entry.shift,
            to: ShiftType::work_for(ctx.demand.day(date).map_or(false, |d| d.has_night())),
        })
    } else {
        None
    }
}

/// Balance one week. `commit` persists a flip and returns the stored row;
/// a failed commit ends the week with the failure recorded.
pub fn balance_week<F>(
    ctx: &RunContext,
    book: &mut AssignmentBook,
    week: &Week,
    mut commit: F,
) -> WeekOutcome
where
    F: FnMut(&AssignmentChange) -> RotaResult<BookEntry>,
{
    let mut status = week_status(ctx, book, week);
    let mut outcome = WeekOutcome {
        week_start: week.start,
        off_target: status.off_target,
        initial_off: status.actual_off,
        final_off: status.actual_off,
        iteration_cap: status.gap().unsigned_abs() as u32,
        flips: 0,
        failed: 0,
        failures: Vec::new(),
    };

    while outcome.flips < outcome.iteration_cap {
        let Some(change) = next_flip(ctx, book, week, &status) else {
            break;
        };
        match commit(&change) {
            Ok(entry) => {
                book.set(change.staff_id(), change.date(), entry);
                outcome.flips += 1;
                status = week_status(ctx, book, week);
            }
            Err(e) => {
                log::warn!("Week {}: flip on {} failed: {e}", week.start, change.date());
                outcome.failed += 1;
                outcome.failures.push((change.date(), e));
                break;
            }
        }
    }

    outcome.final_off = status.actual_off;
    if !outcome.converged() {
        log::debug!(
            "Week {}: OFF {} of target {} after {} flip(s)",
            week.start,
            outcome.final_off,
            outcome.off_target,
            outcome.flips
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calendar::{dates_between, weeks_intersecting},
        context::fixture::{d, staff, ContextBuilder},
    };

    /// March 2–8 2025 (Sun–Sat) with a doctor Monday to Saturday.
    fn week_context(staff_ids: &[&str]) -> (RunContext, Week) {
        let mut b = ContextBuilder::new(2025, 3).require("hygiene", "hygienist", 1);
        b.staff = staff_ids.iter().map(|id| staff(id, "hygiene", "hygienist")).collect();
        b.doctor_days = Some(dates_between(d(2025, 3, 3), d(2025, 3, 8)).collect());
        let ctx = b.build();
        let week = weeks_intersecting(d(2025, 3, 2), d(2025, 3, 8))
            .into_iter()
            .next()
            .unwrap();
        (ctx, week)
    }

    /// Give `staff_id` `off_days` OFF rows (Monday first) and work elsewhere.
    fn fill(book: &mut AssignmentBook, staff_id: &str, off_days: u32, next_id: &mut i64) {
        for (i, date) in dates_between(d(2025, 3, 3), d(2025, 3, 8)).enumerate() {
            *next_id += 1;
            let shift = if (i as u32) < off_days {
                ShiftType::Off
            } else {
                ShiftType::Day
            };
            book.set(
                staff_id,
                date,
                BookEntry {
                    assignment_id: *next_id,
                    shift,
                },
            );
        }
    }

    fn fake_commit(next_id: &mut i64) -> impl FnMut(&AssignmentChange) -> RotaResult<BookEntry> + '_ {
        move |change| {
            *next_id += 1;
            Ok(BookEntry {
                assignment_id: *next_id,
                shift: change.new_shift(),
            })
        }
    }

    #[test]
    fn three_flips_close_a_gap_of_three() {
        let ids = ["s1", "s2", "s3", "s4", "s5", "s6"];
        let (ctx, week) = week_context(&ids);
        let mut book = AssignmentBook::default();
        let mut next_id = 0;
        for id in &ids[..3] {
            fill(&mut book, id, 1, &mut next_id);
        }
        for id in &ids[3..] {
            fill(&mut book, id, 2, &mut next_id);
        }
        let status = week_status(&ctx, &book, &week);
        assert_eq!(status.business_days.len(), 6);
        assert_eq!(status.off_target, 12);
        assert_eq!(status.actual_off, 9);

        let mut flipped = Vec::new();
        let outcome = balance_week(&ctx, &mut book, &week, |change| {
            flipped.push(change.clone());
            next_id += 1;
            Ok(BookEntry {
                assignment_id: next_id,
                shift: change.new_shift(),
            })
        });

        assert_eq!(outcome.flips, 3);
        assert_eq!(outcome.iteration_cap, 3);
        assert!(outcome.converged());
        let mut who: Vec<&str> = flipped.iter().map(|c| c.staff_id()).collect();
        who.sort();
        assert_eq!(who, vec!["s1", "s2", "s3"]);
        assert!(flipped.iter().all(|c| c.new_shift() == ShiftType::Off));
        for id in ids {
            assert_eq!(week_work_days(&ctx, &book, id, &week), 4);
        }
    }

    #[test]
    fn surplus_off_is_turned_back_into_work() {
        let ids = ["s1", "s2", "s3", "s4"];
        let (ctx, week) = week_context(&ids);
        let mut book = AssignmentBook::default();
        let mut next_id = 0;
        fill(&mut book, "s1", 3, &mut next_id);
        fill(&mut book, "s2", 3, &mut next_id);
        fill(&mut book, "s3", 2, &mut next_id);
        fill(&mut book, "s4", 2, &mut next_id);
        assert_eq!(week_status(&ctx, &book, &week).gap(), 2);

        let mut ids_seen = 1000;
        let outcome = balance_week(&ctx, &mut book, &week, fake_commit(&mut ids_seen));
        assert_eq!(outcome.flips, 2);
        assert!(outcome.converged());
        assert_eq!(week_work_days(&ctx, &book, "s1", &week), 4);
        assert_eq!(week_work_days(&ctx, &book, "s2", &week), 4);
    }

    #[test]
    fn stops_when_nobody_is_over_target() {
        let ids = ["s1", "s2"];
        let (mut ctx, week) = week_context(&ids);
        for s in &mut ctx.staff {
            s.target_weekly_workdays = Some(6);
        }
        let mut book = AssignmentBook::default();
        let mut next_id = 0;
        fill(&mut book, "s1", 0, &mut next_id);
        fill(&mut book, "s2", 0, &mut next_id);

        let mut ids_seen = 1000;
        let outcome = balance_week(&ctx, &mut book, &week, fake_commit(&mut ids_seen));
        assert_eq!(outcome.off_target, 4);
        assert_eq!(outcome.flips, 0);
        assert!(!outcome.converged());
    }

    #[test]
    fn confirmed_leave_is_never_turned_into_work() {
        let ids = ["s1"];
        let (mut ctx, week) = week_context(&ids);
        let mut book = AssignmentBook::default();
        let mut next_id = 0;
        fill(&mut book, "s1", 6, &mut next_id);
        for date in dates_between(d(2025, 3, 3), d(2025, 3, 8)) {
            ctx.confirmed_leave.insert(("s1".into(), date));
        }
        let mut ids_seen = 1000;
        let outcome = balance_week(&ctx, &mut book, &week, fake_commit(&mut ids_seen));
        assert_eq!(outcome.initial_off, 6);
        assert_eq!(outcome.flips, 0);
    }

    #[test]
    fn failed_commit_ends_the_week() {
        let ids = ["s1", "s2"];
        let (ctx, week) = week_context(&ids);
        let mut book = AssignmentBook::default();
        let mut next_id = 0;
        fill(&mut book, "s1", 0, &mut next_id);
        fill(&mut book, "s2", 0, &mut next_id);
        let outcome = balance_week(&ctx, &mut book, &week, |change| {
            Err(RotaError::AssignmentNotFound {
                assignment_id: match change {
                    AssignmentChange::Update { assignment_id, .. } => *assignment_id,
                    AssignmentChange::Insert { .. } => -1,
                },
            })
        });
        assert_eq!(outcome.flips, 0);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[test]
    fn clipped_week_scales_targets() {
        let (ctx, _) = week_context(&["s1", "s2"]);
        // Saturday March 1 on its own.
        let clipped = weeks_intersecting(d(2025, 3, 1), d(2025, 3, 8))
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(clipped.days, 1);
        let status = week_status(&ctx, &AssignmentBook::default(), &clipped);
        assert_eq!(status.default_work_days, 1);
        assert_eq!(personal_target(&ctx, &ctx.staff[0], &clipped), 1);
    }
}
