//! The assignment engine: one run of the three phases for a clinic month.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Claim the (clinic, year, month) run lock, or reject the run.
//!   2. Load the run context (pools, demand, holidays, leave, ledger).
//!   3. FULL mode only: clear the range's unfrozen assignments.
//!   4. Phase 1, initial fill           (one transaction per date)
//!   5. Phase 2, weekly OFF balancing   (one transaction per flip)
//!   6. Phase 3, holiday enforcement    (one transaction per holiday)
//!      The lock's expiry is renewed before each phase; a lost lock aborts.
//!   7. Fairness score, RunCompleted event, release the lock.
//!
//! RULES:
//!   - `run` always returns a `RunSummary`. Run-level preconditions become
//!     `failure`; a failed unit becomes a warning and the run continues.
//!   - Every committed unit appends exactly one event in its transaction.
//!   - Frozen dates are never written.

use crate::{
    balance_phase::balance_week,
    calendar::{month_range, weeks_intersecting},
    config::RotaConfig,
    context::{AssignmentBook, AssignmentChange, BookEntry, RunContext},
    error::{ErrorClass, RotaError, RotaResult},
    event::RunEvent,
    fill_phase::plan_day,
    holiday_phase::{holiday_dates, plan_holiday},
    store::RotaStore,
    types::{AssignMode, EntityId, RunId, ScheduleId, Severity, ShiftType},
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub clinic_id: EntityId,
    pub year: i32,
    pub month: u32,
    pub mode: AssignMode,
    /// None runs the whole month.
    pub range: Option<(NaiveDate, NaiveDate)>,
}

impl RunRequest {
    pub fn month(clinic_id: &str, year: i32, month: u32, mode: AssignMode) -> Self {
        Self {
            clinic_id: clinic_id.to_string(),
            year,
            month,
            mode,
            range: None,
        }
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.range = Some((start, end));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWarning {
    pub class: ErrorClass,
    pub severity: Severity,
    pub date: Option<NaiveDate>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub class: ErrorClass,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseStats {
    pub cleared: usize,
    pub days_filled: u32,
    pub days_skipped: u32,
    pub slot_groups_short: u32,
    pub assignments_written: u32,
    pub off_flips: u32,
    pub weeks_unconverged: u32,
    pub holiday_changes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub clinic_id: EntityId,
    pub year: i32,
    pub month: u32,
    pub mode: AssignMode,
    pub success: bool,
    pub success_count: u32,
    pub failed_count: u32,
    pub warnings: Vec<RunWarning>,
    pub fairness_score: f64,
    pub stats: PhaseStats,
    pub failure: Option<RunFailure>,
}

impl RunSummary {
    fn new(run_id: RunId, req: &RunRequest) -> Self {
        Self {
            run_id,
            clinic_id: req.clinic_id.clone(),
            year: req.year,
            month: req.month,
            mode: req.mode,
            success: true,
            success_count: 0,
            failed_count: 0,
            warnings: Vec::new(),
            fairness_score: 0.0,
            stats: PhaseStats::default(),
            failure: None,
        }
    }

    fn warn(
        &mut self,
        class: ErrorClass,
        severity: Severity,
        date: Option<NaiveDate>,
        message: impl Into<String>,
    ) {
        self.warnings.push(RunWarning {
            class,
            severity,
            date,
            message: message.into(),
        });
    }

    fn unit_failed(&mut self, date: Option<NaiveDate>, err: RotaError) {
        log::warn!("Unit {} failed: {err}", date.map_or("-".to_string(), |d| d.to_string()));
        self.failed_count += 1;
        self.warn(err.class(), Severity::Error, date, err.to_string());
    }

    fn fail(&mut self, err: RotaError) {
        log::error!("Run {} aborted: {err}", self.run_id);
        self.success = false;
        self.failure = Some(RunFailure {
            class: err.class(),
            message: err.to_string(),
        });
    }

    pub fn warnings_of(&self, class: ErrorClass) -> impl Iterator<Item = &RunWarning> {
        self.warnings.iter().filter(move |w| w.class == class)
    }
}

/// Releases the run lock when the run ends, however it ends.
struct RunLockGuard<'a> {
    store: &'a RotaStore,
    clinic_id: &'a str,
    year: i32,
    month: u32,
    owner: &'a str,
}

impl Drop for RunLockGuard<'_> {
    fn drop(&mut self) {
        match self
            .store
            .release_run_lock(self.clinic_id, self.year, self.month, self.owner)
        {
            Ok(true) => log::debug!("Run lock released by {}", self.owner),
            Ok(false) => log::warn!(
                "Run lock for {} {}-{:02} was no longer held by {}",
                self.clinic_id,
                self.year,
                self.month,
                self.owner
            ),
            Err(e) => log::warn!("Failed to release run lock: {e}"),
        }
    }
}

pub struct AssignmentEngine<'a> {
    store: &'a RotaStore,
    config: &'a RotaConfig,
}

impl<'a> AssignmentEngine<'a> {
    pub fn new(store: &'a RotaStore, config: &'a RotaConfig) -> Self {
        Self { store, config }
    }

    pub fn run(&self, req: &RunRequest) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        let mut summary = RunSummary::new(run_id.clone(), req);

        let now = Utc::now().timestamp();
        match self.store.try_acquire_run_lock(
            &req.clinic_id,
            req.year,
            req.month,
            &run_id,
            now,
            self.config.engine.lock_ttl_seconds,
        ) {
            Ok(true) => {}
            Ok(false) => {
                summary.fail(RotaError::RunInProgress {
                    clinic_id: req.clinic_id.clone(),
                    year: req.year,
                    month: req.month,
                });
                return summary;
            }
            Err(e) => {
                summary.fail(e);
                return summary;
            }
        }
        let _guard = RunLockGuard {
            store: self.store,
            clinic_id: &req.clinic_id,
            year: req.year,
            month: req.month,
            owner: &run_id,
        };

        log::info!(
            "Run {run_id}: {} {}-{:02} ({})",
            req.clinic_id,
            req.year,
            req.month,
            req.mode
        );
        if let Err(e) = self.execute(req, &mut summary) {
            summary.fail(e);
        } else {
            log::info!(
                "Run {run_id} done: {} unit(s) ok, {} failed, {} warning(s), fairness {:.1}",
                summary.success_count,
                summary.failed_count,
                summary.warnings.len(),
                summary.fairness_score
            );
        }
        summary
    }

    fn execute(&self, req: &RunRequest, summary: &mut RunSummary) -> RotaResult<()> {
        let (month_start, month_end) = month_range(req.year, req.month)?;
        let range = req.range.unwrap_or((month_start, month_end));
        if range.0 > range.1 || range.0 < month_start || range.1 > month_end {
            return Err(RotaError::RangeOutsideMonth {
                start: range.0,
                end: range.1,
                year: req.year,
                month: req.month,
            });
        }
        let schedule = self
            .store
            .find_schedule(&req.clinic_id, req.year, req.month)?
            .ok_or_else(|| RotaError::ScheduleNotFound {
                clinic_id: req.clinic_id.clone(),
                year: req.year,
                month: req.month,
            })?;

        let (ctx, config_warnings) = RunContext::load(self.store, &schedule, range, self.config)?;
        if ctx.staff.is_empty() {
            return Err(RotaError::NoActiveStaff {
                clinic_id: req.clinic_id.clone(),
            });
        }
        for (date, message) in config_warnings {
            summary.warn(ErrorClass::Configuration, Severity::Warning, Some(date), message);
        }

        let schedule_id = schedule.schedule_id;
        let run_id = summary.run_id.clone();
        self.store.append_event(
            &run_id,
            Some(schedule_id),
            &RunEvent::RunStarted {
                run_id: run_id.clone(),
                clinic_id: req.clinic_id.clone(),
                year: req.year,
                month: req.month,
                mode: req.mode,
            },
        )?;

        if req.mode == AssignMode::Full {
            self.clear(&ctx, &run_id, summary)?;
        }
        let mut book =
            AssignmentBook::from_rows(&self.store.assignments(schedule_id, month_start, month_end)?);

        self.renew_lock(req, &run_id)?;
        self.fill(&ctx, &mut book, req.mode, &run_id, summary);
        self.renew_lock(req, &run_id)?;
        self.balance(&ctx, &mut book, &run_id, summary);
        self.renew_lock(req, &run_id)?;
        self.enforce_holidays(&ctx, &mut book, &run_id, summary);

        summary.fairness_score = fairness_score(&ctx, &book);
        self.store.append_event(
            &run_id,
            Some(schedule_id),
            &RunEvent::RunCompleted {
                success_count: summary.success_count,
                failed_count: summary.failed_count,
                fairness_score: summary.fairness_score,
            },
        )?;
        Ok(())
    }

    fn renew_lock(&self, req: &RunRequest, run_id: &str) -> RotaResult<()> {
        let renewed = self.store.renew_run_lock(
            &req.clinic_id,
            req.year,
            req.month,
            run_id,
            Utc::now().timestamp(),
            self.config.engine.lock_ttl_seconds,
        )?;
        if !renewed {
            return Err(RotaError::RunLockLost {
                clinic_id: req.clinic_id.clone(),
                year: req.year,
                month: req.month,
            });
        }
        Ok(())
    }

    // ── Clear (FULL mode) ──────────────────────────────────────────

    fn clear(&self, ctx: &RunContext, run_id: &str, summary: &mut RunSummary) -> RotaResult<()> {
        let schedule_id = ctx.schedule.schedule_id;
        for (start, end) in unfrozen_segments(ctx) {
            let removed = self.store.in_transaction(|store| {
                let removed = store.clear_assignments(schedule_id, start, end)?;
                store.append_event(
                    run_id,
                    Some(schedule_id),
                    &RunEvent::AssignmentsCleared {
                        start,
                        end,
                        removed,
                    },
                )?;
                Ok(removed)
            })?;
            log::debug!("Cleared {removed} row(s) in {start}..={end}");
            summary.stats.cleared += removed;
        }
        Ok(())
    }

    // ── Phase 1 ────────────────────────────────────────────────────

    fn fill(
        &self,
        ctx: &RunContext,
        book: &mut AssignmentBook,
        mode: AssignMode,
        run_id: &str,
        summary: &mut RunSummary,
    ) {
        let schedule_id = ctx.schedule.schedule_id;
        for date in ctx.dates() {
            if ctx.is_frozen(date) || (mode == AssignMode::Smart && book.has_any(date)) {
                summary.stats.days_skipped += 1;
                continue;
            }
            let plan = plan_day(ctx, book, date);
            if plan.changes.is_empty() {
                continue;
            }
            let short_slots: u32 = plan.shortages().map(|g| g.short_by()).sum();
            let result = self.store.in_transaction(|store| {
                let written = plan
                    .changes
                    .iter()
                    .map(|change| write_change(store, schedule_id, change))
                    .collect::<RotaResult<Vec<_>>>()?;
                store.append_event(
                    run_id,
                    Some(schedule_id),
                    &RunEvent::DayFilled {
                        date,
                        working: plan.working(),
                        off: plan.off(),
                        short_slots,
                    },
                )?;
                Ok(written)
            });
            match result {
                Ok(written) => {
                    for (change, entry) in plan.changes.iter().zip(written) {
                        book.set(change.staff_id(), date, entry);
                    }
                    summary.success_count += 1;
                    summary.stats.days_filled += 1;
                    summary.stats.assignments_written += plan.changes.len() as u32;
                    for group in plan.shortages() {
                        summary.stats.slot_groups_short += 1;
                        summary.warn(
                            ErrorClass::Capacity,
                            Severity::Critical,
                            Some(date),
                            format!(
                                "{}/{}: {} of {} slot(s) filled",
                                group.department, group.category, group.assigned, group.required
                            ),
                        );
                    }
                }
                Err(e) => summary.unit_failed(Some(date), e),
            }
        }
    }

    // ── Phase 2 ────────────────────────────────────────────────────

    fn balance(
        &self,
        ctx: &RunContext,
        book: &mut AssignmentBook,
        run_id: &str,
        summary: &mut RunSummary,
    ) {
        let schedule_id = ctx.schedule.schedule_id;
        for week in weeks_intersecting(ctx.range.0, ctx.range.1) {
            let outcome = balance_week(ctx, book, &week, |change| {
                self.store.in_transaction(|store| {
                    let entry = write_change(store, schedule_id, change)?;
                    let (from, to) = match change {
                        AssignmentChange::Update { from, to, .. } => (*from, *to),
                        AssignmentChange::Insert { shift, .. } => (ShiftType::Off, *shift),
                    };
                    store.append_event(
                        run_id,
                        Some(schedule_id),
                        &RunEvent::OffFlipped {
                            week_start: week.start,
                            date: change.date(),
                            staff_id: change.staff_id().to_string(),
                            from,
                            to,
                        },
                    )?;
                    Ok(entry)
                })
            });

            summary.success_count += outcome.flips;
            summary.stats.off_flips += outcome.flips;
            let converged = outcome.converged();
            for (date, e) in outcome.failures {
                summary.unit_failed(Some(date), e);
            }
            if !converged {
                summary.stats.weeks_unconverged += 1;
                summary.warn(
                    ErrorClass::Capacity,
                    Severity::Warning,
                    Some(week.start),
                    format!(
                        "Week of {}: {} OFF against a target of {}",
                        week.start, outcome.final_off, outcome.off_target
                    ),
                );
            }
        }
    }

    // ── Phase 3 ────────────────────────────────────────────────────

    fn enforce_holidays(
        &self,
        ctx: &RunContext,
        book: &mut AssignmentBook,
        run_id: &str,
        summary: &mut RunSummary,
    ) {
        let schedule_id = ctx.schedule.schedule_id;
        for (date, name) in holiday_dates(ctx) {
            let planned = plan_holiday(book, date);
            let result = self.store.in_transaction(|store| {
                let changed = store.force_off_on_date(schedule_id, date)?;
                store.append_event(
                    run_id,
                    Some(schedule_id),
                    &RunEvent::HolidayEnforced {
                        date,
                        name: name.clone(),
                        changed,
                    },
                )?;
                Ok(changed)
            });
            match result {
                Ok(changed) => {
                    for change in &planned {
                        if let AssignmentChange::Update { assignment_id, .. } = change {
                            book.set(
                                change.staff_id(),
                                date,
                                BookEntry {
                                    assignment_id: *assignment_id,
                                    shift: ShiftType::Off,
                                },
                            );
                        }
                    }
                    log::debug!("Holiday {date} ({name}): {changed} row(s) set OFF");
                    summary.success_count += 1;
                    summary.stats.holiday_changes += changed;
                }
                Err(e) => summary.unit_failed(Some(date), e),
            }
        }
    }
}

fn write_change(
    store: &RotaStore,
    schedule_id: ScheduleId,
    change: &AssignmentChange,
) -> RotaResult<BookEntry> {
    match change {
        AssignmentChange::Insert {
            staff_id,
            date,
            shift,
        } => Ok(BookEntry {
            assignment_id: store.insert_assignment(schedule_id, staff_id, *date, *shift)?,
            shift: *shift,
        }),
        AssignmentChange::Update {
            assignment_id, to, ..
        } => {
            if store.update_assignment_shift(*assignment_id, *to)? == 0 {
                return Err(RotaError::AssignmentNotFound {
                    assignment_id: *assignment_id,
                });
            }
            Ok(BookEntry {
                assignment_id: *assignment_id,
                shift: *to,
            })
        }
    }
}

/// Maximal runs of unfrozen dates inside the run range.
fn unfrozen_segments(ctx: &RunContext) -> Vec<(NaiveDate, NaiveDate)> {
    let mut segments = Vec::new();
    let mut open: Option<(NaiveDate, NaiveDate)> = None;
    for date in ctx.dates() {
        if ctx.is_frozen(date) {
            segments.extend(open.take());
        } else {
            open = Some(open.map_or((date, date), |(start, _)| (start, date)));
        }
    }
    segments.extend(open);
    segments
}

/// 100 × (1 − mean coefficient of variation of work days per pool),
/// clamped to [0, 100]. Pools of one, or where nobody works, are skipped.
pub fn fairness_score(ctx: &RunContext, book: &AssignmentBook) -> f64 {
    let (start, end) = ctx.range;
    let cvs: Vec<f64> = ctx
        .pools
        .values()
        .filter(|members| members.len() >= 2)
        .filter_map(|members| {
            let days: Vec<f64> = members
                .iter()
                .map(|id| f64::from(book.work_days(id, start, end)))
                .collect();
            let n = days.len() as f64;
            let mean = days.iter().sum::<f64>() / n;
            if mean <= 0.0 {
                return None;
            }
            let variance = days.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
            Some(variance.sqrt() / mean)
        })
        .collect();
    if cvs.is_empty() {
        return 100.0;
    }
    let mean_cv = cvs.iter().sum::<f64>() / cvs.len() as f64;
    (100.0 * (1.0 - mean_cv)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixture::{d, staff, ContextBuilder};

    fn book_with(work: &[(&str, u32)]) -> AssignmentBook {
        let mut book = AssignmentBook::default();
        let mut id = 0;
        for (staff_id, days) in work {
            for day in 1..=*days {
                id += 1;
                book.set(
                    staff_id,
                    d(2025, 3, day),
                    BookEntry {
                        assignment_id: id,
                        shift: ShiftType::Day,
                    },
                );
            }
        }
        book
    }

    fn two_person_pool() -> RunContext {
        let mut b = ContextBuilder::new(2025, 3);
        b.staff = vec![
            staff("a", "hygiene", "hygienist"),
            staff("b", "hygiene", "hygienist"),
        ];
        b.build()
    }

    #[test]
    fn equal_work_scores_100() {
        let ctx = two_person_pool();
        assert_eq!(fairness_score(&ctx, &book_with(&[("a", 10), ("b", 10)])), 100.0);
    }

    #[test]
    fn uneven_work_lowers_the_score() {
        let ctx = two_person_pool();
        // mean 10, stddev 5 → cv 0.5
        let score = fairness_score(&ctx, &book_with(&[("a", 15), ("b", 5)]));
        assert!((score - 50.0).abs() < 1e-9, "score={score}");
        assert_eq!(fairness_score(&ctx, &book_with(&[("a", 20)])), 0.0);
    }

    #[test]
    fn segments_skip_the_frozen_range() {
        let mut b = ContextBuilder::new(2025, 3);
        b.frozen = Some((d(2025, 3, 10), d(2025, 3, 15)));
        let ctx = b.build();
        assert_eq!(
            unfrozen_segments(&ctx),
            vec![
                (d(2025, 3, 1), d(2025, 3, 9)),
                (d(2025, 3, 16), d(2025, 3, 31))
            ]
        );
    }
}
