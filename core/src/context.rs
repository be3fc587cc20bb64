//! Read-only lookup tables for one run, plus the in-memory assignment book.
//!
//! Everything the phases consult (staff pools, per-day demand, holidays,
//! confirmed leave, the fairness ledger, tie-break keys) is loaded once up
//! front. Phases are then pure functions of (context, book) that return
//! the changes for one unit; the engine commits each unit and folds the
//! result back into the book.

use crate::{
    calendar::{dates_between, month_range, HolidayCalendar},
    config::{EngineConfig, RotaConfig},
    error::RotaResult,
    fairness::FairnessLedger,
    requirement::{DemandCalendar, RequirementTable},
    rng::{PhaseSlot, TieBreaker},
    store::{AssignmentRow, RotaStore, ScheduleRow, StaffRecord},
    types::{AssignmentId, EntityId, PoolKey, ShiftType},
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Demand and holidays for a schedule over a date range.
pub struct DemandLoad {
    pub demand: DemandCalendar,
    pub holidays: HolidayCalendar,
    /// Dates whose roster matched no Combination.
    pub warnings: Vec<(NaiveDate, String)>,
}

pub fn load_demand(
    store: &RotaStore,
    schedule: &ScheduleRow,
    start: NaiveDate,
    end: NaiveDate,
) -> RotaResult<DemandLoad> {
    let table = RequirementTable::from_rows(&store.combinations(&schedule.clinic_id)?);
    let rosters = store.day_slots(schedule.schedule_id)?;
    // One day either side so holiday adjacency is right at the range edges.
    let holiday_start = start.pred_opt().unwrap_or(start);
    let holiday_end = end.succ_opt().unwrap_or(end);
    let holidays = HolidayCalendar::new(
        store
            .holidays(&schedule.clinic_id, holiday_start, holiday_end)?
            .into_iter()
            .map(|h| (h.date, h.name)),
    );
    let (demand, warnings) = DemandCalendar::build(start, end, &rosters, &holidays, &table);
    Ok(DemandLoad {
        demand,
        holidays,
        warnings,
    })
}

// ── Assignment book ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookEntry {
    pub assignment_id: AssignmentId,
    pub shift: ShiftType,
}

/// One planned write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentChange {
    Insert {
        staff_id: EntityId,
        date: NaiveDate,
        shift: ShiftType,
    },
    Update {
        assignment_id: AssignmentId,
        staff_id: EntityId,
        date: NaiveDate,
        from: ShiftType,
        to: ShiftType,
    },
}

impl AssignmentChange {
    pub fn staff_id(&self) -> &str {
        match self {
            AssignmentChange::Insert { staff_id, .. } | AssignmentChange::Update { staff_id, .. } => {
                staff_id
            }
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            AssignmentChange::Insert { date, .. } | AssignmentChange::Update { date, .. } => *date,
        }
    }

    pub fn new_shift(&self) -> ShiftType {
        match self {
            AssignmentChange::Insert { shift, .. } => *shift,
            AssignmentChange::Update { to, .. } => *to,
        }
    }
}

/// Current assignments, one entry per (date, staff).
#[derive(Debug, Clone, Default)]
pub struct AssignmentBook {
    entries: BTreeMap<(NaiveDate, EntityId), BookEntry>,
}

impl AssignmentBook {
    /// Rows must be ordered by id within a (staff, date) pair; the first
    /// row of a collision is the one the book tracks.
    pub fn from_rows(rows: &[AssignmentRow]) -> Self {
        let mut entries = BTreeMap::new();
        for row in rows {
            entries
                .entry((row.date, row.staff_id.clone()))
                .or_insert(BookEntry {
                    assignment_id: row.assignment_id,
                    shift: row.shift_type,
                });
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, staff_id: &str, date: NaiveDate) -> Option<BookEntry> {
        self.entries.get(&(date, staff_id.to_string())).copied()
    }

    pub fn set(&mut self, staff_id: &str, date: NaiveDate, entry: BookEntry) {
        self.entries.insert((date, staff_id.to_string()), entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries on one date, ordered by staff id.
    pub fn on(&self, date: NaiveDate) -> impl Iterator<Item = (&EntityId, &BookEntry)> {
        let next = date.succ_opt().unwrap_or(date);
        self.entries
            .range((date, String::new())..(next, String::new()))
            .filter(move |((d, _), _)| *d == date)
            .map(|((_, s), e)| (s, e))
    }

    pub fn has_any(&self, date: NaiveDate) -> bool {
        self.on(date).next().is_some()
    }

    pub fn off_count(&self, date: NaiveDate) -> u32 {
        self.on(date).filter(|(_, e)| !e.shift.is_work()).count() as u32
    }

    pub fn worked(&self, staff_id: &str, date: NaiveDate) -> bool {
        self.get(staff_id, date).map_or(false, |e| e.shift.is_work())
    }

    /// Days worked in `start..=end`.
    pub fn work_days(&self, staff_id: &str, start: NaiveDate, end: NaiveDate) -> u32 {
        dates_between(start, end)
            .filter(|d| self.worked(staff_id, *d))
            .count() as u32
    }

    /// Length of the work run ending the day before `date`.
    pub fn consecutive_before(&self, staff_id: &str, date: NaiveDate) -> u32 {
        let mut run = 0;
        let mut cursor = date.pred_opt();
        while let Some(d) = cursor {
            if !self.worked(staff_id, d) {
                break;
            }
            run += 1;
            cursor = d.pred_opt();
        }
        run
    }
}

// ── Run context ────────────────────────────────────────────────────

pub struct RunContext {
    pub schedule: ScheduleRow,
    /// Inclusive date range this run may touch.
    pub range: (NaiveDate, NaiveDate),
    /// Active staff, ordered by id.
    pub staff: Vec<StaffRecord>,
    /// Staff ids per pool, ordered by id.
    pub pools: BTreeMap<PoolKey, Vec<EntityId>>,
    pub demand: DemandCalendar,
    pub holidays: HolidayCalendar,
    pub confirmed_leave: HashSet<(EntityId, NaiveDate)>,
    pub ledger: FairnessLedger,
    pub fill_keys: HashMap<EntityId, u64>,
    pub balance_keys: HashMap<EntityId, u64>,
    pub engine: EngineConfig,
}

impl RunContext {
    /// Load every lookup table for `schedule`; the run may touch `range`.
    /// Demand is resolved for the whole month so month-to-date counts see
    /// days before the range. Returns the context and the configuration
    /// warnings found inside the range.
    pub fn load(
        store: &RotaStore,
        schedule: &ScheduleRow,
        range: (NaiveDate, NaiveDate),
        config: &RotaConfig,
    ) -> RotaResult<(Self, Vec<(NaiveDate, String)>)> {
        let (month_start, month_end) = month_range(schedule.year, schedule.month)?;
        let staff = store.active_staff(&schedule.clinic_id)?;
        let DemandLoad {
            demand,
            holidays,
            mut warnings,
        } = load_demand(store, schedule, month_start, month_end)?;
        warnings.retain(|(d, _)| *d >= range.0 && *d <= range.1);
        let confirmed_leave = store
            .confirmed_leaves(&schedule.clinic_id, range.0, range.1)?
            .into_iter()
            .map(|l| (l.staff_id, l.date))
            .collect();
        let ledger = FairnessLedger::from_rows(store.cumulative_deviations(&schedule.clinic_id)?);
        let ctx = Self::assemble(
            schedule.clone(),
            range,
            staff,
            demand,
            holidays,
            confirmed_leave,
            ledger,
            config.engine.clone(),
        );
        Ok((ctx, warnings))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        schedule: ScheduleRow,
        range: (NaiveDate, NaiveDate),
        mut staff: Vec<StaffRecord>,
        demand: DemandCalendar,
        holidays: HolidayCalendar,
        confirmed_leave: HashSet<(EntityId, NaiveDate)>,
        ledger: FairnessLedger,
        engine: EngineConfig,
    ) -> Self {
        staff.retain(|s| s.active);
        staff.sort_by(|a, b| a.staff_id.cmp(&b.staff_id));
        let mut pools: BTreeMap<PoolKey, Vec<EntityId>> = BTreeMap::new();
        for s in &staff {
            pools.entry(s.pool()).or_default().push(s.staff_id.clone());
        }
        let ids: Vec<EntityId> = staff.iter().map(|s| s.staff_id.clone()).collect();
        let seed = engine.tie_break_seed;
        let (year, month) = (schedule.year, schedule.month);
        Self {
            fill_keys: TieBreaker::new(seed, year, month, PhaseSlot::Fill).keys_for(&ids),
            balance_keys: TieBreaker::new(seed, year, month, PhaseSlot::Balance).keys_for(&ids),
            schedule,
            range,
            staff,
            pools,
            demand,
            holidays,
            confirmed_leave,
            ledger,
            engine,
        }
    }

    pub fn staff(&self, staff_id: &str) -> Option<&StaffRecord> {
        self.staff
            .binary_search_by(|s| s.staff_id.as_str().cmp(staff_id))
            .ok()
            .map(|i| &self.staff[i])
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        dates_between(self.range.0, self.range.1)
    }

    pub fn in_range(&self, date: NaiveDate) -> bool {
        date >= self.range.0 && date <= self.range.1
    }

    pub fn is_frozen(&self, date: NaiveDate) -> bool {
        self.schedule.is_frozen(date)
    }

    pub fn on_leave(&self, staff_id: &str, date: NaiveDate) -> bool {
        self.confirmed_leave
            .contains(&(staff_id.to_string(), date))
    }

    /// A day the clinic is open: in range, a doctor is rostered, not a
    /// holiday, not frozen.
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        self.in_range(date)
            && !self.is_frozen(date)
            && !self.holidays.is_holiday(date)
            && self.demand.day(date).map_or(false, |d| d.has_doctor())
    }

    pub fn weekly_target(&self, staff: &StaffRecord) -> u32 {
        staff.weekly_target(self.engine.default_work_days)
    }

    /// First day of the schedule's month (start of "month to date").
    pub fn month_start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.schedule.year, self.schedule.month, 1).unwrap_or(self.range.0)
    }
}
