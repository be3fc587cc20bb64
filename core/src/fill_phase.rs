//! Phase 1: initial fill.
//!
//! RULE: one date is one unit. `plan_day` looks at the context and the
//! current book and returns every row that date needs; it never writes.
//!
//! For each (department, category) slot group on the date, candidates are
//! the active pool members with no row yet and no CONFIRMED leave. They are
//! ranked by `priority_score` (lower works first), then by the seeded fill
//! key, then by staff id. Everyone left without a row afterwards gets OFF.

use crate::{
    calendar::{dates_between, DayClass},
    context::{AssignmentBook, AssignmentChange, RunContext},
    types::{Dimension, EntityId, ShiftType},
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotState {
    Unfilled,
    PartiallyFilled,
    Filled,
}

impl SlotState {
    fn of(assigned: u32, required: u32) -> Self {
        if assigned >= required {
            SlotState::Filled
        } else if assigned == 0 {
            SlotState::Unfilled
        } else {
            SlotState::PartiallyFilled
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotGroupOutcome {
    pub date: NaiveDate,
    pub department: String,
    pub category: String,
    pub required: u32,
    /// Working after this plan, including rows that already existed.
    pub assigned: u32,
    pub state: SlotState,
    pub selected: Vec<EntityId>,
}

impl SlotGroupOutcome {
    pub fn short_by(&self) -> u32 {
        self.required.saturating_sub(self.assigned)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DayPlan {
    pub changes: Vec<AssignmentChange>,
    pub groups: Vec<SlotGroupOutcome>,
}

impl DayPlan {
    pub fn working(&self) -> u32 {
        self.changes.iter().filter(|c| c.new_shift().is_work()).count() as u32
    }

    pub fn off(&self) -> u32 {
        self.changes.iter().filter(|c| !c.new_shift().is_work()).count() as u32
    }

    pub fn shortages(&self) -> impl Iterator<Item = &SlotGroupOutcome> {
        self.groups.iter().filter(|g| g.state != SlotState::Filled)
    }
}

/// Lower is more deserving of the slot.
pub fn priority_score(
    ctx: &RunContext,
    book: &AssignmentBook,
    staff_id: &str,
    date: NaiveDate,
    class: &DayClass,
) -> f64 {
    let w = &ctx.engine.priority;
    let month_start = ctx.month_start();
    let dimension = class.slot_dimension();

    let (mtd_days, mtd_dim) = match date.pred_opt() {
        Some(yesterday) if yesterday >= month_start => {
            dates_between(month_start, yesterday)
                .filter(|d| book.worked(staff_id, *d))
                .fold((0u32, 0u32), |(days, dim), d| {
                    let counts = ctx
                        .demand
                        .day(d)
                        .map_or(dimension == Dimension::Total, |day| {
                            day.class.triggers(dimension)
                        });
                    (days + 1, dim + u32::from(counts))
                })
        }
        _ => (0, 0),
    };
    let run = book.consecutive_before(staff_id, date);

    let mut score = w.assigned_days * f64::from(mtd_days)
        + w.imbalance * (f64::from(mtd_dim) - ctx.ledger.deviation(staff_id, dimension))
        + w.consecutive_days * f64::from(run);
    if run >= ctx.engine.max_consecutive_days {
        score += w.consecutive_penalty;
    }
    score
}

pub fn plan_day(ctx: &RunContext, book: &AssignmentBook, date: NaiveDate) -> DayPlan {
    let mut plan = DayPlan::default();
    let mut taken: HashSet<&str> = HashSet::new();

    if let Some(day) = ctx.demand.day(date) {
        let shift = ShiftType::work_for(day.has_night());
        for (pool, &required) in &day.requirement.counts {
            if required == 0 {
                continue;
            }
            let members: &[EntityId] = ctx.pools.get(pool).map_or(&[], |m| m.as_slice());
            let already = members.iter().filter(|id| book.worked(id, date)).count() as u32;
            let needed = required.saturating_sub(already) as usize;

            let mut candidates: Vec<(f64, u64, &EntityId)> = members
                .iter()
                .filter(|id| {
                    book.get(id, date).is_none()
                        && !ctx.on_leave(id, date)
                        && !taken.contains(id.as_str())
                })
                .map(|id| {
                    (
                        priority_score(ctx, book, id, date, &day.class),
                        ctx.fill_keys.get(id).copied().unwrap_or_default(),
                        id,
                    )
                })
                .collect();
            candidates.sort_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then(a.1.cmp(&b.1))
                    .then_with(|| a.2.cmp(b.2))
            });

            let mut selected = Vec::with_capacity(needed);
            for (_, _, id) in candidates.into_iter().take(needed) {
                taken.insert(id.as_str());
                selected.push(id.clone());
                plan.changes.push(AssignmentChange::Insert {
                    staff_id: id.clone(),
                    date,
                    shift,
                });
            }

            let assigned = already + selected.len() as u32;
            plan.groups.push(SlotGroupOutcome {
                date,
                department: pool.0.clone(),
                category: pool.1.clone(),
                required,
                assigned,
                state: SlotState::of(assigned, required),
                selected,
            });
        }
    }

    for s in &ctx.staff {
        if book.get(&s.staff_id, date).is_none() && !taken.contains(s.staff_id.as_str()) {
            plan.changes.push(AssignmentChange::Insert {
                staff_id: s.staff_id.clone(),
                date,
                shift: ShiftType::Off,
            });
        }
    }
    plan
}
