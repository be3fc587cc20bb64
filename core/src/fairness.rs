//! Fairness ledger and leave quota calculator.
//!
//! For a dimension and an eligibility period:
//!   D        = slot-unit demand for the staff member's pool
//!   base     = D / N            (N = active staff in the pool)
//!   adjusted = max(0, floor(base + cumulative_deviation))
//!   max_off  = D - adjusted
//!   used     = slot units already consumed by confirmed/pending leave
//!
//! A request is approvable iff `used + requested <= max_off` for every
//! dimension its date triggers. The floor is part of the contract: the
//! same inputs must always produce the same allowance.

use crate::{
    requirement::DemandCalendar,
    types::{Dimension, EntityId, PoolKey},
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// Read view of every staff member's cumulative deviation.
/// Positive = under-worked relative to the department, negative = over-worked.
#[derive(Debug, Clone, Default)]
pub struct FairnessLedger {
    deviations: HashMap<(EntityId, Dimension), f64>,
}

impl FairnessLedger {
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (EntityId, Dimension, f64)>,
    {
        Self {
            deviations: rows.into_iter().map(|(s, d, v)| ((s, d), v)).collect(),
        }
    }

    /// Missing entries read as zero (a new hire starts level).
    pub fn deviation(&self, staff_id: &str, dimension: Dimension) -> f64 {
        self.deviations
            .get(&(staff_id.to_string(), dimension))
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaInput {
    pub demand_slots: u32,
    pub pool_size: u32,
    pub cumulative_deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quota {
    pub demand_slots: u32,
    pub base_requirement: f64,
    pub adjusted_requirement: u32,
    pub max_allowed_off_slots: u32,
}

/// Allowance for one dimension. An empty pool yields no allowance.
pub fn compute_quota(input: QuotaInput) -> Quota {
    if input.pool_size == 0 {
        return Quota {
            demand_slots: input.demand_slots,
            base_requirement: 0.0,
            adjusted_requirement: input.demand_slots,
            max_allowed_off_slots: 0,
        };
    }
    let base = input.demand_slots as f64 / input.pool_size as f64;
    let adjusted = (base + input.cumulative_deviation).floor().max(0.0) as i64;
    let max_off = (input.demand_slots as i64 - adjusted).max(0);
    Quota {
        demand_slots: input.demand_slots,
        base_requirement: base,
        adjusted_requirement: adjusted as u32,
        max_allowed_off_slots: max_off as u32,
    }
}

/// Outcome of one dimension's gate for a specific request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaGate {
    pub dimension: Dimension,
    pub quota: Quota,
    pub used_slots: u32,
    pub requested_slots: u32,
    pub passes: bool,
}

impl QuotaGate {
    pub fn remaining(&self) -> i64 {
        self.quota.max_allowed_off_slots as i64 - self.used_slots as i64
    }
}

/// Decision handed to the leave-approval endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveQuotaDecision {
    pub can_approve: bool,
    pub should_hold: bool,
    /// `max_allowed_off_slots` of the binding dimension.
    pub allowed_count: u32,
    /// `used_slots` of the binding dimension.
    pub approved_count: u32,
    pub binding_dimension: Dimension,
    pub gates: Vec<QuotaGate>,
}

/// Who is asking, for which date.
#[derive(Debug, Clone)]
pub struct QuotaRequest<'a> {
    pub staff_id: &'a str,
    pub pool: &'a PoolKey,
    pub date: NaiveDate,
    /// Dates of the staff member's other counted leave in the period.
    pub counted_leave: &'a [NaiveDate],
}

/// Quota evaluation over one eligibility period.
pub struct QuotaCalculator<'a> {
    pub demand: &'a DemandCalendar,
    pub ledger: &'a FairnessLedger,
    pub pool_sizes: &'a HashMap<PoolKey, u32>,
    pub period: (NaiveDate, NaiveDate),
}

impl<'a> QuotaCalculator<'a> {
    pub fn quota(&self, staff_id: &str, pool: &PoolKey, dimension: Dimension) -> Quota {
        let (start, end) = self.period;
        compute_quota(QuotaInput {
            demand_slots: self.demand.demand(pool, dimension, start, end),
            pool_size: self.pool_sizes.get(pool).copied().unwrap_or(0),
            cumulative_deviation: self.ledger.deviation(staff_id, dimension),
        })
    }

    /// Slot units consumed by `dates` in `dimension`, within the period.
    pub fn used_slots(&self, pool: &PoolKey, dimension: Dimension, dates: &[NaiveDate]) -> u32 {
        let (start, end) = self.period;
        dates
            .iter()
            .filter(|d| **d >= start && **d <= end)
            .filter_map(|d| self.demand.day(*d))
            .filter(|day| day.class.triggers(dimension))
            .map(|day| day.requirement.required(pool))
            .sum()
    }

    pub fn decide(&self, req: &QuotaRequest<'_>) -> LeaveQuotaDecision {
        let (start, end) = self.period;
        let in_period = req.date >= start && req.date <= end;
        let pool_size = self.pool_sizes.get(req.pool).copied().unwrap_or(0);

        let dimensions = match self.demand.day(req.date) {
            Some(day) if in_period => day.class.dimensions(),
            _ => vec![Dimension::Total],
        };
        let requested = if in_period {
            self.demand.required(req.date, req.pool)
        } else {
            0
        };

        let gates: Vec<QuotaGate> = dimensions
            .into_iter()
            .map(|dimension| {
                let quota = self.quota(req.staff_id, req.pool, dimension);
                let used = self.used_slots(req.pool, dimension, req.counted_leave);
                QuotaGate {
                    dimension,
                    quota,
                    used_slots: used,
                    requested_slots: requested,
                    passes: used + requested <= quota.max_allowed_off_slots,
                }
            })
            .collect();

        let can_approve = pool_size > 0 && gates.iter().all(|g| g.passes);
        let binding = gates
            .iter()
            .min_by_key(|g| (g.remaining(), g.dimension))
            .cloned();
        let (allowed_count, approved_count, binding_dimension) = binding
            .map(|g| (g.quota.max_allowed_off_slots, g.used_slots, g.dimension))
            .unwrap_or((0, 0, Dimension::Total));

        LeaveQuotaDecision {
            can_approve,
            should_hold: !can_approve,
            allowed_count,
            approved_count,
            binding_dimension,
            gates,
        }
    }
}
