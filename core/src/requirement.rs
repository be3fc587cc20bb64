//! Slot requirement resolver.
//!
//! A doctor roster (sorted doctor ids + night flag) selects a configured
//! Combination, which says how many staff of each (department, category)
//! the day needs. The lookup table is built once per run; a roster without
//! a matching Combination resolves to zero with a warning instead of
//! failing the run.

use crate::{
    calendar::{dates_between, DayClass, HolidayCalendar},
    types::{Dimension, PoolKey},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A day's realized doctor roster, kept in canonical (sorted, unique) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoctorRoster {
    doctors: Vec<String>,
    pub has_night: bool,
}

impl DoctorRoster {
    pub fn new<I, S>(doctors: I, has_night: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut doctors: Vec<String> = doctors.into_iter().map(Into::into).collect();
        doctors.sort();
        doctors.dedup();
        Self { doctors, has_night }
    }

    /// Rebuild from the stored `doctor_key` column.
    pub fn from_key(key: &str, has_night: bool) -> Self {
        Self::new(key.split(',').filter(|s| !s.is_empty()), has_night)
    }

    pub fn doctors(&self) -> &[String] {
        &self.doctors
    }

    /// Sorted doctor ids joined by `,`.
    pub fn key(&self) -> String {
        self.doctors.join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.doctors.is_empty()
    }
}

/// One configured requirement line of a Combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationRow {
    pub clinic_id: String,
    pub doctor_key: String,
    pub has_night: bool,
    pub department: String,
    pub category: String,
    pub required: u32,
}

/// Required staff per pool for one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub counts: BTreeMap<PoolKey, u32>,
    pub warning: Option<String>,
}

impl Resolution {
    pub fn required(&self, pool: &PoolKey) -> u32 {
        self.counts.get(pool).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }
}

/// Indexed Combination lookup for one clinic.
#[derive(Debug, Clone, Default)]
pub struct RequirementTable {
    by_roster: HashMap<(String, bool), BTreeMap<PoolKey, u32>>,
}

impl RequirementTable {
    pub fn from_rows(rows: &[CombinationRow]) -> Self {
        let mut by_roster: HashMap<(String, bool), BTreeMap<PoolKey, u32>> = HashMap::new();
        for row in rows {
            // Normalize keys written by hand in config files.
            let key = DoctorRoster::from_key(&row.doctor_key, row.has_night).key();
            by_roster
                .entry((key, row.has_night))
                .or_default()
                .insert((row.department.clone(), row.category.clone()), row.required);
        }
        Self { by_roster }
    }

    pub fn len(&self) -> usize {
        self.by_roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_roster.is_empty()
    }

    pub fn resolve(&self, roster: &DoctorRoster) -> Resolution {
        match self.by_roster.get(&(roster.key(), roster.has_night)) {
            Some(counts) => Resolution {
                counts: counts.clone(),
                warning: None,
            },
            None => Resolution {
                counts: BTreeMap::new(),
                warning: Some(format!(
                    "no combination configured for roster [{}] night={}",
                    roster.key(),
                    roster.has_night
                )),
            },
        }
    }
}

/// Resolved demand for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandDay {
    pub date: NaiveDate,
    pub roster: Option<DoctorRoster>,
    pub class: DayClass,
    pub requirement: Resolution,
}

impl DemandDay {
    pub fn has_doctor(&self) -> bool {
        self.roster.as_ref().map_or(false, |r| !r.is_empty())
    }

    pub fn has_night(&self) -> bool {
        self.roster.as_ref().map_or(false, |r| r.has_night)
    }
}

/// Per-date demand over a range, resolved once and queried many times by
/// the engine, the quota calculator, and the validation pass.
#[derive(Debug, Clone, Default)]
pub struct DemandCalendar {
    days: BTreeMap<NaiveDate, DemandDay>,
}

impl DemandCalendar {
    /// Resolve every date in `start..=end`. Dates without a roster require
    /// nobody. Missing combinations are reported once per date.
    pub fn build(
        start: NaiveDate,
        end: NaiveDate,
        rosters: &BTreeMap<NaiveDate, DoctorRoster>,
        holidays: &HolidayCalendar,
        table: &RequirementTable,
    ) -> (Self, Vec<(NaiveDate, String)>) {
        let mut days = BTreeMap::new();
        let mut warnings = Vec::new();
        for date in dates_between(start, end) {
            let roster = rosters.get(&date).cloned();
            let requirement = match &roster {
                Some(r) if !r.is_empty() => table.resolve(r),
                _ => Resolution::default(),
            };
            if let Some(w) = &requirement.warning {
                log::warn!("{date}: {w}");
                warnings.push((date, w.clone()));
            }
            let has_night = roster.as_ref().map_or(false, |r| r.has_night);
            days.insert(
                date,
                DemandDay {
                    date,
                    class: DayClass::classify(date, has_night, holidays),
                    roster,
                    requirement,
                },
            );
        }
        (Self { days }, warnings)
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DemandDay> {
        self.days.get(&date)
    }

    pub fn days(&self) -> impl Iterator<Item = &DemandDay> {
        self.days.values()
    }

    pub fn required(&self, date: NaiveDate, pool: &PoolKey) -> u32 {
        self.days
            .get(&date)
            .map_or(0, |d| d.requirement.required(pool))
    }

    /// Slot-unit demand `D` for a pool and dimension over `start..=end`.
    pub fn demand(
        &self,
        pool: &PoolKey,
        dimension: Dimension,
        start: NaiveDate,
        end: NaiveDate,
    ) -> u32 {
        self.days
            .range(start..=end)
            .filter(|(_, d)| d.class.triggers(dimension))
            .map(|(_, d)| d.requirement.required(pool))
            .sum()
    }
}
