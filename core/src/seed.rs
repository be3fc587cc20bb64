//! Seed data: one clinic's staff, combinations, holidays and monthly
//! doctor rosters, loaded from JSON by the runner or built in code by tests.

use crate::{
    calendar::{dates_between, month_range},
    error::RotaResult,
    requirement::DoctorRoster,
    schedule::ScheduleDesk,
    store::{RotaStore, ScheduleRow, StaffRecord},
};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedStaff {
    pub staff_id: String,
    pub name: String,
    pub department: String,
    pub category: String,
    #[serde(default)]
    pub target_weekly_workdays: Option<u32>,
    #[serde(default = "yes")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRequirement {
    pub department: String,
    pub category: String,
    pub required: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCombination {
    pub doctors: Vec<String>,
    #[serde(default)]
    pub has_night: bool,
    pub requirements: Vec<SeedRequirement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedHoliday {
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRosterDay {
    pub date: NaiveDate,
    pub doctors: Vec<String>,
    #[serde(default)]
    pub has_night: bool,
}

/// A month's roster: `doctors` every open day, `overrides` win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMonth {
    pub year: i32,
    pub month: u32,
    pub doctors: Vec<String>,
    #[serde(default)]
    pub has_night: bool,
    #[serde(default)]
    pub closed_weekdays: Vec<Weekday>,
    #[serde(default)]
    pub overrides: Vec<SeedRosterDay>,
}

impl SeedMonth {
    pub fn roster_days(&self) -> RotaResult<Vec<(NaiveDate, DoctorRoster)>> {
        let (start, end) = month_range(self.year, self.month)?;
        let mut days: BTreeMap<NaiveDate, DoctorRoster> = dates_between(start, end)
            .filter(|d| !self.closed_weekdays.contains(&d.weekday()))
            .map(|d| (d, DoctorRoster::new(self.doctors.iter(), self.has_night)))
            .collect();
        for o in &self.overrides {
            days.insert(o.date, DoctorRoster::new(o.doctors.iter(), o.has_night));
        }
        Ok(days.into_iter().collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedFile {
    pub clinic_id: String,
    pub staff: Vec<SeedStaff>,
    pub combinations: Vec<SeedCombination>,
    #[serde(default)]
    pub holidays: Vec<SeedHoliday>,
    #[serde(default)]
    pub months: Vec<SeedMonth>,
}

impl SeedFile {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write everything in `seed`. Reference data goes in one transaction,
/// then each month's roster through the schedule desk.
pub fn apply_seed(store: &RotaStore, seed: &SeedFile) -> RotaResult<Vec<ScheduleRow>> {
    let clinic_id = seed.clinic_id.as_str();
    store.in_transaction(|store| {
        for s in &seed.staff {
            store.insert_staff(&StaffRecord {
                staff_id: s.staff_id.clone(),
                clinic_id: clinic_id.to_string(),
                name: s.name.clone(),
                department: s.department.clone(),
                category: s.category.clone(),
                target_weekly_workdays: s.target_weekly_workdays,
                active: s.active,
            })?;
        }
        for c in &seed.combinations {
            let roster = DoctorRoster::new(c.doctors.iter(), c.has_night);
            for r in &c.requirements {
                store.upsert_combination(clinic_id, &roster, &r.department, &r.category, r.required)?;
            }
        }
        for h in &seed.holidays {
            store.upsert_holiday(clinic_id, h.date, &h.name)?;
        }
        Ok(())
    })?;

    let desk = ScheduleDesk::new(store);
    let mut schedules = Vec::with_capacity(seed.months.len());
    for m in &seed.months {
        schedules.push(desk.apply_roster(clinic_id, m.year, m.month, &m.roster_days()?)?);
    }
    log::info!(
        "Seeded clinic '{clinic_id}': {} staff, {} combination(s), {} holiday(s), {} month(s)",
        seed.staff.len(),
        seed.combinations.len(),
        seed.holidays.len(),
        schedules.len()
    );
    Ok(schedules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_weekdays_and_overrides() {
        let month = SeedMonth {
            year: 2025,
            month: 3,
            doctors: vec!["LEE".into(), "KIM".into()],
            has_night: false,
            closed_weekdays: vec![Weekday::Sun],
            overrides: vec![SeedRosterDay {
                date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
                doctors: vec!["PARK".into()],
                has_night: true,
            }],
        };
        let days = month.roster_days().unwrap();
        // 31 days, 5 Sundays closed, one Sunday reopened by override.
        assert_eq!(days.len(), 27);
        let (_, sunday) = days
            .iter()
            .find(|(d, _)| *d == NaiveDate::from_ymd_opt(2025, 3, 9).unwrap())
            .unwrap();
        assert_eq!(sunday.key(), "PARK");
        assert!(sunday.has_night);
    }

    #[test]
    fn seed_json_defaults() {
        let json = r#"{
            "clinic_id": "c1",
            "staff": [{"staff_id": "h1", "name": "Ana", "department": "hygiene", "category": "hygienist"}],
            "combinations": [{"doctors": ["KIM"], "requirements": [
                {"department": "hygiene", "category": "hygienist", "required": 1}
            ]}]
        }"#;
        let seed: SeedFile = serde_json::from_str(json).unwrap();
        assert!(seed.staff[0].active);
        assert_eq!(seed.staff[0].target_weekly_workdays, None);
        assert!(seed.months.is_empty());
    }
}
