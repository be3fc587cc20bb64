use super::{HolidayRow, RotaStore};
use crate::{
    error::RotaResult,
    requirement::{CombinationRow, DoctorRoster},
    types::ScheduleId,
};
use chrono::NaiveDate;
use rusqlite::params;
use std::collections::BTreeMap;

impl RotaStore {
    // ── Combinations ───────────────────────────────────────────

    pub fn upsert_combination(
        &self,
        clinic_id: &str,
        roster: &DoctorRoster,
        department: &str,
        category: &str,
        required: u32,
    ) -> RotaResult<()> {
        self.conn.execute(
            "INSERT INTO combination (clinic_id, doctor_key, has_night, department, category, required)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (clinic_id, doctor_key, has_night, department, category)
             DO UPDATE SET required = excluded.required",
            params![
                clinic_id,
                roster.key(),
                roster.has_night,
                department,
                category,
                required
            ],
        )?;
        Ok(())
    }

    pub fn combinations(&self, clinic_id: &str) -> RotaResult<Vec<CombinationRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT clinic_id, doctor_key, has_night, department, category, required
             FROM combination WHERE clinic_id = ?1
             ORDER BY doctor_key, has_night, department, category",
        )?;
        let rows = stmt
            .query_map(params![clinic_id], |row| {
                Ok(CombinationRow {
                    clinic_id: row.get(0)?,
                    doctor_key: row.get(1)?,
                    has_night: row.get(2)?,
                    department: row.get(3)?,
                    category: row.get(4)?,
                    required: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Doctor day slots ───────────────────────────────────────

    pub fn upsert_day_slot(
        &self,
        schedule_id: ScheduleId,
        date: NaiveDate,
        roster: &DoctorRoster,
    ) -> RotaResult<()> {
        self.conn.execute(
            "INSERT INTO doctor_day_slot (schedule_id, date, doctor_key, has_night)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (schedule_id, date)
             DO UPDATE SET doctor_key = excluded.doctor_key, has_night = excluded.has_night",
            params![schedule_id, date, roster.key(), roster.has_night],
        )?;
        Ok(())
    }

    pub fn day_slots(&self, schedule_id: ScheduleId) -> RotaResult<BTreeMap<NaiveDate, DoctorRoster>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, doctor_key, has_night FROM doctor_day_slot
             WHERE schedule_id = ?1 ORDER BY date",
        )?;
        let rows = stmt
            .query_map(params![schedule_id], |row| {
                let date: NaiveDate = row.get(0)?;
                let key: String = row.get(1)?;
                let has_night: bool = row.get(2)?;
                Ok((date, DoctorRoster::from_key(&key, has_night)))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    // ── Holidays ───────────────────────────────────────────────

    pub fn upsert_holiday(&self, clinic_id: &str, date: NaiveDate, name: &str) -> RotaResult<()> {
        self.conn.execute(
            "INSERT INTO holiday (clinic_id, date, name) VALUES (?1, ?2, ?3)
             ON CONFLICT (clinic_id, date) DO UPDATE SET name = excluded.name",
            params![clinic_id, date, name],
        )?;
        Ok(())
    }

    /// Holidays in `start..=end`, ascending by date.
    pub fn holidays(
        &self,
        clinic_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RotaResult<Vec<HolidayRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT clinic_id, date, name FROM holiday
             WHERE clinic_id = ?1 AND date BETWEEN ?2 AND ?3
             ORDER BY date",
        )?;
        let rows = stmt
            .query_map(params![clinic_id, start, end], |row| {
                Ok(HolidayRow {
                    clinic_id: row.get(0)?,
                    date: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
