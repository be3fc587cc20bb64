use super::{RotaStore, StaffRecord};
use crate::{error::RotaResult, types::Dimension};
use rusqlite::{params, OptionalExtension, Row};

impl RotaStore {
    // ── Staff ──────────────────────────────────────────────────

    pub fn insert_staff(&self, s: &StaffRecord) -> RotaResult<()> {
        self.conn.execute(
            "INSERT INTO staff (staff_id, clinic_id, name, department, category,
                                target_weekly_workdays, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                s.staff_id,
                s.clinic_id,
                s.name,
                s.department,
                s.category,
                s.target_weekly_workdays,
                s.active,
            ],
        )?;
        Ok(())
    }

    pub fn get_staff(&self, staff_id: &str) -> RotaResult<Option<StaffRecord>> {
        let staff = self
            .conn
            .query_row(
                "SELECT staff_id, clinic_id, name, department, category,
                        target_weekly_workdays, active
                 FROM staff WHERE staff_id = ?1",
                params![staff_id],
                map_staff_row,
            )
            .optional()?;
        Ok(staff)
    }

    /// Active staff of a clinic, ordered by staff id.
    pub fn active_staff(&self, clinic_id: &str) -> RotaResult<Vec<StaffRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT staff_id, clinic_id, name, department, category,
                    target_weekly_workdays, active
             FROM staff WHERE clinic_id = ?1 AND active = 1
             ORDER BY staff_id ASC",
        )?;
        let rows = stmt
            .query_map(params![clinic_id], map_staff_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every staff member of a clinic, active or not, ordered by staff id.
    pub fn clinic_staff(&self, clinic_id: &str) -> RotaResult<Vec<StaffRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT staff_id, clinic_id, name, department, category,
                    target_weekly_workdays, active
             FROM staff WHERE clinic_id = ?1
             ORDER BY staff_id ASC",
        )?;
        let rows = stmt
            .query_map(params![clinic_id], map_staff_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Active staff sharing a (department, category) pool.
    pub fn pool_size(&self, clinic_id: &str, department: &str, category: &str) -> RotaResult<u32> {
        let n: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM staff
             WHERE clinic_id = ?1 AND department = ?2 AND category = ?3 AND active = 1",
            params![clinic_id, department, category],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    // ── Fairness ledger (cumulative) ───────────────────────────

    /// Every cumulative deviation recorded for a clinic's staff.
    pub fn cumulative_deviations(
        &self,
        clinic_id: &str,
    ) -> RotaResult<Vec<(String, Dimension, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.staff_id, f.dimension, f.cumulative_deviation
             FROM staff_fairness f JOIN staff s ON s.staff_id = f.staff_id
             WHERE s.clinic_id = ?1
             ORDER BY f.staff_id, f.dimension",
        )?;
        let rows = stmt
            .query_map(params![clinic_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn cumulative_deviation(&self, staff_id: &str, dimension: Dimension) -> RotaResult<f64> {
        let v: Option<f64> = self
            .conn
            .query_row(
                "SELECT cumulative_deviation FROM staff_fairness
                 WHERE staff_id = ?1 AND dimension = ?2",
                params![staff_id, dimension],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v.unwrap_or(0.0))
    }

    /// Only the snapshot recompute may call this.
    pub(crate) fn set_cumulative_deviation(
        &self,
        staff_id: &str,
        dimension: Dimension,
        value: f64,
    ) -> RotaResult<()> {
        self.conn.execute(
            "INSERT INTO staff_fairness (staff_id, dimension, cumulative_deviation)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (staff_id, dimension)
             DO UPDATE SET cumulative_deviation = excluded.cumulative_deviation",
            params![staff_id, dimension, value],
        )?;
        Ok(())
    }
}

fn map_staff_row(row: &Row<'_>) -> rusqlite::Result<StaffRecord> {
    Ok(StaffRecord {
        staff_id: row.get(0)?,
        clinic_id: row.get(1)?,
        name: row.get(2)?,
        department: row.get(3)?,
        category: row.get(4)?,
        target_weekly_workdays: row.get(5)?,
        active: row.get(6)?,
    })
}
