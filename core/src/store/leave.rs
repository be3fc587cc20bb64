use super::{LeaveRow, RotaStore};
use crate::{
    error::{RotaError, RotaResult},
    types::{LeaveId, LeaveStatus, LeaveType},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

impl RotaStore {
    // ── Leave applications ─────────────────────────────────────

    pub fn insert_leave(
        &self,
        staff_id: &str,
        date: NaiveDate,
        leave_type: LeaveType,
        status: LeaveStatus,
    ) -> RotaResult<LeaveId> {
        self.conn.execute(
            "INSERT INTO leave_application (staff_id, date, leave_type, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![staff_id, date, leave_type, status],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_leave(&self, leave_id: LeaveId) -> RotaResult<LeaveRow> {
        self.conn
            .query_row(
                "SELECT leave_id, staff_id, date, leave_type, status
                 FROM leave_application WHERE leave_id = ?1",
                params![leave_id],
                map_leave_row,
            )
            .optional()?
            .ok_or(RotaError::LeaveNotFound { leave_id })
    }

    pub fn set_leave_status(&self, leave_id: LeaveId, status: LeaveStatus) -> RotaResult<()> {
        self.conn.execute(
            "UPDATE leave_application SET status = ?1 WHERE leave_id = ?2",
            params![status, leave_id],
        )?;
        Ok(())
    }

    /// A staff member's leave in `start..=end` whose status is in `statuses`.
    pub fn staff_leaves(
        &self,
        staff_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        statuses: &[LeaveStatus],
    ) -> RotaResult<Vec<LeaveRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT leave_id, staff_id, date, leave_type, status
             FROM leave_application
             WHERE staff_id = ?1 AND date BETWEEN ?2 AND ?3
             ORDER BY date, leave_id",
        )?;
        let rows = stmt
            .query_map(params![staff_id, start, end], map_leave_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter(|l| statuses.contains(&l.status))
            .collect())
    }

    /// CONFIRMED leave of a clinic's staff in `start..=end`.
    pub fn confirmed_leaves(
        &self,
        clinic_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RotaResult<Vec<LeaveRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.leave_id, l.staff_id, l.date, l.leave_type, l.status
             FROM leave_application l JOIN staff s ON s.staff_id = l.staff_id
             WHERE s.clinic_id = ?1 AND l.status = ?2 AND l.date BETWEEN ?3 AND ?4
             ORDER BY l.date, l.staff_id",
        )?;
        let rows = stmt
            .query_map(
                params![clinic_id, LeaveStatus::Confirmed, start, end],
                map_leave_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_leave_row(row: &Row<'_>) -> rusqlite::Result<LeaveRow> {
    Ok(LeaveRow {
        leave_id: row.get(0)?,
        staff_id: row.get(1)?,
        date: row.get(2)?,
        leave_type: row.get(3)?,
        status: row.get(4)?,
    })
}
