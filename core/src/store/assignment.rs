use super::{AssignmentRow, RotaStore};
use crate::{
    error::RotaResult,
    types::{AssignmentId, ScheduleId, ShiftType},
};
use chrono::NaiveDate;
use rusqlite::params;

impl RotaStore {
    // ── Staff assignments ──────────────────────────────────────

    /// All rows in `start..=end`, duplicates included, ordered by
    /// (date, staff, id) so the earliest row of a collision comes first.
    pub fn assignments(
        &self,
        schedule_id: ScheduleId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RotaResult<Vec<AssignmentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT assignment_id, schedule_id, staff_id, date, shift_type
             FROM staff_assignment
             WHERE schedule_id = ?1 AND date BETWEEN ?2 AND ?3
             ORDER BY date, staff_id, assignment_id",
        )?;
        let rows = stmt
            .query_map(params![schedule_id, start, end], |row| {
                Ok(AssignmentRow {
                    assignment_id: row.get(0)?,
                    schedule_id: row.get(1)?,
                    staff_id: row.get(2)?,
                    date: row.get(3)?,
                    shift_type: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Plain insert. The engine only calls this for (staff, date) pairs it
    /// knows to be empty; imports may use it freely.
    pub fn insert_assignment(
        &self,
        schedule_id: ScheduleId,
        staff_id: &str,
        date: NaiveDate,
        shift: ShiftType,
    ) -> RotaResult<AssignmentId> {
        self.conn.execute(
            "INSERT INTO staff_assignment (schedule_id, staff_id, date, shift_type)
             VALUES (?1, ?2, ?3, ?4)",
            params![schedule_id, staff_id, date, shift],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_assignment_shift(
        &self,
        assignment_id: AssignmentId,
        shift: ShiftType,
    ) -> RotaResult<usize> {
        let n = self.conn.execute(
            "UPDATE staff_assignment SET shift_type = ?1 WHERE assignment_id = ?2",
            params![shift, assignment_id],
        )?;
        Ok(n)
    }

    pub fn delete_assignment(&self, assignment_id: AssignmentId) -> RotaResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM staff_assignment WHERE assignment_id = ?1",
            params![assignment_id],
        )?;
        Ok(n)
    }

    /// Remove every row in `start..=end`. Returns the number deleted.
    pub fn clear_assignments(
        &self,
        schedule_id: ScheduleId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RotaResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM staff_assignment
             WHERE schedule_id = ?1 AND date BETWEEN ?2 AND ?3",
            params![schedule_id, start, end],
        )?;
        Ok(n)
    }

    /// Turn every DAY/NIGHT row on `date` into OFF. Returns rows changed.
    pub fn force_off_on_date(&self, schedule_id: ScheduleId, date: NaiveDate) -> RotaResult<usize> {
        let n = self.conn.execute(
            "UPDATE staff_assignment SET shift_type = ?1
             WHERE schedule_id = ?2 AND date = ?3 AND shift_type <> ?1",
            params![ShiftType::Off, schedule_id, date],
        )?;
        Ok(n)
    }

    pub fn assignment_count(&self, schedule_id: ScheduleId) -> RotaResult<i64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM staff_assignment WHERE schedule_id = ?1",
            params![schedule_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Number of (staff, date) pairs holding more than one row.
    pub fn duplicate_pair_count(&self, schedule_id: ScheduleId) -> RotaResult<i64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (
                 SELECT staff_id, date FROM staff_assignment
                 WHERE schedule_id = ?1
                 GROUP BY staff_id, date HAVING COUNT(*) > 1
             )",
            params![schedule_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}
