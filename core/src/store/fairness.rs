use super::{RotaStore, SnapshotRow};
use crate::{error::RotaResult, types::Dimension};
use rusqlite::params;

impl RotaStore {
    // ── Fairness snapshots ─────────────────────────────────────

    pub(crate) fn upsert_snapshot(&self, s: &SnapshotRow) -> RotaResult<()> {
        self.conn.execute(
            "INSERT INTO fairness_snapshot
             (staff_id, year, month, dimension, actual, department_average,
              deviation, cumulative_deviation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (staff_id, year, month, dimension) DO UPDATE SET
                actual = excluded.actual,
                department_average = excluded.department_average,
                deviation = excluded.deviation,
                cumulative_deviation = excluded.cumulative_deviation",
            params![
                s.staff_id,
                s.year,
                s.month,
                s.dimension,
                s.actual,
                s.department_average,
                s.deviation,
                s.cumulative_deviation,
            ],
        )?;
        Ok(())
    }

    /// Drop a clinic's snapshot rows for one month before they are rebuilt.
    pub(crate) fn clear_month_snapshots(&self, clinic_id: &str, year: i32, month: u32) -> RotaResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM fairness_snapshot
             WHERE year = ?2 AND month = ?3
               AND staff_id IN (SELECT staff_id FROM staff WHERE clinic_id = ?1)",
            params![clinic_id, year, month],
        )?;
        Ok(n)
    }

    /// Sum of a staff member's recorded deviations for months before
    /// `month` in `year`.
    pub fn prior_deviation_sum(
        &self,
        staff_id: &str,
        year: i32,
        month: u32,
        dimension: Dimension,
    ) -> RotaResult<f64> {
        let sum: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(deviation), 0.0) FROM fairness_snapshot
             WHERE staff_id = ?1 AND year = ?2 AND month < ?3 AND dimension = ?4",
            params![staff_id, year, month, dimension],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    /// One staff member's snapshot rows for a month, in dimension order.
    pub fn snapshot_for(&self, staff_id: &str, year: i32, month: u32) -> RotaResult<Vec<SnapshotRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT staff_id, year, month, dimension, actual, department_average,
                    deviation, cumulative_deviation
             FROM fairness_snapshot
             WHERE staff_id = ?1 AND year = ?2 AND month = ?3",
        )?;
        let mut rows = stmt
            .query_map(params![staff_id, year, month], |row| {
                Ok(SnapshotRow {
                    staff_id: row.get(0)?,
                    year: row.get(1)?,
                    month: row.get(2)?,
                    dimension: row.get(3)?,
                    actual: row.get(4)?,
                    department_average: row.get(5)?,
                    deviation: row.get(6)?,
                    cumulative_deviation: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by_key(|r| r.dimension);
        Ok(rows)
    }
}
