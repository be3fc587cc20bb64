use super::{RotaStore, ScheduleRow};
use crate::{
    error::{RotaError, RotaResult},
    types::{ScheduleId, ScheduleStatus},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

const SCHEDULE_COLUMNS: &str =
    "schedule_id, clinic_id, year, month, status, deployed_start, deployed_end";

impl RotaStore {
    // ── Schedule ───────────────────────────────────────────────

    /// Fetch the month's schedule, creating it as DRAFT if absent.
    pub fn get_or_create_schedule(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
    ) -> RotaResult<ScheduleRow> {
        self.conn.execute(
            "INSERT INTO schedule (clinic_id, year, month, status)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (clinic_id, year, month) DO NOTHING",
            params![clinic_id, year, month, ScheduleStatus::Draft],
        )?;
        self.find_schedule(clinic_id, year, month)?
            .ok_or_else(|| RotaError::ScheduleNotFound {
                clinic_id: clinic_id.to_string(),
                year,
                month,
            })
    }

    pub fn find_schedule(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
    ) -> RotaResult<Option<ScheduleRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM schedule
                     WHERE clinic_id = ?1 AND year = ?2 AND month = ?3"
                ),
                params![clinic_id, year, month],
                map_schedule_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_schedule(&self, schedule_id: ScheduleId) -> RotaResult<ScheduleRow> {
        self.conn
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedule WHERE schedule_id = ?1"),
                params![schedule_id],
                map_schedule_row,
            )
            .optional()?
            .ok_or(RotaError::ScheduleIdNotFound { schedule_id })
    }

    pub fn set_schedule_status(
        &self,
        schedule_id: ScheduleId,
        status: ScheduleStatus,
    ) -> RotaResult<()> {
        self.conn.execute(
            "UPDATE schedule SET status = ?1 WHERE schedule_id = ?2",
            params![status, schedule_id],
        )?;
        Ok(())
    }

    pub fn set_deployed_range(
        &self,
        schedule_id: ScheduleId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RotaResult<()> {
        self.conn.execute(
            "UPDATE schedule SET deployed_start = ?1, deployed_end = ?2 WHERE schedule_id = ?3",
            params![start, end, schedule_id],
        )?;
        Ok(())
    }
}

fn map_schedule_row(row: &Row<'_>) -> rusqlite::Result<ScheduleRow> {
    Ok(ScheduleRow {
        schedule_id: row.get(0)?,
        clinic_id: row.get(1)?,
        year: row.get(2)?,
        month: row.get(3)?,
        status: row.get(4)?,
        deployed_start: row.get(5)?,
        deployed_end: row.get(6)?,
    })
}
