use super::RotaStore;
use crate::{
    error::RotaResult,
    event::{RunEvent, RunEventEntry},
    types::ScheduleId,
};
use rusqlite::params;

impl RotaStore {
    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(
        &self,
        run_id: &str,
        schedule_id: Option<ScheduleId>,
        event: &RunEvent,
    ) -> RotaResult<()> {
        self.conn.execute(
            "INSERT INTO run_event (run_id, schedule_id, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                schedule_id,
                event.type_name(),
                serde_json::to_string(event)?,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> RotaResult<Vec<RunEventEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, schedule_id, event_type, payload
             FROM run_event WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(RunEventEntry {
                    id: Some(row.get(0)?),
                    run_id: row.get(1)?,
                    schedule_id: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, run_id: &str, event_type: &str) -> RotaResult<i64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM run_event WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}
