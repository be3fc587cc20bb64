use super::RotaStore;
use crate::error::RotaResult;
use rusqlite::{params, OptionalExtension};

impl RotaStore {
    // ── Run lock ───────────────────────────────────────────────

    /// Atomically claim the (clinic, year, month) run lock.
    ///
    /// Succeeds when no lock exists or the existing one expired at or
    /// before `now`. The check and the write are one statement, so two
    /// connections can never both succeed.
    pub fn try_acquire_run_lock(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        owner: &str,
        now: i64,
        ttl_seconds: i64,
    ) -> RotaResult<bool> {
        let changed = self.conn.execute(
            "INSERT INTO run_lock (clinic_id, year, month, owner, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (clinic_id, year, month) DO UPDATE SET
                owner = excluded.owner,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
             WHERE run_lock.expires_at <= excluded.acquired_at",
            params![clinic_id, year, month, owner, now, now + ttl_seconds],
        )?;
        Ok(changed == 1)
    }

    /// Push the lock's expiry to `now + ttl_seconds` if `owner` still holds it.
    pub fn renew_run_lock(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        owner: &str,
        now: i64,
        ttl_seconds: i64,
    ) -> RotaResult<bool> {
        let changed = self.conn.execute(
            "UPDATE run_lock SET expires_at = ?5
             WHERE clinic_id = ?1 AND year = ?2 AND month = ?3 AND owner = ?4",
            params![clinic_id, year, month, owner, now + ttl_seconds],
        )?;
        Ok(changed == 1)
    }

    /// Release the lock if `owner` still holds it.
    pub fn release_run_lock(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        owner: &str,
    ) -> RotaResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM run_lock
             WHERE clinic_id = ?1 AND year = ?2 AND month = ?3 AND owner = ?4",
            params![clinic_id, year, month, owner],
        )?;
        Ok(changed == 1)
    }

    pub fn run_lock_owner(&self, clinic_id: &str, year: i32, month: u32) -> RotaResult<Option<String>> {
        let owner = self
            .conn
            .query_row(
                "SELECT owner FROM run_lock WHERE clinic_id = ?1 AND year = ?2 AND month = ?3",
                params![clinic_id, year, month],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }
}
