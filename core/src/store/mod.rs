//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Engine phases, the validator, and the leave desk call store methods;
//! they never execute SQL directly.

use crate::{
    error::RotaResult,
    types::{
        Dimension, EntityId, LeaveId, LeaveStatus, LeaveType, PoolKey, ScheduleId,
        ScheduleStatus, ShiftType, AssignmentId,
    },
};
use chrono::NaiveDate;
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, ToSql, Transaction, TransactionBehavior,
};
use serde::Serialize;
use std::time::Duration;

mod assignment;
mod event;
mod fairness;
mod leave;
mod lock;
mod roster;
mod schedule;
mod staff;

/// How long a writer waits for the database write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RotaStore {
    conn: Connection,
}

impl RotaStore {
    pub fn open(path: &str) -> RotaResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RotaResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RotaResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// IMMEDIATE takes the database write lock up front, so every read made
    /// inside `f` sees a view no other writer can change before commit.
    /// Any error rolls the whole unit back. Must not be nested.
    pub fn in_transaction<T, F>(&self, f: F) -> RotaResult<T>
    where
        F: FnOnce(&Self) -> RotaResult<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }
}

// ── Text-backed enum columns ───────────────────────────────────────

macro_rules! text_column {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    let s = value.as_str()?;
                    <$ty>::parse(s).ok_or_else(|| {
                        FromSqlError::Other(
                            format!("unknown {} value '{s}'", stringify!($ty)).into(),
                        )
                    })
                }
            }
        )+
    };
}

text_column!(ShiftType, Dimension, ScheduleStatus, LeaveType, LeaveStatus);

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffRecord {
    pub staff_id: EntityId,
    pub clinic_id: EntityId,
    pub name: String,
    pub department: String,
    pub category: String,
    /// None = use the engine's default weekly work days.
    pub target_weekly_workdays: Option<u32>,
    pub active: bool,
}

impl StaffRecord {
    pub fn pool(&self) -> PoolKey {
        (self.department.clone(), self.category.clone())
    }

    pub fn weekly_target(&self, default_work_days: u32) -> u32 {
        self.target_weekly_workdays.unwrap_or(default_work_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub schedule_id: ScheduleId,
    pub clinic_id: EntityId,
    pub year: i32,
    pub month: u32,
    pub status: ScheduleStatus,
    pub deployed_start: Option<NaiveDate>,
    pub deployed_end: Option<NaiveDate>,
}

impl ScheduleRow {
    /// The frozen range, once the schedule is DEPLOYED.
    pub fn frozen_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.status, self.deployed_start, self.deployed_end) {
            (ScheduleStatus::Deployed, Some(s), Some(e)) => Some((s, e)),
            _ => None,
        }
    }

    pub fn is_frozen(&self, date: NaiveDate) -> bool {
        self.frozen_range()
            .map_or(false, |(s, e)| date >= s && date <= e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentRow {
    pub assignment_id: AssignmentId,
    pub schedule_id: ScheduleId,
    pub staff_id: EntityId,
    pub date: NaiveDate,
    pub shift_type: ShiftType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveRow {
    pub leave_id: LeaveId,
    pub staff_id: EntityId,
    pub date: NaiveDate,
    pub leave_type: LeaveType,
    pub status: LeaveStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolidayRow {
    pub clinic_id: EntityId,
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRow {
    pub staff_id: EntityId,
    pub year: i32,
    pub month: u32,
    pub dimension: Dimension,
    pub actual: u32,
    pub department_average: f64,
    pub deviation: f64,
    pub cumulative_deviation: f64,
}
