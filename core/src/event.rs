//! Run event log.
//!
//! RULE: every committed unit of work (one filled day, one OFF flip, one
//! enforced holiday, one auto-fix, one recompute, one leave decision)
//! appends exactly one event inside the same transaction as its writes.
//! The log is therefore an exact audit of what reached the database.

use crate::types::{AssignMode, AssignmentId, EntityId, IssueType, LeaveId, LeaveStatus, RunId, ScheduleId, ShiftType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Variants are appended over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    // ── Engine ─────────────────────────────────────
    RunStarted {
        run_id: RunId,
        clinic_id: EntityId,
        year: i32,
        month: u32,
        mode: AssignMode,
    },
    AssignmentsCleared {
        start: NaiveDate,
        end: NaiveDate,
        removed: usize,
    },
    DayFilled {
        date: NaiveDate,
        working: u32,
        off: u32,
        short_slots: u32,
    },
    OffFlipped {
        week_start: NaiveDate,
        date: NaiveDate,
        staff_id: EntityId,
        from: ShiftType,
        to: ShiftType,
    },
    HolidayEnforced {
        date: NaiveDate,
        name: String,
        changed: usize,
    },
    RunCompleted {
        success_count: u32,
        failed_count: u32,
        fairness_score: f64,
    },

    // ── Validation ─────────────────────────────────
    IssueFixed {
        issue_type: IssueType,
        staff_id: EntityId,
        date: NaiveDate,
        removed: Vec<AssignmentId>,
    },

    // ── Fairness ───────────────────────────────────
    SnapshotRecomputed {
        year: i32,
        month: u32,
        staff_count: usize,
    },

    // ── Leave ──────────────────────────────────────
    LeaveDecided {
        leave_id: LeaveId,
        staff_id: EntityId,
        date: NaiveDate,
        status: LeaveStatus,
    },
}

impl RunEvent {
    /// Stable string name used for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::AssignmentsCleared { .. } => "assignments_cleared",
            RunEvent::DayFilled { .. } => "day_filled",
            RunEvent::OffFlipped { .. } => "off_flipped",
            RunEvent::HolidayEnforced { .. } => "holiday_enforced",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::IssueFixed { .. } => "issue_fixed",
            RunEvent::SnapshotRecomputed { .. } => "snapshot_recomputed",
            RunEvent::LeaveDecided { .. } => "leave_decided",
        }
    }
}

/// A persisted event.
#[derive(Debug, Clone)]
pub struct RunEventEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub schedule_id: Option<ScheduleId>,
    pub event_type: String,
    pub payload: String,
}
