use crate::types::{AssignmentId, LeaveId, LeaveStatus, ScheduleId, ScheduleStatus};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RotaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No schedule for clinic '{clinic_id}' {year}-{month:02}")]
    ScheduleNotFound {
        clinic_id: String,
        year: i32,
        month: u32,
    },

    #[error("Schedule {schedule_id} not found")]
    ScheduleIdNotFound { schedule_id: ScheduleId },

    #[error("Staff '{staff_id}' not found")]
    StaffNotFound { staff_id: String },

    #[error("Assignment {assignment_id} not found")]
    AssignmentNotFound { assignment_id: AssignmentId },

    #[error("Leave application {leave_id} not found")]
    LeaveNotFound { leave_id: LeaveId },

    #[error("Leave application {leave_id} is {status}, expected PENDING or ON_HOLD")]
    LeaveNotOpen { leave_id: LeaveId, status: LeaveStatus },

    #[error("Clinic '{clinic_id}' has no active staff")]
    NoActiveStaff { clinic_id: String },

    #[error("Assignment run already in progress for '{clinic_id}' {year}-{month:02}")]
    RunInProgress {
        clinic_id: String,
        year: i32,
        month: u32,
    },

    #[error("Run lock for '{clinic_id}' {year}-{month:02} was lost to another run")]
    RunLockLost {
        clinic_id: String,
        year: i32,
        month: u32,
    },

    #[error("Schedule cannot move from {from} to {to}")]
    InvalidTransition {
        from: ScheduleStatus,
        to: ScheduleStatus,
    },

    #[error("Schedule {schedule_id} is {status}, expected DEPLOYED")]
    NotDeployed {
        schedule_id: ScheduleId,
        status: ScheduleStatus,
    },

    #[error("Date {date} is inside a deployed (frozen) range")]
    FrozenDate { date: NaiveDate },

    #[error("Date {date} is outside the open leave period of its month")]
    OutsideEligibility { date: NaiveDate },

    #[error("Range {start}..={end} is not inside {year}-{month:02}")]
    RangeOutsideMonth {
        start: NaiveDate,
        end: NaiveDate,
        year: i32,
        month: u32,
    },

    #[error("Invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RotaResult<T> = Result<T, RotaError>;

/// Coarse failure classes used when a failure is converted into a run warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    Configuration,
    Capacity,
    Conflict,
    Concurrency,
    Data,
}

impl RotaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RotaError::RunInProgress { .. } | RotaError::RunLockLost { .. } => {
                ErrorClass::Concurrency
            }
            RotaError::FrozenDate { .. }
            | RotaError::OutsideEligibility { .. }
            | RotaError::InvalidTransition { .. }
            | RotaError::NotDeployed { .. }
            | RotaError::LeaveNotOpen { .. } => ErrorClass::Conflict,
            RotaError::RangeOutsideMonth { .. } | RotaError::InvalidMonth { .. } => {
                ErrorClass::Configuration
            }
            RotaError::NoActiveStaff { .. } => ErrorClass::Capacity,
            _ => ErrorClass::Data,
        }
    }
}
