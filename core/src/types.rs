//! Shared primitive types used across the whole rota core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for staff, clinics and doctors.
pub type EntityId = String;

/// Row id of a month schedule.
pub type ScheduleId = i64;

/// Row id of a staff assignment.
pub type AssignmentId = i64;

/// Row id of a leave application.
pub type LeaveId = i64;

/// The canonical run identifier (uuid v4 string).
pub type RunId = String;

/// A staffing pool: (department, category).
pub type PoolKey = (String, String);

/// Text-backed enums share one shape: a fixed set of SCREAMING_SNAKE names
/// stored as TEXT in SQLite and serialized the same way in JSON.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum! {
    /// What a staff member does on a given date.
    pub enum ShiftType {
        Day   => "DAY",
        Night => "NIGHT",
        Off   => "OFF",
    }
}

impl ShiftType {
    pub fn is_work(&self) -> bool {
        !matches!(self, ShiftType::Off)
    }

    /// The work shift for a day whose doctor roster does or does not run a night shift.
    pub fn work_for(has_night: bool) -> Self {
        if has_night {
            ShiftType::Night
        } else {
            ShiftType::Day
        }
    }
}

text_enum! {
    /// Fairness dimensions tracked by the ledger and the quota calculator.
    pub enum Dimension {
        Total           => "TOTAL",
        Night           => "NIGHT",
        Weekend         => "WEEKEND",
        Holiday         => "HOLIDAY",
        HolidayAdjacent => "HOLIDAY_ADJACENT",
    }
}

text_enum! {
    pub enum ScheduleStatus {
        Draft     => "DRAFT",
        Confirmed => "CONFIRMED",
        Deployed  => "DEPLOYED",
    }
}

impl ScheduleStatus {
    /// DRAFT ⇄ CONFIRMED → DEPLOYED. DEPLOYED is terminal.
    pub fn can_transition_to(&self, next: ScheduleStatus) -> bool {
        matches!(
            (self, next),
            (ScheduleStatus::Draft, ScheduleStatus::Confirmed)
                | (ScheduleStatus::Confirmed, ScheduleStatus::Draft)
                | (ScheduleStatus::Confirmed, ScheduleStatus::Deployed)
        )
    }
}

text_enum! {
    pub enum LeaveType {
        Annual => "ANNUAL",
        Off    => "OFF",
    }
}

text_enum! {
    pub enum LeaveStatus {
        Pending   => "PENDING",
        OnHold    => "ON_HOLD",
        Confirmed => "CONFIRMED",
        Rejected  => "REJECTED",
    }
}

impl LeaveStatus {
    /// Statuses that consume quota when sizing a new request.
    pub const COUNTED: &'static [LeaveStatus] = &[LeaveStatus::Confirmed, LeaveStatus::Pending];
}

text_enum! {
    /// Ordered from least to most severe.
    pub enum Severity {
        Info     => "INFO",
        Warning  => "WARNING",
        Error    => "ERROR",
        Critical => "CRITICAL",
    }
}

text_enum! {
    /// Problems the validation pass reports.
    pub enum IssueType {
        SlotShortage        => "SLOT_SHORTAGE",
        SlotExcess          => "SLOT_EXCESS",
        StaffShortage       => "STAFF_SHORTAGE",
        StaffExcess         => "STAFF_EXCESS",
        DuplicateAssignment => "DUPLICATE_ASSIGNMENT",
        CategoryShortage    => "CATEGORY_SHORTAGE",
        LeaveConflict       => "LEAVE_CONFLICT",
    }
}

impl IssueType {
    /// Only these two are ever repaired automatically.
    pub fn is_auto_fixable(&self) -> bool {
        matches!(self, IssueType::DuplicateAssignment | IssueType::LeaveConflict)
    }
}

text_enum! {
    /// How Phase 1 treats days that already carry assignments.
    pub enum AssignMode {
        Smart => "SMART",
        Full  => "FULL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_their_own_names() {
        for d in Dimension::ALL {
            assert_eq!(Dimension::parse(d.as_str()), Some(*d));
        }
        assert_eq!(LeaveStatus::parse("ON_HOLD"), Some(LeaveStatus::OnHold));
        assert_eq!(ShiftType::parse("day"), None);
    }

    #[test]
    fn deployed_is_terminal() {
        for next in ScheduleStatus::ALL {
            assert!(!ScheduleStatus::Deployed.can_transition_to(*next));
        }
        assert!(ScheduleStatus::Confirmed.can_transition_to(ScheduleStatus::Deployed));
        assert!(!ScheduleStatus::Draft.can_transition_to(ScheduleStatus::Deployed));
    }

    #[test]
    fn severity_orders_by_weight() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Warning > Severity::Info);
    }
}
