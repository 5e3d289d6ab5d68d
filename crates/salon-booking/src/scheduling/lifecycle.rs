//! Appointment status machine and its effect on slot availability.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "checked-in")]
    CheckedIn,
    #[serde(rename = "serving")]
    Serving,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::CheckedIn,
        AppointmentStatus::Serving,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::CheckedIn => "checked-in",
            AppointmentStatus::Serving => "serving",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// An active appointment holds its slot.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Transitions allowed under [`TransitionPolicy::Strict`].
    ///
    /// Staff can step a visit forward, cancel anything not yet completed, and reinstate
    /// a cancellation back to `scheduled`.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (*self, next),
            (Scheduled, CheckedIn)
                | (Scheduled, Serving)
                | (Scheduled, Completed)
                | (Scheduled, Cancelled)
                | (CheckedIn, Serving)
                | (CheckedIn, Completed)
                | (CheckedIn, Cancelled)
                | (CheckedIn, Scheduled)
                | (Serving, Completed)
                | (Serving, Cancelled)
                | (Cancelled, Scheduled)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = BookingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| {
                BookingError::invalid(format!(
                    "Invalid status '{}'. Expected one of: scheduled, checked-in, serving, completed, cancelled",
                    value
                ))
            })
    }
}

/// How status updates are checked against [`AppointmentStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may move to any other.
    #[default]
    Permissive,
    /// Only transitions in the table are accepted.
    Strict,
}

impl TransitionPolicy {
    pub fn check(&self, from: AppointmentStatus, to: AppointmentStatus) -> Result<(), BookingError> {
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::Strict if from.can_transition_to(to) => Ok(()),
            TransitionPolicy::Strict => Err(BookingError::invalid(format!(
                "Cannot change appointment status from '{}' to '{}'",
                from, to
            ))),
        }
    }
}

/// What a status change must do to the referenced slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEffect {
    None,
    Release,
    Reclaim,
}

pub fn slot_effect(from: AppointmentStatus, to: AppointmentStatus) -> SlotEffect {
    match (from.is_active(), to.is_active()) {
        (true, false) => SlotEffect::Release,
        (false, true) => SlotEffect::Reclaim,
        _ => SlotEffect::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn test_parse_round_trips_wire_names() {
        for status in AppointmentStatus::ALL {
            assert_eq!(status.as_str().parse::<AppointmentStatus>().unwrap(), status);
        }
        assert_eq!("checked-in".parse::<AppointmentStatus>().unwrap(), CheckedIn);
    }

    #[test]
    fn test_unknown_status_is_invalid_argument() {
        let err = "no-show".parse::<AppointmentStatus>().unwrap_err();
        assert!(matches!(err, BookingError::InvalidArgument(_)));
        assert!("Cancelled".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&CheckedIn).unwrap(), "\"checked-in\"");
        let parsed: AppointmentStatus = serde_json::from_str("\"serving\"").unwrap();
        assert_eq!(parsed, Serving);
    }

    #[test]
    fn test_slot_effects() {
        assert_eq!(slot_effect(Scheduled, Cancelled), SlotEffect::Release);
        assert_eq!(slot_effect(Serving, Cancelled), SlotEffect::Release);
        assert_eq!(slot_effect(Cancelled, Scheduled), SlotEffect::Reclaim);
        assert_eq!(slot_effect(Cancelled, Completed), SlotEffect::Reclaim);
        assert_eq!(slot_effect(Cancelled, Cancelled), SlotEffect::None);
        assert_eq!(slot_effect(Scheduled, Completed), SlotEffect::None);
    }

    #[test]
    fn test_permissive_policy_accepts_everything() {
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                assert!(TransitionPolicy::Permissive.check(from, to).is_ok());
            }
        }
    }

    #[test]
    fn test_strict_policy_follows_table() {
        let strict = TransitionPolicy::Strict;
        assert!(strict.check(Scheduled, CheckedIn).is_ok());
        assert!(strict.check(Cancelled, Scheduled).is_ok());
        assert!(strict.check(Completed, Completed).is_ok());
        assert!(strict.check(Completed, Scheduled).is_err());
        assert!(strict.check(Completed, Cancelled).is_err());
        assert!(strict.check(Cancelled, Serving).is_err());
    }
}
