//! Order status and its state machine.
//!
//! ```text
//! Pending ──> Trial ──> Finished ──> Completed
//!    │          │          │
//!    └──────────┴──────────┴──────> Cancelled
//! ```
//!
//! `Completed` and `Cancelled` are terminal. Entering `Trial`, `Completed` or
//! `Cancelled` stamps the matching date on the order.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a tailoring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "order_status"))]
pub enum OrderStatus {
    #[default]
    Pending,
    Trial,
    Finished,
    Completed,
    Cancelled,
}

/// The order date a status transition stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateField {
    Trial,
    Completion,
    Cancelled,
}

impl std::fmt::Display for DateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Completion => write!(f, "completion"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A status change the state machine does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move an order from {from} to {to}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl OrderStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Trial,
        Self::Finished,
        Self::Completed,
        Self::Cancelled,
    ];

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The date field that must be supplied when entering this status.
    #[must_use]
    pub const fn stamped_date(self) -> Option<DateField> {
        match self {
            Self::Trial => Some(DateField::Trial),
            Self::Completed => Some(DateField::Completion),
            Self::Cancelled => Some(DateField::Cancelled),
            Self::Pending | Self::Finished => None,
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Trial)
            | (Self::Trial, Self::Finished)
            | (Self::Finished, Self::Completed) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Validate a move to `next`, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for any move outside the state machine,
    /// including staying in the same status.
    pub const fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Trial => write!(f, "Trial"),
            Self::Finished => write!(f, "Finished"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use OrderStatus::{Cancelled, Completed, Finished, Pending, Trial};

    #[test]
    fn test_forward_path_is_legal() {
        assert_eq!(Pending.transition(Trial), Ok(Trial));
        assert_eq!(Trial.transition(Finished), Ok(Finished));
        assert_eq!(Finished.transition(Completed), Ok(Completed));
    }

    #[test]
    fn test_cancel_from_any_open_status() {
        for from in [Pending, Trial, Finished] {
            assert!(from.can_transition_to(Cancelled), "{from}");
        }
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_everything_else_is_rejected() {
        let legal = [
            (Pending, Trial),
            (Trial, Finished),
            (Finished, Completed),
            (Pending, Cancelled),
            (Trial, Cancelled),
            (Finished, Cancelled),
        ];
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
        assert_eq!(
            Completed.transition(Trial),
            Err(TransitionError {
                from: Completed,
                to: Trial
            })
        );
    }

    #[test]
    fn test_stamped_dates() {
        assert_eq!(Trial.stamped_date(), Some(DateField::Trial));
        assert_eq!(Completed.stamped_date(), Some(DateField::Completion));
        assert_eq!(Cancelled.stamped_date(), Some(DateField::Cancelled));
        assert_eq!(Finished.stamped_date(), None);
        assert_eq!(Pending.stamped_date(), None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("finished".parse::<OrderStatus>().unwrap(), Finished);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_terminal() {
        assert!(Completed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Finished.is_terminal());
    }
}
