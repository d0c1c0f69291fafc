//! Three-valued convergence status.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

/// Outcome of a computation or a convergence check.
///
/// Statuses combine following Kleene's strong three-valued logic, reading
/// `Converged` as true, `Failed` as false and `Pending` as unknown:
///
/// | `&`       | Converged | Pending | Failed |
/// |-----------|-----------|---------|--------|
/// | Converged | Converged | Pending | Failed |
/// | Pending   | Pending   | Pending | Failed |
/// | Failed    | Failed    | Failed  | Failed |
///
/// `|` is the dual (Converged dominates) and `!` swaps Converged and Failed,
/// leaving Pending fixed. In particular `Failed & Pending == Failed`: a failed
/// partial result poisons any merge it takes part in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No decision yet.
    #[default]
    Pending,
    /// The computation has converged.
    Converged,
    /// The computation failed.
    Failed,
}

impl Status {
    /// Whether the status is [`Status::Converged`].
    pub fn is_converged(self) -> bool {
        self == Status::Converged
    }

    /// Whether the status ends a computation (converged or failed).
    pub fn is_terminal(self) -> bool {
        self != Status::Pending
    }

    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Converged => "converged",
            Status::Failed => "failed",
        }
    }
}

impl BitAnd for Status {
    type Output = Status;

    fn bitand(self, rhs: Status) -> Status {
        match (self, rhs) {
            (Status::Failed, _) | (_, Status::Failed) => Status::Failed,
            (Status::Pending, _) | (_, Status::Pending) => Status::Pending,
            _ => Status::Converged,
        }
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        match (self, rhs) {
            (Status::Converged, _) | (_, Status::Converged) => Status::Converged,
            (Status::Pending, _) | (_, Status::Pending) => Status::Pending,
            _ => Status::Failed,
        }
    }
}

impl Not for Status {
    type Output = Status;

    fn not(self) -> Status {
        match self {
            Status::Converged => Status::Failed,
            Status::Failed => Status::Converged,
            Status::Pending => Status::Pending,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
