//! Resolution lifecycle of an episode
//!
//! `unresolved` is the initial state and `resolved` is terminal. The only
//! defined move is `unresolved -> resolved`; resolving an episode that is
//! already resolved is accepted and leaves `resolved_at` untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unresolved,
    Resolved,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unresolved => "unresolved",
            Status::Resolved => "resolved",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unresolved" => Ok(Status::Unresolved),
            "resolved" => Ok(Status::Resolved),
            other => Err(format!(
                "unknown status '{}' (expected 'unresolved' or 'resolved')",
                other
            )),
        }
    }
}

/// Resolution state. `resolved_at` exists only in the `Resolved` variant,
/// so it is present exactly when the status is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Resolution {
    Unresolved,
    Resolved { resolved_at: DateTime<Utc> },
}

impl Resolution {
    /// Rebuild from stored columns; `None` if they disagree
    pub fn from_parts(status: Status, resolved_at: Option<DateTime<Utc>>) -> Option<Self> {
        match (status, resolved_at) {
            (Status::Unresolved, None) => Some(Resolution::Unresolved),
            (Status::Resolved, Some(resolved_at)) => Some(Resolution::Resolved { resolved_at }),
            _ => None,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Resolution::Unresolved => Status::Unresolved,
            Resolution::Resolved { .. } => Status::Resolved,
        }
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Resolution::Unresolved => None,
            Resolution::Resolved { resolved_at } => Some(*resolved_at),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    /// Apply a requested move to `to` at time `now`.
    ///
    /// Returns `None` when the move is not part of the lifecycle
    /// (anything targeting `unresolved`).
    pub fn transition(self, to: Status, now: DateTime<Utc>) -> Option<Transition> {
        let next = match (self, to) {
            (Resolution::Unresolved, Status::Resolved) => Resolution::Resolved { resolved_at: now },
            (resolved @ Resolution::Resolved { .. }, Status::Resolved) => resolved,
            (_, Status::Unresolved) => return None,
        };
        Some(Transition {
            from: self,
            to: next,
        })
    }
}

/// Result of applying a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Resolution,
    pub to: Resolution,
}

impl Transition {
    /// False for an idempotent re-resolve
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_resolve_from_unresolved() {
        let t = Resolution::Unresolved
            .transition(Status::Resolved, at(1))
            .unwrap();
        assert!(t.changed());
        assert_eq!(t.to.status(), Status::Resolved);
        assert_eq!(t.to.resolved_at(), Some(at(1)));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let resolved = Resolution::Resolved { resolved_at: at(1) };
        let t = resolved.transition(Status::Resolved, at(30)).unwrap();
        assert!(!t.changed());
        assert_eq!(t.to.resolved_at(), Some(at(1)));
    }

    #[test]
    fn test_no_transition_back_to_unresolved() {
        let resolved = Resolution::Resolved { resolved_at: at(1) };
        assert_eq!(resolved.transition(Status::Unresolved, at(2)), None);
        assert_eq!(
            Resolution::Unresolved.transition(Status::Unresolved, at(2)),
            None
        );
    }

    #[test]
    fn test_from_parts_enforces_resolved_at() {
        assert_eq!(
            Resolution::from_parts(Status::Unresolved, None),
            Some(Resolution::Unresolved)
        );
        assert_eq!(Resolution::from_parts(Status::Unresolved, Some(at(1))), None);
        assert_eq!(Resolution::from_parts(Status::Resolved, None), None);
        assert!(Resolution::from_parts(Status::Resolved, Some(at(1)))
            .unwrap()
            .is_resolved());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Resolution::Unresolved).unwrap();
        assert_eq!(json, serde_json::json!({"status": "unresolved"}));

        let json = serde_json::to_value(Resolution::Resolved { resolved_at: at(5) }).unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["resolved_at"], "2025-06-01T12:05:00Z");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("resolved".parse::<Status>(), Ok(Status::Resolved));
        assert!("done".parse::<Status>().is_err());
    }
}
