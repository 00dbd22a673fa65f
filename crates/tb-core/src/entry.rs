//! Time-entry lifecycle state machine.
//!
//! An entry moves running → stopped/unpaid → stopped/paid. The state is a
//! tagged variant so illegal combinations (a running entry with a payment
//! timestamp, a paid entry without an end) are unrepresentable. All
//! transitions validate synchronously and leave the entry untouched on
//! failure; negative intervals are rejected, never clamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EntryId, ProjectId};

/// Lifecycle transition errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The operation is not defined for the entry's current state.
    #[error("cannot {operation} entry {entry}: entry is {state}")]
    InvalidState {
        entry: EntryId,
        operation: &'static str,
        state: &'static str,
    },

    /// A timestamp ordering constraint was violated.
    #[error("entry {entry}: {field} {value} is before {not_before}")]
    InvalidInterval {
        entry: EntryId,
        field: &'static str,
        value: DateTime<Utc>,
        not_before: DateTime<Utc>,
    },
}

/// Payment status of a stopped entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Payment {
    Unpaid,
    Paid { paid_at: DateTime<Utc> },
}

/// Lifecycle state of a time entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EntryState {
    /// Started but not yet stopped; no end timestamp exists.
    Running,
    /// Stopped over a concrete interval.
    Stopped {
        end_at: DateTime<Utc>,
        payment: Payment,
    },
}

impl EntryState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped {
                payment: Payment::Unpaid,
                ..
            } => "stopped/unpaid",
            Self::Stopped {
                payment: Payment::Paid { .. },
                ..
            } => "stopped/paid",
        }
    }
}

/// A worked interval recorded against a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: EntryId,
    pub project_id: ProjectId,
    pub description: String,
    pub start_at: DateTime<Utc>,
    /// Whether the entry participates in billing. Entries created directly
    /// are billable; favorites stamp their own default.
    pub billable: bool,
    state: EntryState,
    version: u64,
}

impl TimeEntry {
    /// Creates a running entry starting at `start_at`.
    #[must_use]
    pub fn start(
        id: EntryId,
        project_id: ProjectId,
        description: impl Into<String>,
        start_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            description: description.into(),
            start_at,
            billable: true,
            state: EntryState::Running,
            version: 0,
        }
    }

    /// Creates a stopped, unpaid entry from an explicit interval.
    pub fn log(
        id: EntryId,
        project_id: ProjectId,
        description: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self, LifecycleError> {
        if end_at < start_at {
            return Err(LifecycleError::InvalidInterval {
                entry: id,
                field: "end",
                value: end_at,
                not_before: start_at,
            });
        }
        Ok(Self {
            id,
            project_id,
            description: description.into(),
            start_at,
            billable: true,
            state: EntryState::Stopped {
                end_at,
                payment: Payment::Unpaid,
            },
            version: 0,
        })
    }

    /// Overrides the billable flag at construction time.
    #[must_use]
    pub const fn with_billable(mut self, billable: bool) -> Self {
        self.billable = billable;
        self
    }

    pub const fn state(&self) -> &EntryState {
        &self.state
    }

    /// Mutation counter for optimistic concurrency checks.
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.state, EntryState::Running)
    }

    pub const fn end_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            EntryState::Running => None,
            EntryState::Stopped { end_at, .. } => Some(end_at),
        }
    }

    pub const fn paid_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            EntryState::Stopped {
                payment: Payment::Paid { paid_at },
                ..
            } => Some(paid_at),
            _ => None,
        }
    }

    pub const fn is_paid(&self) -> bool {
        self.paid_at().is_some()
    }

    /// Whole seconds between start and end; zero while running.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        match self.state {
            EntryState::Running => 0,
            EntryState::Stopped { end_at, .. } => (end_at - self.start_at).num_seconds(),
        }
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Stops a running entry at `at`.
    ///
    /// Returns `true` when a transition happened. Stopping an
    /// already-stopped entry is a no-op returning `false`.
    pub fn stop(&mut self, at: DateTime<Utc>) -> Result<bool, LifecycleError> {
        match self.state {
            EntryState::Stopped { .. } => Ok(false),
            EntryState::Running => {
                if at < self.start_at {
                    return Err(LifecycleError::InvalidInterval {
                        entry: self.id.clone(),
                        field: "end",
                        value: at,
                        not_before: self.start_at,
                    });
                }
                self.state = EntryState::Stopped {
                    end_at: at,
                    payment: Payment::Unpaid,
                };
                self.touch();
                Ok(true)
            }
        }
    }

    /// Marks a stopped, unpaid entry as paid at `paid_at`.
    pub fn mark_paid(&mut self, paid_at: DateTime<Utc>) -> Result<(), LifecycleError> {
        match self.state {
            EntryState::Stopped {
                end_at,
                payment: Payment::Unpaid,
            } => {
                if paid_at < end_at {
                    return Err(LifecycleError::InvalidInterval {
                        entry: self.id.clone(),
                        field: "paid_at",
                        value: paid_at,
                        not_before: end_at,
                    });
                }
                self.state = EntryState::Stopped {
                    end_at,
                    payment: Payment::Paid { paid_at },
                };
                self.touch();
                Ok(())
            }
            _ => Err(LifecycleError::InvalidState {
                entry: self.id.clone(),
                operation: "mark paid",
                state: self.state.name(),
            }),
        }
    }

    /// Reverses a payment, clearing the paid timestamp.
    pub fn mark_unpaid(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            EntryState::Stopped {
                end_at,
                payment: Payment::Paid { .. },
            } => {
                self.state = EntryState::Stopped {
                    end_at,
                    payment: Payment::Unpaid,
                };
                self.touch();
                Ok(())
            }
            _ => Err(LifecycleError::InvalidState {
                entry: self.id.clone(),
                operation: "mark unpaid",
                state: self.state.name(),
            }),
        }
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.touch();
    }

    pub fn set_project(&mut self, project_id: ProjectId) {
        self.project_id = project_id;
        self.touch();
    }

    pub fn set_billable(&mut self, billable: bool) {
        self.billable = billable;
        self.touch();
    }

    /// Moves the recorded interval of a stopped entry.
    ///
    /// Rejected on a running entry. The new interval must keep
    /// `end >= start`, and a paid entry keeps `paid_at >= end`.
    pub fn reschedule(
        &mut self,
        start_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
    ) -> Result<(), LifecycleError> {
        let EntryState::Stopped {
            end_at: current_end,
            payment,
        } = self.state
        else {
            return Err(LifecycleError::InvalidState {
                entry: self.id.clone(),
                operation: "edit interval of",
                state: self.state.name(),
            });
        };

        let new_start = start_at.unwrap_or(self.start_at);
        let new_end = end_at.unwrap_or(current_end);
        if new_end < new_start {
            return Err(LifecycleError::InvalidInterval {
                entry: self.id.clone(),
                field: "end",
                value: new_end,
                not_before: new_start,
            });
        }
        if let Payment::Paid { paid_at } = payment {
            if paid_at < new_end {
                return Err(LifecycleError::InvalidInterval {
                    entry: self.id.clone(),
                    field: "paid_at",
                    value: paid_at,
                    not_before: new_end,
                });
            }
        }

        self.start_at = new_start;
        self.state = EntryState::Stopped {
            end_at: new_end,
            payment,
        };
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::minutes(minutes)
    }

    fn running() -> TimeEntry {
        TimeEntry::start(
            EntryId::new("entry-1").unwrap(),
            ProjectId::new("project-1").unwrap(),
            "CRM sync",
            ts(0),
        )
    }

    #[test]
    fn start_creates_running_entry() {
        let entry = running();
        assert!(entry.is_running());
        assert_eq!(entry.end_at(), None);
        assert_eq!(entry.paid_at(), None);
        assert_eq!(entry.duration_secs(), 0);
        assert_eq!(entry.version(), 0);
    }

    #[test]
    fn log_creates_stopped_unpaid_entry() {
        let entry = TimeEntry::log(
            EntryId::new("entry-1").unwrap(),
            ProjectId::new("project-1").unwrap(),
            "Meeting",
            ts(0),
            ts(90),
        )
        .unwrap();
        assert!(!entry.is_running());
        assert!(!entry.is_paid());
        assert_eq!(entry.duration_secs(), 90 * 60);
    }

    #[test]
    fn log_rejects_inverted_interval() {
        let result = TimeEntry::log(
            EntryId::new("entry-1").unwrap(),
            ProjectId::new("project-1").unwrap(),
            "Meeting",
            ts(10),
            ts(5),
        );
        assert!(matches!(
            result,
            Err(LifecycleError::InvalidInterval { field: "end", .. })
        ));
    }

    #[test]
    fn stop_derives_whole_second_duration() {
        let mut entry = running();
        let stopped = entry.stop(ts(90) + Duration::milliseconds(700)).unwrap();
        assert!(stopped);
        // Sub-second remainder is floored away.
        assert_eq!(entry.duration_secs(), 90 * 60);
        assert!(!entry.is_running());
        assert_eq!(entry.version(), 1);
    }

    #[test]
    fn stop_before_start_fails_and_leaves_entry_unchanged() {
        let mut entry = running();
        let err = entry.stop(ts(0) - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidInterval { .. }));
        assert!(entry.is_running());
        assert_eq!(entry.version(), 0);
    }

    #[test]
    fn stop_at_start_yields_zero_duration() {
        let mut entry = running();
        entry.stop(ts(0)).unwrap();
        assert_eq!(entry.duration_secs(), 0);
    }

    #[test]
    fn stop_is_idempotent_on_stopped_entry() {
        let mut entry = running();
        entry.stop(ts(30)).unwrap();
        let version = entry.version();

        let transitioned = entry.stop(ts(45)).unwrap();
        assert!(!transitioned);
        assert_eq!(entry.end_at(), Some(ts(30)));
        assert_eq!(entry.version(), version);
    }

    #[test]
    fn running_iff_no_end_timestamp() {
        let mut entry = running();
        assert_eq!(entry.is_running(), entry.end_at().is_none());
        entry.stop(ts(10)).unwrap();
        assert_eq!(entry.is_running(), entry.end_at().is_none());
    }

    #[test]
    fn mark_paid_requires_stopped_unpaid() {
        let mut entry = running();
        let err = entry.mark_paid(ts(10)).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState {
                state: "running",
                ..
            }
        ));

        entry.stop(ts(30)).unwrap();
        entry.mark_paid(ts(30)).unwrap();
        assert_eq!(entry.paid_at(), Some(ts(30)));

        // Already paid: strict failure, not a silent overwrite.
        let err = entry.mark_paid(ts(60)).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState {
                state: "stopped/paid",
                ..
            }
        ));
        assert_eq!(entry.paid_at(), Some(ts(30)));
    }

    #[test]
    fn mark_paid_before_end_fails() {
        let mut entry = running();
        entry.stop(ts(30)).unwrap();
        let err = entry.mark_paid(ts(29)).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidInterval {
                field: "paid_at",
                ..
            }
        ));
        assert!(!entry.is_paid());
    }

    #[test]
    fn mark_unpaid_round_trip_restores_entry() {
        let mut entry = running();
        entry.stop(ts(30)).unwrap();
        let before = entry.clone();

        entry.mark_paid(ts(45)).unwrap();
        entry.mark_unpaid().unwrap();

        assert_eq!(entry.paid_at(), None);
        assert_eq!(entry.state(), before.state());
        assert_eq!(entry.description, before.description);
        assert_eq!(entry.start_at, before.start_at);
        assert_eq!(entry.duration_secs(), before.duration_secs());
    }

    #[test]
    fn mark_unpaid_requires_paid_state() {
        let mut entry = running();
        assert!(matches!(
            entry.mark_unpaid(),
            Err(LifecycleError::InvalidState { .. })
        ));
        entry.stop(ts(30)).unwrap();
        assert!(matches!(
            entry.mark_unpaid(),
            Err(LifecycleError::InvalidState {
                state: "stopped/unpaid",
                ..
            })
        ));
    }

    #[test]
    fn reschedule_rejected_while_running() {
        let mut entry = running();
        let err = entry.reschedule(Some(ts(5)), None).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidState { .. }));
        assert_eq!(entry.start_at, ts(0));
    }

    #[test]
    fn reschedule_recomputes_duration() {
        let mut entry = running();
        entry.stop(ts(60)).unwrap();
        entry.reschedule(Some(ts(15)), Some(ts(45))).unwrap();
        assert_eq!(entry.duration_secs(), 30 * 60);
    }

    #[test]
    fn reschedule_rejects_inverted_interval() {
        let mut entry = running();
        entry.stop(ts(60)).unwrap();
        let err = entry.reschedule(None, Some(ts(-5))).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidInterval { field: "end", .. }
        ));
        assert_eq!(entry.end_at(), Some(ts(60)));
    }

    #[test]
    fn reschedule_keeps_paid_at_after_end() {
        let mut entry = running();
        entry.stop(ts(60)).unwrap();
        entry.mark_paid(ts(60)).unwrap();

        // Pushing the end past the payment timestamp would invert the order.
        let err = entry.reschedule(None, Some(ts(90))).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidInterval {
                field: "paid_at",
                ..
            }
        ));
        // Shrinking the interval is fine.
        entry.reschedule(None, Some(ts(30))).unwrap();
        assert_eq!(entry.duration_secs(), 30 * 60);
    }

    #[test]
    fn entries_are_billable_by_default() {
        let entry = running();
        assert!(entry.billable);

        let entry = running().with_billable(false);
        assert!(!entry.billable);
        assert_eq!(entry.version(), 0);
    }

    #[test]
    fn edits_bump_version() {
        let mut entry = running();
        entry.set_description("Infra maintenance");
        entry.set_project(ProjectId::new("project-2").unwrap());
        assert_eq!(entry.version(), 2);
    }

    #[test]
    fn state_serde_roundtrip() {
        let mut entry = running();
        entry.stop(ts(30)).unwrap();
        entry.mark_paid(ts(40)).unwrap();

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: TimeEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.paid_at(), Some(ts(40)));
    }
}
