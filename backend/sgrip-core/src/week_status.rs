// src/week_status.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

use crate::directory::EmployeeId;
use crate::imputation::WeekKey;

// Represents the status of a week's time reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStatus {
    #[default]
    #[serde(alias = "brouillon")]
    Draft,
    #[serde(alias = "soumis")]
    Submitted,
    #[serde(alias = "valide")]
    Validated,
    #[serde(alias = "rejete")]
    Rejected,
}

impl WeekStatus {
    /// Hour cells can only change while the week is a draft.
    pub fn is_editable(&self) -> bool {
        matches!(self, WeekStatus::Draft)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeekStatus::Draft => "draft",
            WeekStatus::Submitted => "submitted",
            WeekStatus::Validated => "validated",
            WeekStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for WeekStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Week {week} has already been submitted (status: {status})")]
    AlreadySubmitted { week: WeekKey, status: WeekStatus },
    #[error("Week {week} has no imputations to submit")]
    EmptyWeek { week: WeekKey },
    #[error("Week {week} is {status}; only submitted weeks can be {action}")]
    NotSubmitted {
        week: WeekKey,
        status: WeekStatus,
        action: &'static str,
    },
    #[error("Week {week} is {status}; only rejected weeks can be reopened")]
    NotRejected { week: WeekKey, status: WeekStatus },
    #[error("Week {week} is {status} and can no longer be edited")]
    Locked { week: WeekKey, status: WeekStatus },
}

/// What a manager decided about a submitted week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    #[serde(alias = "valider")]
    Validate {
        #[serde(default)]
        comment: String,
    },
    #[serde(alias = "rejeter")]
    Reject {
        #[serde(default)]
        comment: String,
    },
}

/// Workflow state of one employee's ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekRecord {
    pub employee_id: EmployeeId,
    pub week: WeekKey,
    pub status: WeekStatus,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decided_by: Option<EmployeeId>,
    #[serde(default)]
    pub comment: String,
}

impl WeekRecord {
    pub fn draft(employee_id: EmployeeId, week: WeekKey) -> Self {
        Self {
            employee_id,
            week,
            status: WeekStatus::Draft,
            submitted_at: None,
            decided_at: None,
            decided_by: None,
            comment: String::new(),
        }
    }

    pub fn ensure_editable(&self) -> Result<(), TransitionError> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(TransitionError::Locked {
                week: self.week,
                status: self.status,
            })
        }
    }

    /// draft → submitted, dropping any earlier manager decision. `imputation_count` is the number of entries in the week.
    pub fn submit(
        &mut self,
        imputation_count: usize,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != WeekStatus::Draft {
            return Err(TransitionError::AlreadySubmitted {
                week: self.week,
                status: self.status,
            });
        }
        if imputation_count == 0 {
            return Err(TransitionError::EmptyWeek { week: self.week });
        }
        self.status = WeekStatus::Submitted;
        self.submitted_at = Some(now);
        // A reopened week carries the previous decision until it is sent again.
        self.decided_at = None;
        self.decided_by = None;
        self.comment.clear();
        info!(
            "Week submitted: Emp={}, Week={}, Entries={}",
            self.employee_id, self.week, imputation_count
        );
        Ok(())
    }

    /// submitted → validated | rejected.
    pub fn decide(
        &mut self,
        decision: &Decision,
        manager_id: EmployeeId,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let (target, action, comment) = match decision {
            Decision::Validate { comment } => (WeekStatus::Validated, "validated", comment),
            Decision::Reject { comment } => (WeekStatus::Rejected, "rejected", comment),
        };
        if self.status != WeekStatus::Submitted {
            return Err(TransitionError::NotSubmitted {
                week: self.week,
                status: self.status,
                action,
            });
        }
        self.status = target;
        self.decided_at = Some(now);
        self.decided_by = Some(manager_id);
        self.comment = comment.clone();
        info!(
            "Week {}: Emp={}, Week={}, Manager={}",
            action, self.employee_id, self.week, manager_id
        );
        Ok(())
    }

    /// rejected → draft, so the employee can correct the week and submit again.
    pub fn reopen(&mut self) -> Result<(), TransitionError> {
        if self.status != WeekStatus::Rejected {
            return Err(TransitionError::NotRejected {
                week: self.week,
                status: self.status,
            });
        }
        self.status = WeekStatus::Draft;
        self.submitted_at = None;
        info!("Week reopened: Emp={}, Week={}", self.employee_id, self.week);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn week() -> WeekKey {
        WeekKey::new(2024, 10).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 17, 0, 0).unwrap()
    }

    #[test]
    fn submit_requires_draft_and_entries() {
        let mut record = WeekRecord::draft(1, week());
        assert_eq!(
            record.submit(0, now()),
            Err(TransitionError::EmptyWeek { week: week() })
        );
        assert_eq!(record.status, WeekStatus::Draft);

        record.submit(3, now()).unwrap();
        assert_eq!(record.status, WeekStatus::Submitted);
        assert_eq!(record.submitted_at, Some(now()));

        assert!(matches!(
            record.submit(3, now()),
            Err(TransitionError::AlreadySubmitted {
                status: WeekStatus::Submitted,
                ..
            })
        ));
    }

    #[test]
    fn only_draft_weeks_are_editable() {
        let mut record = WeekRecord::draft(1, week());
        assert!(record.ensure_editable().is_ok());
        for status in [
            WeekStatus::Submitted,
            WeekStatus::Validated,
            WeekStatus::Rejected,
        ] {
            record.status = status;
            assert_eq!(
                record.ensure_editable(),
                Err(TransitionError::Locked {
                    week: week(),
                    status
                })
            );
        }
    }

    #[test]
    fn manager_decisions_apply_only_to_submitted_weeks() {
        let mut record = WeekRecord::draft(1, week());
        let validate = Decision::Validate {
            comment: String::new(),
        };
        assert!(matches!(
            record.decide(&validate, 10, now()),
            Err(TransitionError::NotSubmitted {
                action: "validated",
                ..
            })
        ));

        record.submit(1, now()).unwrap();
        record.decide(&validate, 10, now()).unwrap();
        assert_eq!(record.status, WeekStatus::Validated);
        assert_eq!(record.decided_by, Some(10));

        // A validated week is final.
        assert!(record
            .decide(
                &Decision::Reject {
                    comment: "late".to_string()
                },
                10,
                now()
            )
            .is_err());
        assert!(record.reopen().is_err());
    }

    #[test]
    fn rejected_week_keeps_comment_and_can_be_reopened() {
        let mut record = WeekRecord::draft(1, week());
        record.submit(2, now()).unwrap();
        record
            .decide(
                &Decision::Reject {
                    comment: "Missing Friday".to_string(),
                },
                10,
                now(),
            )
            .unwrap();
        assert_eq!(record.status, WeekStatus::Rejected);
        assert_eq!(record.comment, "Missing Friday");

        record.reopen().unwrap();
        assert_eq!(record.status, WeekStatus::Draft);
        assert_eq!(record.comment, "Missing Friday");
        assert!(record.ensure_editable().is_ok());
        record.submit(2, now()).unwrap();
        assert_eq!(record.status, WeekStatus::Submitted);
        assert_eq!(record.comment, "");
        assert_eq!(record.decided_by, None);
        assert_eq!(record.decided_at, None);
    }

    #[test]
    fn decision_payload_accepts_original_action_names() {
        let decision: Decision =
            serde_json::from_str(r#"{"action": "rejeter", "comment": "Redo"}"#).unwrap();
        assert_eq!(
            decision,
            Decision::Reject {
                comment: "Redo".to_string()
            }
        );
        let decision: Decision = serde_json::from_str(r#"{"action": "validate"}"#).unwrap();
        assert_eq!(
            decision,
            Decision::Validate {
                comment: String::new()
            }
        );
        let status: WeekStatus = serde_json::from_str("\"soumis\"").unwrap();
        assert_eq!(status, WeekStatus::Submitted);
    }
}
