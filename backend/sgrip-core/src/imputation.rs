// src/imputation.rs
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::directory::{EmployeeId, ProjectId, TrainingId};

// --- Categories ---

/// Kind of time an imputation records. Only `Project` counts as productive time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[serde(alias = "projet")]
    Project,
    #[serde(alias = "formation")]
    Training,
    #[serde(alias = "conge", alias = "congé")]
    Absence,
    #[serde(alias = "reunion", alias = "réunion", alias = "administratif")]
    Admin,
    #[serde(alias = "autre")]
    Other,
}

impl Category {
    /// Rows offered by the weekly entry grid for every project.
    pub const GRID: [Category; 4] = [
        Category::Project,
        Category::Training,
        Category::Absence,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Project => "project",
            Category::Training => "training",
            Category::Absence => "absence",
            Category::Admin => "admin",
            Category::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Project => "Project",
            Category::Training => "Training",
            Category::Absence => "Absence",
            Category::Admin => "Administrative",
            Category::Other => "Other",
        }
    }

    pub fn is_productive(&self) -> bool {
        matches!(self, Category::Project)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Activity reference ---

/// What the hours were spent on: a project or a training (formation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActivityRef {
    Project(ProjectId),
    Training(TrainingId),
}

impl ActivityRef {
    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            ActivityRef::Project(id) => Some(*id),
            ActivityRef::Training(_) => None,
        }
    }
}

// --- Imputation ---

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImputationKey {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub activity: ActivityRef,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imputation {
    pub id: u64,
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub activity: ActivityRef,
    pub category: Category,
    pub hours: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub validated: bool,
    pub entered_at: DateTime<Utc>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validated_by: Option<EmployeeId>,
}

impl Imputation {
    pub fn key(&self) -> ImputationKey {
        ImputationKey {
            employee_id: self.employee_id,
            date: self.date,
            activity: self.activity,
            category: self.category,
        }
    }

    pub fn week(&self) -> WeekKey {
        WeekKey::containing(self.date)
    }
}

// --- ISO weeks ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeekError {
    #[error("Week {week} does not exist in ISO year {year}")]
    InvalidWeek { year: i32, week: u32 },
}

/// An ISO-8601 week (Monday to Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Result<Self, WeekError> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            .map(|_| Self { year, week })
            .ok_or(WeekError::InvalidWeek { year, week })
    }

    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn monday(&self) -> NaiveDate {
        // Keys are only built through `new` or `containing`, so the week exists.
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn sunday(&self) -> NaiveDate {
        self.monday() + Duration::days(6)
    }

    pub fn dates(&self) -> [NaiveDate; 7] {
        let monday = self.monday();
        std::array::from_fn(|i| monday + Duration::days(i as i64))
    }

    pub fn workdays(&self) -> [NaiveDate; 5] {
        let monday = self.monday();
        std::array::from_fn(|i| monday + Duration::days(i as i64))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        WeekKey::containing(date) == *self
    }

    pub fn previous(&self) -> Self {
        WeekKey::containing(self.monday() - Duration::days(7))
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

// --- Hour policy ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HoursError {
    #[error("Hours cannot be negative (got {hours})")]
    Negative { hours: Decimal },
    #[error("A single entry cannot exceed {max} hours (got {hours})")]
    CellLimitExceeded { hours: Decimal, max: Decimal },
    #[error("Hours must be entered in steps of {step} (got {hours})")]
    NotOnStep { hours: Decimal, step: Decimal },
    #[error("Total for {date} would be {total} hours, above the daily maximum of {max}")]
    DailyLimitExceeded {
        date: NaiveDate,
        total: Decimal,
        max: Decimal,
    },
}

/// Limits applied to every hour value entered in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourPolicy {
    pub step: Decimal,
    pub max_cell_hours: Decimal,
    pub max_daily_hours: Decimal,
}

impl Default for HourPolicy {
    fn default() -> Self {
        Self {
            step: dec!(0.25),
            max_cell_hours: dec!(24),
            max_daily_hours: dec!(24),
        }
    }
}

impl HourPolicy {
    pub fn check_cell(&self, hours: Decimal) -> Result<(), HoursError> {
        if hours.is_sign_negative() && !hours.is_zero() {
            return Err(HoursError::Negative { hours });
        }
        if hours > self.max_cell_hours {
            return Err(HoursError::CellLimitExceeded {
                hours,
                max: self.max_cell_hours,
            });
        }
        if !self.step.is_zero() && !(hours % self.step).is_zero() {
            return Err(HoursError::NotOnStep {
                hours,
                step: self.step,
            });
        }
        Ok(())
    }

    /// `other_hours` is what the employee already booked that day outside the edited cell.
    pub fn check_day(
        &self,
        date: NaiveDate,
        other_hours: Decimal,
        new_hours: Decimal,
    ) -> Result<(), HoursError> {
        let total = other_hours + new_hours;
        if total > self.max_daily_hours {
            return Err(HoursError::DailyLimitExceeded {
                date,
                total,
                max: self.max_daily_hours,
            });
        }
        Ok(())
    }
}
