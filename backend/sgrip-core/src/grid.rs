// src/grid.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::directory::{Project, ProjectId};
use crate::imputation::{ActivityRef, Category, HourPolicy, HoursError, Imputation, WeekKey};
use crate::week_status::{TransitionError, WeekStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntryError {
    #[error(transparent)]
    Locked(#[from] TransitionError),
    #[error(transparent)]
    Hours(#[from] HoursError),
    #[error("{date} is not part of week {week}")]
    OutsideWeek { date: NaiveDate, week: WeekKey },
    #[error("{date} is not a working day of the grid")]
    NotAWorkday { date: NaiveDate },
    #[error("No grid row for project {project_id} / {category}")]
    UnknownRow {
        project_id: ProjectId,
        category: Category,
    },
    #[error("Project {0} is not available to this employee")]
    ProjectNotVisible(ProjectId),
    #[error("Training {0} does not belong to this employee")]
    ForeignTraining(u32),
}

/// A single cell change, sent to the store on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub activity: ActivityRef,
    pub category: Category,
    pub date: NaiveDate,
    pub hours: Decimal,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub project_id: ProjectId,
    pub project_name: String,
    pub category: Category,
    /// Monday..Friday.
    pub cells: [Decimal; 5],
}

impl GridRow {
    pub fn total(&self) -> Decimal {
        self.cells.iter().copied().sum()
    }
}

/// Hours that have no cell in the grid: weekend dates, trainings, categories without a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffGridEntry {
    pub date: NaiveDate,
    pub activity: ActivityRef,
    pub category: Category,
    pub hours: Decimal,
}

/// The weekly entry matrix: visible projects × grid categories × workdays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeEntryGrid {
    pub week: WeekKey,
    pub status: WeekStatus,
    pub days: [NaiveDate; 5],
    pub rows: Vec<GridRow>,
    pub off_grid: Vec<OffGridEntry>,
    #[serde(skip)]
    policy: HourPolicy,
}

impl TimeEntryGrid {
    pub fn build(
        week: WeekKey,
        projects: &[&Project],
        imputations: &[Imputation],
        status: WeekStatus,
        policy: HourPolicy,
    ) -> Self {
        let days = week.workdays();
        let mut rows: Vec<GridRow> = projects
            .iter()
            .flat_map(|p| {
                Category::GRID.iter().map(move |category| GridRow {
                    project_id: p.id,
                    project_name: p.name.clone(),
                    category: *category,
                    cells: [Decimal::ZERO; 5],
                })
            })
            .collect();
        let mut off_grid = Vec::new();

        for imp in imputations.iter().filter(|i| week.contains(i.date)) {
            let day_index = days.iter().position(|d| *d == imp.date);
            let row = imp.activity.project_id().and_then(|pid| {
                rows.iter_mut()
                    .find(|r| r.project_id == pid && r.category == imp.category)
            });
            match (row, day_index) {
                (Some(row), Some(idx)) => row.cells[idx] += imp.hours,
                _ => off_grid.push(OffGridEntry {
                    date: imp.date,
                    activity: imp.activity,
                    category: imp.category,
                    hours: imp.hours,
                }),
            }
        }

        debug!(
            "Grid built for {}: {} rows, {} off-grid entries",
            week,
            rows.len(),
            off_grid.len()
        );

        Self {
            week,
            status,
            days,
            rows,
            off_grid,
            policy,
        }
    }

    pub fn is_editable(&self) -> bool {
        self.status.is_editable()
    }

    fn row_index(&self, project_id: ProjectId, category: Category) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.project_id == project_id && r.category == category)
    }

    fn day_index(&self, date: NaiveDate) -> Option<usize> {
        self.days.iter().position(|d| *d == date)
    }

    pub fn cell(&self, project_id: ProjectId, category: Category, date: NaiveDate) -> Decimal {
        match (self.row_index(project_id, category), self.day_index(date)) {
            (Some(r), Some(d)) => self.rows[r].cells[d],
            _ => Decimal::ZERO,
        }
    }

    pub fn row_total(&self, project_id: ProjectId, category: Category) -> Decimal {
        self.row_index(project_id, category)
            .map(|r| self.rows[r].total())
            .unwrap_or(Decimal::ZERO)
    }

    /// Everything booked on `date`, grid cells and off-grid entries alike.
    pub fn day_total(&self, date: NaiveDate) -> Decimal {
        let in_grid: Decimal = match self.day_index(date) {
            Some(d) => self.rows.iter().map(|r| r.cells[d]).sum(),
            None => Decimal::ZERO,
        };
        let off: Decimal = self
            .off_grid
            .iter()
            .filter(|e| e.date == date)
            .map(|e| e.hours)
            .sum();
        in_grid + off
    }

    pub fn grand_total(&self) -> Decimal {
        let in_grid: Decimal = self.rows.iter().map(GridRow::total).sum();
        let off: Decimal = self.off_grid.iter().map(|e| e.hours).sum();
        in_grid + off
    }

    /// Validates a cell change locally and applies it. The returned edit is what
    /// gets pushed to the store.
    pub fn set_cell(
        &mut self,
        project_id: ProjectId,
        category: Category,
        date: NaiveDate,
        hours: Decimal,
    ) -> Result<CellEdit, EntryError> {
        if !self.is_editable() {
            warn!(
                "Refusing edit on {} week {}",
                self.status, self.week
            );
            return Err(TransitionError::Locked {
                week: self.week,
                status: self.status,
            }
            .into());
        }
        if !self.week.contains(date) {
            return Err(EntryError::OutsideWeek {
                date,
                week: self.week,
            });
        }
        let d = self
            .day_index(date)
            .ok_or(EntryError::NotAWorkday { date })?;
        let r = self
            .row_index(project_id, category)
            .ok_or(EntryError::UnknownRow {
                project_id,
                category,
            })?;

        self.policy.check_cell(hours)?;
        let other_hours = self.day_total(date) - self.rows[r].cells[d];
        self.policy.check_day(date, other_hours, hours)?;

        self.rows[r].cells[d] = hours;
        Ok(CellEdit {
            activity: ActivityRef::Project(project_id),
            category,
            date,
            hours,
            description: String::new(),
        })
    }
}
