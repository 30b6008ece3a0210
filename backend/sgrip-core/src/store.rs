// src/store.rs
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregation::{self, EmployeeHours, ProjectLoad, Totals, WeekReportData};
use crate::clock::Clock;
use crate::directory::{Directory, Employee, EmployeeId, ProjectId, Role};
use crate::grid::{CellEdit, EntryError, TimeEntryGrid};
use crate::imputation::{
    ActivityRef, Category, HourPolicy, Imputation, ImputationKey, WeekError, WeekKey,
};
use crate::report::TeamReport;
use crate::week_status::{Decision, TransitionError, WeekRecord, WeekStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown employee {0}")]
    UnknownActor(EmployeeId),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Not allowed: {0}")]
    Forbidden(String),
    #[error("Employee {0} does not manage any team")]
    NoTeam(EmployeeId),
    #[error("Start date {from} is after end date {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("Invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error(transparent)]
    Week(#[from] WeekError),
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized form of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub directory: Directory,
    #[serde(default)]
    pub imputations: Vec<Imputation>,
    #[serde(default)]
    pub weeks: Vec<WeekRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekView {
    pub week: WeekKey,
    pub status: WeekStatus,
    pub editable: bool,
    pub comment: String,
    pub dates: [NaiveDate; 7],
    pub imputations: Vec<Imputation>,
    pub grid: TimeEntryGrid,
    pub day_totals: BTreeMap<NaiveDate, Decimal>,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "imputation", rename_all = "snake_case")]
pub enum CellOutcome {
    Saved(Imputation),
    Removed(Imputation),
    Unchanged,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub projects: Vec<ProjectId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub projects: BTreeMap<String, ProjectLoad>,
    pub total_hours: Decimal,
    pub total_value: Decimal,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingWeek {
    pub employee_id: EmployeeId,
    pub employee: String,
    pub week: WeekKey,
    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub total_hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerDashboard {
    pub period: String,
    pub week: WeekKey,
    pub pending_weeks: Vec<PendingWeek>,
    pub load_by_project: BTreeMap<String, ProjectLoad>,
    pub load_by_employee: BTreeMap<EmployeeId, EmployeeHours>,
    pub load_by_category: BTreeMap<Category, Decimal>,
    pub total_value: Decimal,
    pub overdue_projects: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamReportFilter {
    pub project: Option<ProjectId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub employees: usize,
    pub projects: usize,
    pub imputations: usize,
    pub weeks: usize,
    pub pending_weeks: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    directory: Directory,
    imputations: BTreeMap<ImputationKey, Imputation>,
    weeks: HashMap<(EmployeeId, WeekKey), WeekRecord>,
    next_id: u64,
}

impl StoreState {
    fn actor(&self, id: EmployeeId) -> Result<Employee, StoreError> {
        self.directory
            .employee(id)
            .filter(|e| e.active)
            .cloned()
            .ok_or(StoreError::UnknownActor(id))
    }

    fn record(&self, employee_id: EmployeeId, week: WeekKey) -> WeekRecord {
        self.weeks
            .get(&(employee_id, week))
            .cloned()
            .unwrap_or_else(|| WeekRecord::draft(employee_id, week))
    }

    fn week_imputations(&self, employee_id: EmployeeId, week: WeekKey) -> Vec<Imputation> {
        self.imputations
            .values()
            .filter(|i| i.employee_id == employee_id && week.contains(i.date))
            .cloned()
            .collect()
    }

    fn pending_weeks_of(&self, members: &[EmployeeId]) -> Vec<PendingWeek> {
        let mut pending: Vec<PendingWeek> = self
            .weeks
            .values()
            .filter(|r| r.status == WeekStatus::Submitted && members.contains(&r.employee_id))
            .map(|r| PendingWeek {
                employee_id: r.employee_id,
                employee: self.directory.employee_name(r.employee_id),
                week: r.week,
                submitted_at: r.submitted_at,
                total_hours: self
                    .week_imputations(r.employee_id, r.week)
                    .iter()
                    .map(|i| i.hours)
                    .sum(),
            })
            .collect();
        pending.sort_by(|a, b| a.week.cmp(&b.week).then_with(|| a.employee.cmp(&b.employee)));
        pending
    }

    fn managed_members(&self, actor: &Employee) -> Result<Vec<EmployeeId>, StoreError> {
        if actor.role == Role::Employee {
            return Err(StoreError::Forbidden(
                "manager access is required".to_string(),
            ));
        }
        let members: Vec<EmployeeId> = self.directory.team_members(actor).into_iter().collect();
        if members.is_empty() {
            return Err(StoreError::NoTeam(actor.id));
        }
        Ok(members)
    }
}

/// Authoritative timesheet state shared by the HTTP handlers and the scheduled tasks.
pub struct TimesheetStore {
    state: Mutex<StoreState>,
    policy: HourPolicy,
    clock: Arc<dyn Clock>,
}

impl TimesheetStore {
    pub fn new(directory: Directory, policy: HourPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::from_snapshot(
            Snapshot {
                directory,
                ..Snapshot::default()
            },
            policy,
            clock,
        )
    }

    pub fn from_snapshot(snapshot: Snapshot, policy: HourPolicy, clock: Arc<dyn Clock>) -> Self {
        let next_id = snapshot
            .imputations
            .iter()
            .map(|i| i.id)
            .max()
            .unwrap_or(0)
            + 1;
        let imputations = snapshot
            .imputations
            .into_iter()
            .map(|i| (i.key(), i))
            .collect();
        let weeks = snapshot
            .weeks
            .into_iter()
            .map(|r| ((r.employee_id, r.week), r))
            .collect();
        Self {
            state: Mutex::new(StoreState {
                directory: snapshot.directory,
                imputations,
                weeks,
                next_id,
            }),
            policy,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn directory(&self) -> Directory {
        self.lock().directory.clone()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.lock();
        StoreStats {
            employees: state.directory.employees.len(),
            projects: state.directory.projects.len(),
            imputations: state.imputations.len(),
            weeks: state.weeks.len(),
            pending_weeks: state
                .weeks
                .values()
                .filter(|r| r.status == WeekStatus::Submitted)
                .count(),
        }
    }

    // --- Employee operations ---

    pub fn week_view(&self, actor_id: EmployeeId, date: NaiveDate) -> Result<WeekView, StoreError> {
        let state = self.lock();
        let actor = state.actor(actor_id)?;
        let week = WeekKey::containing(date);
        let record = state.record(actor.id, week);
        let imputations = state.week_imputations(actor.id, week);
        let projects = state.directory.visible_projects(&actor);
        let grid = TimeEntryGrid::build(week, &projects, &imputations, record.status, self.policy);
        let day_totals = week.dates().iter().map(|d| (*d, grid.day_total(*d))).collect();
        let totals = aggregation::totals(&imputations, &state.directory);
        debug!(
            "Week view for Emp={}, Week={}: {}h",
            actor.id,
            week,
            grid.grand_total()
        );
        Ok(WeekView {
            week,
            status: record.status,
            editable: record.status.is_editable(),
            comment: record.comment,
            dates: week.dates(),
            imputations,
            grid,
            day_totals,
            totals,
        })
    }

    /// Applies one cell edit. Zero hours delete the entry.
    pub fn record_cell(&self, actor_id: EmployeeId, edit: CellEdit) -> Result<CellOutcome, StoreError> {
        let mut state = self.lock();
        let actor = state.actor(actor_id)?;
        let week = WeekKey::containing(edit.date);
        state.record(actor.id, week).ensure_editable().map_err(|e| {
            warn!("Edit refused for Emp={} on {}: {}", actor.id, edit.date, e);
            EntryError::from(e)
        })?;

        match edit.activity {
            ActivityRef::Project(project_id) => {
                let visible = state
                    .directory
                    .visible_projects(&actor)
                    .iter()
                    .any(|p| p.id == project_id);
                if !visible {
                    return Err(EntryError::ProjectNotVisible(project_id).into());
                }
            }
            ActivityRef::Training(training_id) => {
                let own = state
                    .directory
                    .training(training_id)
                    .map_or(false, |t| t.employee_id == actor.id);
                if !own {
                    return Err(EntryError::ForeignTraining(training_id).into());
                }
            }
        }

        let key = ImputationKey {
            employee_id: actor.id,
            date: edit.date,
            activity: edit.activity,
            category: edit.category,
        };
        let on_grid = edit
            .activity
            .project_id()
            .filter(|_| Category::GRID.contains(&edit.category))
            .filter(|_| week.workdays().contains(&edit.date));
        if let Some(project_id) = on_grid {
            let imputations = state.week_imputations(actor.id, week);
            let projects = state.directory.visible_projects(&actor);
            let status = state.record(actor.id, week).status;
            let mut grid = TimeEntryGrid::build(week, &projects, &imputations, status, self.policy);
            let previous = grid.cell(project_id, edit.category, edit.date);
            grid.set_cell(project_id, edit.category, edit.date, edit.hours)?;
            debug!(
                "Grid cell {}/{} on {}: {}h -> {}h (row total {}h)",
                project_id,
                edit.category,
                edit.date,
                previous,
                edit.hours,
                grid.row_total(project_id, edit.category)
            );
        } else {
            self.policy
                .check_cell(edit.hours)
                .map_err(EntryError::from)?;
            let other_hours: Decimal = state
                .imputations
                .values()
                .filter(|i| i.employee_id == actor.id && i.date == edit.date && i.key() != key)
                .map(|i| i.hours)
                .sum();
            self.policy
                .check_day(edit.date, other_hours, edit.hours)
                .map_err(EntryError::from)?;
        }

        if edit.hours.is_zero() {
            return Ok(match state.imputations.remove(&key) {
                Some(removed) => {
                    info!(
                        "Imputation removed: Emp={}, Date={}, {:?}/{}",
                        actor.id, edit.date, edit.activity, edit.category
                    );
                    CellOutcome::Removed(removed)
                }
                None => CellOutcome::Unchanged,
            });
        }

        let now = self.clock.now();
        let next_id = state.next_id;
        let entry = state.imputations.entry(key).or_insert_with(|| Imputation {
            id: next_id,
            employee_id: actor.id,
            date: edit.date,
            activity: edit.activity,
            category: edit.category,
            hours: Decimal::ZERO,
            description: String::new(),
            validated: false,
            entered_at: now,
            validated_at: None,
            validated_by: None,
        });
        let created = entry.id == next_id;
        entry.hours = edit.hours;
        entry.entered_at = now;
        if !edit.description.trim().is_empty() {
            entry.description = edit.description.trim().to_string();
        }
        let saved = entry.clone();
        if created {
            state.next_id += 1;
        }
        info!(
            "Imputation saved: Emp={}, Date={}, {:?}/{}, Hours={}",
            actor.id, saved.date, saved.activity, saved.category, saved.hours
        );
        Ok(CellOutcome::Saved(saved))
    }

    pub fn submit_week(&self, actor_id: EmployeeId, week: WeekKey) -> Result<WeekRecord, StoreError> {
        let mut state = self.lock();
        let actor = state.actor(actor_id)?;
        let count = state.week_imputations(actor.id, week).len();
        let mut record = state.record(actor.id, week);
        record.submit(count, self.clock.now()).map_err(|e| {
            warn!("Submit refused for Emp={}, Week={}: {}", actor.id, week, e);
            e
        })?;
        state.weeks.insert((actor.id, week), record.clone());
        Ok(record)
    }

    pub fn reopen_week(&self, actor_id: EmployeeId, week: WeekKey) -> Result<WeekRecord, StoreError> {
        let mut state = self.lock();
        let actor = state.actor(actor_id)?;
        let mut record = state.record(actor.id, week);
        record.reopen()?;
        state.weeks.insert((actor.id, week), record.clone());
        Ok(record)
    }

    pub fn history(&self, actor_id: EmployeeId, filter: &HistoryFilter) -> Result<Vec<Imputation>, StoreError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(StoreError::InvalidRange { from, to });
            }
        }
        let state = self.lock();
        let actor = state.actor(actor_id)?;
        let mut entries: Vec<Imputation> = state
            .imputations
            .values()
            .filter(|i| i.employee_id == actor.id)
            .filter(|i| filter.from.map_or(true, |from| i.date >= from))
            .filter(|i| filter.to.map_or(true, |to| i.date <= to))
            .filter(|i| {
                filter.projects.is_empty()
                    || i.activity
                        .project_id()
                        .map_or(false, |p| filter.projects.contains(&p))
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        debug!("History for Emp={}: {} entries", actor.id, entries.len());
        Ok(entries)
    }

    pub fn monthly_summary(&self, actor_id: EmployeeId, year: i32, month: u32) -> Result<MonthlySummary, StoreError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(StoreError::InvalidMonth { year, month })?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or(StoreError::InvalidMonth { year, month })?;
        let last = next_month - Duration::days(1);

        let state = self.lock();
        let actor = state.actor(actor_id)?;
        let in_month: Vec<Imputation> = state
            .imputations
            .values()
            .filter(|i| i.employee_id == actor.id && i.date >= first && i.date <= last)
            .cloned()
            .collect();
        let projects = aggregation::project_loads(&in_month, &state.directory);
        Ok(MonthlySummary {
            total_hours: projects.values().map(|l| l.hours).sum(),
            total_value: aggregation::total_value(&projects),
            projects,
            period: format!("{} - {}", first, last),
        })
    }

    pub fn week_report(&self, actor_id: EmployeeId, date: NaiveDate) -> Result<WeekReportData, StoreError> {
        let state = self.lock();
        let actor = state.actor(actor_id)?;
        let week = WeekKey::containing(date);
        let imputations = state.week_imputations(actor.id, week);
        Ok(aggregation::week_report(
            week,
            &actor.display_name(),
            &imputations,
            &state.directory,
        ))
    }

    // --- Manager operations ---

    pub fn decide_week(
        &self,
        manager_id: EmployeeId,
        employee_id: EmployeeId,
        week: WeekKey,
        decision: &Decision,
    ) -> Result<WeekRecord, StoreError> {
        let mut state = self.lock();
        let manager = state.actor(manager_id)?;
        if state.directory.employee(employee_id).is_none() {
            return Err(StoreError::NotFound(format!("Employee {}", employee_id)));
        }
        if !state.directory.manages(&manager, employee_id) {
            warn!(
                "Decision refused: Emp={} does not manage Emp={}",
                manager.id, employee_id
            );
            return Err(StoreError::Forbidden(format!(
                "employee {} is not in your teams",
                employee_id
            )));
        }

        let now = self.clock.now();
        let mut record = state.record(employee_id, week);
        record.decide(decision, manager.id, now)?;
        if let Decision::Validate { .. } = decision {
            let mut count = 0;
            for imp in state
                .imputations
                .values_mut()
                .filter(|i| i.employee_id == employee_id && week.contains(i.date))
            {
                imp.validated = true;
                imp.validated_at = Some(now);
                imp.validated_by = Some(manager.id);
                count += 1;
            }
            debug!("Marked {} imputations validated for Emp={}, Week={}", count, employee_id, week);
        }
        state.weeks.insert((employee_id, week), record.clone());
        Ok(record)
    }

    pub fn manager_dashboard(&self, manager_id: EmployeeId) -> Result<ManagerDashboard, StoreError> {
        let today = self.clock.today();
        let state = self.lock();
        let manager = state.actor(manager_id)?;
        let members = state.managed_members(&manager)?;
        let week = WeekKey::containing(today);
        let this_week: Vec<Imputation> = state
            .imputations
            .values()
            .filter(|i| members.contains(&i.employee_id) && week.contains(i.date))
            .cloned()
            .collect();
        let totals = aggregation::totals(&this_week, &state.directory);
        let load_by_project = aggregation::project_loads(&this_week, &state.directory);
        Ok(ManagerDashboard {
            period: format!("{} - {}", week.monday(), week.sunday()),
            week,
            pending_weeks: state.pending_weeks_of(&members),
            total_value: aggregation::total_value(&load_by_project),
            load_by_project,
            load_by_employee: totals.by_employee,
            load_by_category: totals.by_category,
            overdue_projects: state.directory.overdue_projects(&manager, today),
        })
    }

    pub fn team_report(&self, manager_id: EmployeeId, filter: &TeamReportFilter) -> Result<TeamReport, StoreError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(StoreError::InvalidRange { from, to });
            }
        }
        let today = self.clock.today();
        let state = self.lock();
        let manager = state.actor(manager_id)?;
        let members = state.managed_members(&manager)?;
        let selected: Vec<Imputation> = state
            .imputations
            .values()
            .filter(|i| members.contains(&i.employee_id))
            .filter(|i| filter.from.map_or(true, |from| i.date >= from))
            .filter(|i| filter.to.map_or(true, |to| i.date <= to))
            .filter(|i| {
                filter
                    .project
                    .map_or(true, |p| i.activity.project_id() == Some(p))
            })
            .cloned()
            .collect();

        let from = filter
            .from
            .or_else(|| selected.iter().map(|i| i.date).min())
            .unwrap_or(today);
        let to = filter
            .to
            .or_else(|| selected.iter().map(|i| i.date).max())
            .unwrap_or(today)
            .max(from);

        let totals = aggregation::totals(&selected, &state.directory);
        let pending = state.pending_weeks_of(&members).len();
        info!(
            "Team report for Emp={}: {} entries from {} to {}",
            manager.id,
            selected.len(),
            from,
            to
        );
        Ok(TeamReport {
            from,
            to,
            project: filter
                .project
                .map(|p| state.directory.activity_label(&ActivityRef::Project(p))),
            rows: aggregation::report_rows(&selected, &state.directory),
            project_loads: aggregation::project_loads(&selected, &state.directory),
            metrics: aggregation::team_metrics(&totals, pending),
            totals,
        })
    }

    // --- Reminder inputs ---

    /// Active staff with hours entered in `week` that is still a draft.
    /// Managers and admins are left out.
    pub fn draft_employees(&self, week: WeekKey) -> Vec<Employee> {
        let state = self.lock();
        state
            .directory
            .employees
            .iter()
            .filter(|e| e.active && e.role == Role::Employee)
            .filter(|e| state.record(e.id, week).status == WeekStatus::Draft)
            .filter(|e| !state.week_imputations(e.id, week).is_empty())
            .cloned()
            .collect()
    }

    pub fn rejected_weeks(&self) -> Vec<WeekRecord> {
        let mut rejected: Vec<WeekRecord> = self
            .lock()
            .weeks
            .values()
            .filter(|r| r.status == WeekStatus::Rejected)
            .cloned()
            .collect();
        rejected.sort_by_key(|r| (r.employee_id, r.week));
        rejected
    }

    /// Managers with at least one submitted week waiting for them.
    pub fn pending_by_manager(&self) -> Vec<(Employee, Vec<PendingWeek>)> {
        let state = self.lock();
        state
            .directory
            .employees
            .iter()
            .filter(|e| e.active && e.role == Role::Manager)
            .filter_map(|manager| {
                let members: Vec<EmployeeId> =
                    state.directory.team_members(manager).into_iter().collect();
                let pending = state.pending_weeks_of(&members);
                (!pending.is_empty()).then(|| (manager.clone(), pending))
            })
            .collect()
    }

    // --- Persistence ---

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        let mut weeks: Vec<WeekRecord> = state.weeks.values().cloned().collect();
        weeks.sort_by_key(|r| (r.employee_id, r.week));
        Snapshot {
            directory: state.directory.clone(),
            imputations: state.imputations.values().cloned().collect(),
            weeks,
        }
    }

    pub fn load(path: &Path, policy: HourPolicy, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        info!(
            "Loaded {} employees, {} imputations, {} week records from {}",
            snapshot.directory.employees.len(),
            snapshot.imputations.len(),
            snapshot.weeks.len(),
            path.display()
        );
        Ok(Self::from_snapshot(snapshot, policy, clock))
    }

    /// Writes the snapshot next to `path` first, then renames it into place.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        debug!("Snapshot saved to {} ({} bytes)", path.display(), json.len());
        Ok(())
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::directory::fixtures::*;
    use crate::imputation::HoursError;
    use rust_decimal_macros::dec;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    // Wednesday of ISO week 2024-W10.
    fn setup_test_environment() -> (TimesheetStore, FixedClock) {
        let clock = FixedClock::new("2024-03-06 10:00:00");
        let store = TimesheetStore::new(directory(), HourPolicy::default(), Arc::new(clock.clone()));
        (store, clock)
    }

    fn edit(activity: ActivityRef, category: Category, date: &str, hours: Decimal) -> CellEdit {
        CellEdit {
            activity,
            category,
            date: d(date),
            hours,
            description: String::new(),
        }
    }

    fn week10() -> WeekKey {
        WeekKey::new(2024, 10).unwrap()
    }

    fn fill_alice_week(store: &TimesheetStore) {
        for (date, hours) in [("2024-03-04", dec!(7.5)), ("2024-03-05", dec!(8))] {
            store
                .record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, date, hours))
                .unwrap();
        }
        store
            .record_cell(
                ALICE,
                edit(ActivityRef::Training(RUST_COURSE), Category::Training, "2024-03-06", dec!(3)),
            )
            .unwrap();
    }

    #[test]
    fn record_cell_creates_updates_and_removes() {
        let (store, _clock) = setup_test_environment();
        let first = store
            .record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(4)))
            .unwrap();
        let CellOutcome::Saved(created) = first else {
            panic!("expected a saved imputation, got {:?}", first);
        };
        assert_eq!(created.id, 1);

        let second = store
            .record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(6.25)))
            .unwrap();
        let CellOutcome::Saved(updated) = second else {
            panic!("expected a saved imputation");
        };
        assert_eq!(updated.id, 1);
        assert_eq!(updated.hours, dec!(6.25));
        assert_eq!(store.stats().imputations, 1);

        let removed = store
            .record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(0)))
            .unwrap();
        assert!(matches!(removed, CellOutcome::Removed(_)));
        assert_eq!(store.stats().imputations, 0);
        assert_eq!(
            store
                .record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(0)))
                .unwrap(),
            CellOutcome::Unchanged
        );
    }

    #[test]
    fn record_cell_rejects_foreign_projects_and_trainings() {
        let (store, _clock) = setup_test_environment();
        assert!(matches!(
            store.record_cell(ALICE, edit(ActivityRef::Project(ORION), Category::Project, "2024-03-04", dec!(1))),
            Err(StoreError::Entry(EntryError::ProjectNotVisible(ORION)))
        ));
        assert!(matches!(
            store.record_cell(BRUNO, edit(ActivityRef::Training(RUST_COURSE), Category::Training, "2024-03-04", dec!(1))),
            Err(StoreError::Entry(EntryError::ForeignTraining(RUST_COURSE)))
        ));
        assert!(matches!(
            store.record_cell(4242, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(1))),
            Err(StoreError::UnknownActor(4242))
        ));
    }

    #[test]
    fn record_cell_enforces_the_daily_cap_across_activities() {
        let (store, _clock) = setup_test_environment();
        store
            .record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(20)))
            .unwrap();
        let err = store
            .record_cell(ALICE, edit(ActivityRef::Project(ZEPHYR), Category::Other, "2024-03-04", dec!(4.5)))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Entry(EntryError::Hours(HoursError::DailyLimitExceeded { .. }))
        ));
        // Replacing the existing cell does not double count it.
        assert!(store
            .record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(24)))
            .is_ok());
    }

    #[test]
    fn week_view_totals_match_stored_entries() {
        let (store, _clock) = setup_test_environment();
        fill_alice_week(&store);
        let view = store.week_view(ALICE, d("2024-03-07")).unwrap();
        assert_eq!(view.week, week10());
        assert_eq!(view.status, WeekStatus::Draft);
        assert!(view.editable);
        assert_eq!(view.imputations.len(), 3);
        assert_eq!(view.totals.total_hours, dec!(18.5));
        assert_eq!(view.grid.grand_total(), dec!(18.5));
        assert_eq!(view.day_totals[&d("2024-03-06")], dec!(3));
        assert_eq!(view.dates[0], d("2024-03-04"));
        for (date, total) in &view.day_totals {
            let expected: Decimal = view
                .imputations
                .iter()
                .filter(|i| i.date == *date)
                .map(|i| i.hours)
                .sum();
            assert_eq!(*total, expected);
        }
    }

    #[test]
    fn full_week_lifecycle_submit_reject_reopen_validate() {
        let (store, _clock) = setup_test_environment();
        assert!(matches!(
            store.submit_week(ALICE, week10()),
            Err(StoreError::Transition(TransitionError::EmptyWeek { .. }))
        ));
        fill_alice_week(&store);
        store.submit_week(ALICE, week10()).unwrap();

        // Submitted weeks are locked.
        assert!(matches!(
            store.record_cell(ALICE, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-07", dec!(1))),
            Err(StoreError::Entry(EntryError::Locked(_)))
        ));

        let reject = Decision::Reject {
            comment: "Wrong project on Monday".to_string(),
        };
        assert!(matches!(
            store.decide_week(NADIA, ALICE, week10(), &reject),
            Err(StoreError::Forbidden(_))
        ));
        let record = store.decide_week(MARC, ALICE, week10(), &reject).unwrap();
        assert_eq!(record.status, WeekStatus::Rejected);
        assert_eq!(store.week_view(ALICE, d("2024-03-04")).unwrap().comment, "Wrong project on Monday");

        store.reopen_week(ALICE, week10()).unwrap();
        store
            .record_cell(ALICE, edit(ActivityRef::Project(ZEPHYR), Category::Project, "2024-03-04", dec!(0.5)))
            .unwrap();
        store.submit_week(ALICE, week10()).unwrap();

        let validate = Decision::Validate {
            comment: String::new(),
        };
        let record = store.decide_week(MARC, ALICE, week10(), &validate).unwrap();
        assert_eq!(record.status, WeekStatus::Validated);
        let view = store.week_view(ALICE, d("2024-03-04")).unwrap();
        assert!(view.imputations.iter().all(|i| i.validated && i.validated_by == Some(MARC)));
        assert!(matches!(
            store.reopen_week(ALICE, week10()),
            Err(StoreError::Transition(TransitionError::NotRejected { .. }))
        ));
    }

    #[test]
    fn resubmitting_a_corrected_week_drops_the_rejection_comment() {
        let (store, clock) = setup_test_environment();
        fill_alice_week(&store);
        store.submit_week(ALICE, week10()).unwrap();
        let reject = Decision::Reject {
            comment: "Fix Monday".to_string(),
        };
        store.decide_week(MARC, ALICE, week10(), &reject).unwrap();

        store.reopen_week(ALICE, week10()).unwrap();
        let reopened = store.week_view(ALICE, d("2024-03-04")).unwrap();
        assert_eq!(reopened.status, WeekStatus::Draft);
        assert_eq!(reopened.comment, "Fix Monday");

        clock.set_time("2024-03-07 09:00:00");
        store.submit_week(ALICE, week10()).unwrap();
        let view = store.week_view(ALICE, d("2024-03-04")).unwrap();
        assert_eq!(view.status, WeekStatus::Submitted);
        assert_eq!(view.comment, "");
        let record = store
            .snapshot()
            .weeks
            .into_iter()
            .find(|r| r.employee_id == ALICE && r.week == week10())
            .unwrap();
        assert_eq!(record.decided_by, None);
        assert_eq!(record.decided_at, None);
    }

    #[test]
    fn decide_week_on_unknown_employee_is_not_found() {
        let (store, _clock) = setup_test_environment();
        assert!(matches!(
            store.decide_week(ROOT, 4242, week10(), &Decision::Validate { comment: String::new() }),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn history_filters_by_project_and_dates_newest_first() {
        let (store, _clock) = setup_test_environment();
        fill_alice_week(&store);
        store
            .record_cell(ALICE, edit(ActivityRef::Project(ZEPHYR), Category::Project, "2024-02-27", dec!(2)))
            .unwrap();

        let all = store.history(ALICE, &HistoryFilter::default()).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].date, d("2024-03-06"));
        assert_eq!(all[3].date, d("2024-02-27"));

        let apollo = store
            .history(
                ALICE,
                &HistoryFilter {
                    projects: vec![APOLLO],
                    from: Some(d("2024-03-05")),
                    to: None,
                },
            )
            .unwrap();
        assert_eq!(apollo.len(), 1);
        assert_eq!(apollo[0].hours, dec!(8));

        assert!(matches!(
            store.history(
                ALICE,
                &HistoryFilter {
                    projects: vec![],
                    from: Some(d("2024-03-10")),
                    to: Some(d("2024-03-01")),
                }
            ),
            Err(StoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn monthly_summary_values_project_hours() {
        let (store, _clock) = setup_test_environment();
        fill_alice_week(&store);
        store
            .record_cell(ALICE, edit(ActivityRef::Project(ZEPHYR), Category::Project, "2024-02-29", dec!(2)))
            .unwrap();
        let march = store.monthly_summary(ALICE, 2024, 3).unwrap();
        assert_eq!(march.period, "2024-03-01 - 2024-03-31");
        assert_eq!(march.total_hours, dec!(15.5));
        assert_eq!(march.total_value, dec!(1240));
        assert_eq!(march.projects.len(), 1);

        let feb = store.monthly_summary(ALICE, 2024, 2).unwrap();
        assert_eq!(feb.period, "2024-02-01 - 2024-02-29");
        assert_eq!(feb.total_value, dec!(100));

        assert!(matches!(
            store.monthly_summary(ALICE, 2024, 13),
            Err(StoreError::InvalidMonth { .. })
        ));
    }

    #[test]
    fn manager_dashboard_covers_current_week_of_own_team() {
        let (store, _clock) = setup_test_environment();
        fill_alice_week(&store);
        store
            .record_cell(BRUNO, edit(ActivityRef::Project(ZEPHYR), Category::Project, "2024-03-05", dec!(6)))
            .unwrap();
        store
            .record_cell(CAMILLE, edit(ActivityRef::Project(ORION), Category::Project, "2024-03-05", dec!(5)))
            .unwrap();
        store.submit_week(ALICE, week10()).unwrap();

        let dashboard = store.manager_dashboard(MARC).unwrap();
        assert_eq!(dashboard.period, "2024-03-04 - 2024-03-10");
        assert_eq!(dashboard.pending_weeks.len(), 1);
        assert_eq!(dashboard.pending_weeks[0].employee, "Alice Martin");
        assert_eq!(dashboard.pending_weeks[0].total_hours, dec!(18.5));
        assert_eq!(dashboard.load_by_project["Apollo"].value, dec!(1240));
        assert_eq!(dashboard.load_by_project["Zephyr"].value, dec!(300));
        assert!(!dashboard.load_by_project.contains_key("Orion"));
        assert_eq!(dashboard.load_by_employee[&BRUNO].hours, dec!(6));
        assert_eq!(dashboard.load_by_category[&Category::Training], dec!(3));
        assert_eq!(dashboard.total_value, dec!(1540));
        assert_eq!(dashboard.overdue_projects, 1);

        assert!(matches!(
            store.manager_dashboard(ALICE),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn manager_without_team_gets_an_error() {
        let mut dir = directory();
        dir.teams.retain(|t| t.manager_id != NADIA);
        let clock = FixedClock::new("2024-03-06 10:00:00");
        let store = TimesheetStore::new(dir, HourPolicy::default(), Arc::new(clock));
        assert!(matches!(
            store.manager_dashboard(NADIA),
            Err(StoreError::NoTeam(NADIA))
        ));
    }

    #[test]
    fn team_report_filters_project_and_range() {
        let (store, _clock) = setup_test_environment();
        fill_alice_week(&store);
        store
            .record_cell(BRUNO, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-08", dec!(4)))
            .unwrap();

        let report = store
            .team_report(
                MARC,
                &TeamReportFilter {
                    project: Some(APOLLO),
                    from: Some(d("2024-03-05")),
                    to: Some(d("2024-03-10")),
                },
            )
            .unwrap();
        assert_eq!(report.project.as_deref(), Some("Apollo"));
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.totals.total_hours, dec!(12));
        assert_eq!(report.metrics.employee_count, 2);

        let open = store.team_report(MARC, &TeamReportFilter::default()).unwrap();
        assert_eq!(open.from, d("2024-03-04"));
        assert_eq!(open.to, d("2024-03-08"));
        assert_eq!(open.rows.len(), 4);
    }

    #[test]
    fn reminder_inputs_reflect_week_states() {
        let (store, _clock) = setup_test_environment();
        fill_alice_week(&store);
        store.submit_week(ALICE, week10()).unwrap();
        store
            .record_cell(BRUNO, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-05", dec!(6)))
            .unwrap();
        store
            .record_cell(MARC, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-05", dec!(2)))
            .unwrap();

        // Camille has nothing to submit and Marc is a manager.
        let drafts: Vec<EmployeeId> = store.draft_employees(week10()).iter().map(|e| e.id).collect();
        assert_eq!(drafts, vec![BRUNO]);

        let pending = store.pending_by_manager();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.id, MARC);

        store
            .decide_week(MARC, ALICE, week10(), &Decision::Reject { comment: "Redo".to_string() })
            .unwrap();
        assert_eq!(store.rejected_weeks().len(), 1);
        assert!(store.pending_by_manager().is_empty());
    }

    #[test]
    fn snapshot_save_and_load_round_trip() {
        let (store, clock) = setup_test_environment();
        fill_alice_week(&store);
        store.submit_week(ALICE, week10()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sgrip.json");
        store.save(&path).unwrap();

        let loaded = TimesheetStore::load(&path, HourPolicy::default(), Arc::new(clock)).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
        assert_eq!(loaded.stats().pending_weeks, 1);

        // Ids keep increasing after a reload.
        let outcome = loaded
            .record_cell(BRUNO, edit(ActivityRef::Project(APOLLO), Category::Project, "2024-03-04", dec!(1)))
            .unwrap();
        let CellOutcome::Saved(imp) = outcome else {
            panic!("expected a saved imputation");
        };
        assert_eq!(imp.id, 4);
    }

    #[test]
    fn bundled_sample_data_loads() {
        let snapshot: Snapshot = serde_json::from_str(include_str!("../data/sample.json")).unwrap();
        let clock = FixedClock::new("2024-03-06 10:00:00");
        let store = TimesheetStore::from_snapshot(snapshot, HourPolicy::default(), Arc::new(clock));
        let stats = store.stats();
        assert_eq!(stats.employees, 7);
        assert_eq!(stats.projects, 4);
        assert!(store.draft_employees(week10()).iter().all(|e| e.id != 4));
        assert!(matches!(
            store.week_view(4, d("2024-03-06")),
            Err(StoreError::UnknownActor(4))
        ));
    }
}
