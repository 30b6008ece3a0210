// src/directory.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::imputation::ActivityRef;

pub type EmployeeId = u32;
pub type TeamId = u32;
pub type ProjectId = u32;
pub type TrainingId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "employe")]
    Employee,
    Manager,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Employee {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An équipe: one manager, any number of member employees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub manager_id: EmployeeId,
    #[serde(default)]
    pub member_ids: Vec<EmployeeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    Client,
    Internal,
    #[serde(rename = "r&d")]
    ResearchAndDevelopment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub hourly_rate: Decimal,
    #[serde(default = "default_project_kind")]
    pub kind: ProjectKind,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Project {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.active && self.end_date < today
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingKind {
    Internal,
    External,
    SelfStudy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Training {
    pub id: TrainingId,
    pub employee_id: EmployeeId,
    pub kind: TrainingKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub hours: Decimal,
}

fn default_true() -> bool {
    true
}

fn default_project_kind() -> ProjectKind {
    ProjectKind::Internal
}

/// People, teams, projects and trainings. Managed elsewhere; read-only here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub trainings: Vec<Training>,
}

impl Directory {
    pub fn employee(&self, id: EmployeeId) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn training(&self, id: TrainingId) -> Option<&Training> {
        self.trainings.iter().find(|t| t.id == id)
    }

    pub fn employee_name(&self, id: EmployeeId) -> String {
        self.employee(id)
            .map(Employee::display_name)
            .unwrap_or_else(|| format!("Employee #{}", id))
    }

    pub fn teams_managed_by(&self, manager_id: EmployeeId) -> impl Iterator<Item = &Team> {
        self.teams.iter().filter(move |t| t.manager_id == manager_id)
    }

    /// Whether `actor` may act as manager for `employee_id`.
    pub fn manages(&self, actor: &Employee, employee_id: EmployeeId) -> bool {
        match actor.role {
            Role::Admin => true,
            Role::Manager => self
                .teams_managed_by(actor.id)
                .any(|t| t.member_ids.contains(&employee_id)),
            Role::Employee => false,
        }
    }

    /// Employees whose weeks `actor` oversees. Admins oversee every active employee.
    pub fn team_members(&self, actor: &Employee) -> BTreeSet<EmployeeId> {
        match actor.role {
            Role::Admin => self
                .employees
                .iter()
                .filter(|e| e.active)
                .map(|e| e.id)
                .collect(),
            Role::Manager => self
                .teams_managed_by(actor.id)
                .flat_map(|t| t.member_ids.iter().copied())
                .collect(),
            Role::Employee => BTreeSet::new(),
        }
    }

    /// Active projects the actor can book time on or report about.
    pub fn visible_projects(&self, actor: &Employee) -> Vec<&Project> {
        let team_ids: BTreeSet<TeamId> = match actor.role {
            Role::Admin => {
                return self.projects.iter().filter(|p| p.active).collect();
            }
            Role::Manager => self.teams_managed_by(actor.id).map(|t| t.id).collect(),
            Role::Employee => self
                .teams
                .iter()
                .filter(|t| t.member_ids.contains(&actor.id))
                .map(|t| t.id)
                .collect(),
        };
        self.projects
            .iter()
            .filter(|p| p.active)
            .filter(|p| p.team_id.map_or(false, |t| team_ids.contains(&t)))
            .collect()
    }

    pub fn overdue_projects(&self, actor: &Employee, today: NaiveDate) -> usize {
        self.visible_projects(actor)
            .into_iter()
            .filter(|p| p.is_overdue(today))
            .count()
    }

    pub fn activity_label(&self, activity: &ActivityRef) -> String {
        match activity {
            ActivityRef::Project(id) => self
                .project(*id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("Project #{}", id)),
            ActivityRef::Training(id) => self
                .training(*id)
                .map(|t| t.title.clone())
                .unwrap_or_else(|| format!("Training #{}", id)),
        }
    }

    /// Trainings are never billed, so their rate is zero.
    pub fn hourly_rate(&self, activity: &ActivityRef) -> Decimal {
        match activity {
            ActivityRef::Project(id) => self
                .project(*id)
                .map(|p| p.hourly_rate)
                .unwrap_or(Decimal::ZERO),
            ActivityRef::Training(_) => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal_macros::dec;

    pub const ALICE: EmployeeId = 1;
    pub const BRUNO: EmployeeId = 2;
    pub const CAMILLE: EmployeeId = 3;
    pub const MARC: EmployeeId = 10;
    pub const NADIA: EmployeeId = 11;
    pub const ROOT: EmployeeId = 99;

    pub const APOLLO: ProjectId = 100;
    pub const ZEPHYR: ProjectId = 101;
    pub const LEGACY: ProjectId = 102;
    pub const ORION: ProjectId = 200;

    pub const RUST_COURSE: TrainingId = 500;

    fn employee(id: EmployeeId, first: &str, last: &str, role: Role) -> Employee {
        Employee {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            role,
            active: true,
        }
    }

    fn project(
        id: ProjectId,
        name: &str,
        rate: Decimal,
        team_id: TeamId,
        end: (i32, u32, u32),
    ) -> Project {
        Project {
            id,
            code: format!("P{}", id),
            name: name.to_string(),
            description: String::new(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            hourly_rate: rate,
            kind: ProjectKind::Client,
            team_id: Some(team_id),
            active: true,
        }
    }

    /// Two teams: Marc manages Alice and Bruno, Nadia manages Camille.
    pub fn directory() -> Directory {
        Directory {
            employees: vec![
                employee(ALICE, "Alice", "Martin", Role::Employee),
                employee(BRUNO, "Bruno", "Petit", Role::Employee),
                employee(CAMILLE, "Camille", "Roux", Role::Employee),
                employee(MARC, "Marc", "Durand", Role::Manager),
                employee(NADIA, "Nadia", "Lefevre", Role::Manager),
                employee(ROOT, "Root", "Admin", Role::Admin),
            ],
            teams: vec![
                Team {
                    id: 1,
                    name: "Platform".to_string(),
                    manager_id: MARC,
                    member_ids: vec![ALICE, BRUNO],
                },
                Team {
                    id: 2,
                    name: "Data".to_string(),
                    manager_id: NADIA,
                    member_ids: vec![CAMILLE],
                },
            ],
            projects: vec![
                project(APOLLO, "Apollo", dec!(80), 1, (2030, 12, 31)),
                project(ZEPHYR, "Zephyr", dec!(50), 1, (2030, 12, 31)),
                project(LEGACY, "Legacy", dec!(40), 1, (2023, 6, 30)),
                project(ORION, "Orion", dec!(60), 2, (2030, 12, 31)),
            ],
            trainings: vec![Training {
                id: RUST_COURSE,
                employee_id: ALICE,
                kind: TrainingKind::External,
                title: "Rust fundamentals".to_string(),
                description: String::new(),
                start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                hours: dec!(21),
            }],
        }
    }

    pub fn actor(id: EmployeeId) -> Employee {
        directory().employee(id).cloned().unwrap()
    }
}
