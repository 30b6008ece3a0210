// src/aggregation.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::directory::{Directory, EmployeeId, ProjectId};
use crate::imputation::{weekday_name, ActivityRef, Category, Imputation, WeekKey};

/// Hour sums over a set of imputations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub total_hours: Decimal,
    pub by_day: BTreeMap<NaiveDate, Decimal>,
    /// Project activities only; trainings are not counted here.
    pub by_project: BTreeMap<String, Decimal>,
    pub by_category: BTreeMap<Category, Decimal>,
    /// Keyed by id so two employees sharing a name stay apart.
    pub by_employee: BTreeMap<EmployeeId, EmployeeHours>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeHours {
    pub name: String,
    pub hours: Decimal,
}

impl Totals {
    /// Per-employee hours as chart labels, in employee id order.
    pub fn employee_series(&self) -> Vec<(String, Decimal)> {
        self.by_employee
            .values()
            .map(|e| (e.name.clone(), e.hours))
            .collect()
    }
}

pub fn totals(imputations: &[Imputation], directory: &Directory) -> Totals {
    let mut totals = Totals::default();
    for imp in imputations {
        totals.total_hours += imp.hours;
        *totals.by_day.entry(imp.date).or_default() += imp.hours;
        *totals.by_category.entry(imp.category).or_default() += imp.hours;
        totals
            .by_employee
            .entry(imp.employee_id)
            .or_insert_with(|| EmployeeHours {
                name: directory.employee_name(imp.employee_id),
                hours: Decimal::ZERO,
            })
            .hours += imp.hours;
        if let ActivityRef::Project(_) = imp.activity {
            *totals
                .by_project
                .entry(directory.activity_label(&imp.activity))
                .or_default() += imp.hours;
        }
    }
    debug!(
        "Aggregated {} imputations: {}h over {} days",
        imputations.len(),
        totals.total_hours,
        totals.by_day.len()
    );
    totals
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectLoad {
    pub project_id: ProjectId,
    pub hours: Decimal,
    pub rate: Decimal,
    pub value: Decimal,
}

/// Hours and valuation per project name. Trainings carry no rate and are skipped.
/// Each imputation is valued at its own project's rate, so namesakes with
/// different rates still add up correctly; `rate` is the first one seen.
pub fn project_loads(
    imputations: &[Imputation],
    directory: &Directory,
) -> BTreeMap<String, ProjectLoad> {
    let mut loads: BTreeMap<String, ProjectLoad> = BTreeMap::new();
    for imp in imputations {
        let ActivityRef::Project(project_id) = imp.activity else {
            continue;
        };
        let rate = directory.hourly_rate(&imp.activity);
        let load = loads
            .entry(directory.activity_label(&imp.activity))
            .or_insert(ProjectLoad {
                project_id,
                hours: Decimal::ZERO,
                rate,
                value: Decimal::ZERO,
            });
        load.hours += imp.hours;
        load.value += imp.hours * rate;
    }
    loads
}

pub fn total_value(loads: &BTreeMap<String, ProjectLoad>) -> Decimal {
    loads.values().map(|l| l.value).sum()
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        (numerator / denominator).round_dp(2)
    }
}

// --- Performance bands ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Performance {
    Excellent,
    Good,
    NeedsImprovement,
}

impl Performance {
    fn banded(value: Decimal, excellent: Decimal, good: Decimal) -> Self {
        if value >= excellent {
            Performance::Excellent
        } else if value >= good {
            Performance::Good
        } else {
            Performance::NeedsImprovement
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Performance::Excellent => "Excellent",
            Performance::Good => "Good",
            Performance::NeedsImprovement => "Needs improvement",
        }
    }
}

// --- Employee weekly report ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLine {
    pub date: NaiveDate,
    pub day: String,
    pub category: String,
    pub activity: String,
    pub description: String,
    pub hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekPerformance {
    pub productivity: Performance,
    /// Share of the five working days with hours, in percent.
    pub regularity: Decimal,
    pub active_projects: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekReportData {
    pub employee: String,
    pub week: WeekKey,
    pub period: String,
    pub total_hours: Decimal,
    pub working_days: usize,
    pub total_activities: usize,
    pub average_per_day: Decimal,
    pub daily_hours: BTreeMap<NaiveDate, Decimal>,
    pub project_distribution: BTreeMap<String, Decimal>,
    /// Keyed by category label.
    pub category_distribution: BTreeMap<String, Decimal>,
    pub activities: Vec<ActivityLine>,
    pub performance: WeekPerformance,
}

pub fn week_report(
    week: WeekKey,
    employee: &str,
    imputations: &[Imputation],
    directory: &Directory,
) -> WeekReportData {
    let in_week: Vec<&Imputation> = imputations
        .iter()
        .filter(|i| week.contains(i.date))
        .collect();

    let mut total_hours = Decimal::ZERO;
    let mut daily_hours: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    let mut project_distribution: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut category_distribution: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut activities = Vec::with_capacity(in_week.len());

    for imp in &in_week {
        total_hours += imp.hours;
        *daily_hours.entry(imp.date).or_default() += imp.hours;
        *category_distribution
            .entry(imp.category.label().to_string())
            .or_default() += imp.hours;
        let label = directory.activity_label(&imp.activity);
        if imp.activity.project_id().is_some() {
            *project_distribution.entry(label.clone()).or_default() += imp.hours;
        }
        let description = if imp.description.trim().is_empty() {
            format!("{} - {}", imp.category.label(), label)
        } else {
            imp.description.clone()
        };
        activities.push(ActivityLine {
            date: imp.date,
            day: weekday_name(imp.date).to_string(),
            category: imp.category.label().to_string(),
            activity: label,
            description,
            hours: imp.hours,
        });
    }
    activities.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.activity.cmp(&b.activity)));

    let working_days = daily_hours.values().filter(|h| !h.is_zero()).count();
    let average_per_day = ratio(total_hours, Decimal::from(working_days));

    WeekReportData {
        employee: employee.to_string(),
        week,
        period: format!(
            "{} - {}",
            week.monday().format("%d/%m/%Y"),
            week.sunday().format("%d/%m/%Y")
        ),
        total_hours,
        working_days,
        total_activities: in_week.len(),
        average_per_day,
        performance: WeekPerformance {
            productivity: Performance::banded(average_per_day, dec!(7), dec!(6)),
            regularity: ratio(Decimal::from(working_days * 100), dec!(5)),
            active_projects: project_distribution.len(),
        },
        daily_hours,
        project_distribution,
        category_distribution,
        activities,
    }
}

// --- Team metrics ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeLoad {
    pub employee_id: EmployeeId,
    pub name: String,
    pub hours: Decimal,
    pub above_average: bool,
    /// Hours minus the team average.
    pub deviation: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub employee_count: usize,
    pub total_hours: Decimal,
    pub average_per_employee: Decimal,
    pub productive_hours: Decimal,
    /// Percent of hours booked on the project category.
    pub productivity_rate: Decimal,
    pub max_hours: Decimal,
    pub min_hours: Decimal,
    pub project_count: usize,
    pub pending_weeks: usize,
    /// Pending weeks per employee.
    pub validation_backlog: Decimal,
    /// Total hours spread over five working days.
    pub daily_load: Decimal,
    pub team_performance: Performance,
    pub employees: Vec<EmployeeLoad>,
    pub recommendations: Vec<String>,
}

pub fn team_metrics(totals: &Totals, pending_weeks: usize) -> TeamMetrics {
    let employee_count = totals.by_employee.len();
    let total_hours: Decimal = totals.by_employee.values().map(|e| e.hours).sum();
    let average_per_employee = ratio(total_hours, Decimal::from(employee_count));
    let productive_hours: Decimal = totals
        .by_category
        .iter()
        .filter(|(category, _)| category.is_productive())
        .map(|(_, hours)| *hours)
        .sum();
    let productivity_rate = if total_hours.is_zero() {
        Decimal::ZERO
    } else {
        (productive_hours * dec!(100) / total_hours).round_dp(1)
    };
    let max_hours = totals
        .by_employee
        .values()
        .map(|e| e.hours)
        .max()
        .unwrap_or(Decimal::ZERO);
    let min_hours = totals
        .by_employee
        .values()
        .map(|e| e.hours)
        .min()
        .unwrap_or(Decimal::ZERO);
    let project_count = totals.by_project.len();

    let employees = totals
        .by_employee
        .iter()
        .map(|(id, e)| EmployeeLoad {
            employee_id: *id,
            name: e.name.clone(),
            hours: e.hours,
            above_average: e.hours >= average_per_employee,
            deviation: e.hours - average_per_employee,
        })
        .collect();

    let mut recommendations = Vec::new();
    if employee_count > 0 {
        if productivity_rate < dec!(70) {
            recommendations.push("Reduce non-productive time to raise productivity".to_string());
        }
        if average_per_employee < dec!(30) {
            recommendations
                .push("Increase the workload or rebalance tasks across the team".to_string());
        }
        if pending_weeks > 5 {
            recommendations.push("Speed up the validation of submitted weeks".to_string());
        }
        if project_count < employee_count {
            recommendations.push("Consider assigning additional projects".to_string());
        }
    }
    if recommendations.is_empty() {
        recommendations.push("Overall performance is satisfactory".to_string());
    }

    TeamMetrics {
        employee_count,
        total_hours,
        average_per_employee,
        productive_hours,
        productivity_rate,
        max_hours,
        min_hours,
        project_count,
        pending_weeks,
        validation_backlog: ratio(Decimal::from(pending_weeks), Decimal::from(employee_count)),
        daily_load: ratio(total_hours, dec!(5)),
        team_performance: Performance::banded(average_per_employee, dec!(35), dec!(28)),
        employees,
        recommendations,
    }
}

// --- Flat reporting rows ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub employee: String,
    pub activity: String,
    pub category: Category,
    pub hours: Decimal,
    pub value: Decimal,
}

pub fn report_rows(imputations: &[Imputation], directory: &Directory) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = imputations
        .iter()
        .map(|imp| ReportRow {
            date: imp.date,
            employee: directory.employee_name(imp.employee_id),
            activity: directory.activity_label(&imp.activity),
            category: imp.category,
            hours: imp.hours,
            value: imp.hours * directory.hourly_rate(&imp.activity),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.employee.cmp(&b.employee))
            .then_with(|| a.activity.cmp(&b.activity))
    });
    rows
}
