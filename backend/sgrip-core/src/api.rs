// src/api.rs
use axum::extract::{FromRequest, FromRequestParts, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::directory::{EmployeeId, ProjectId};
use crate::error::AppError;
use crate::grid::CellEdit;
use crate::imputation::{Imputation, WeekKey};
use crate::report::{
    render_team_report, render_week_report, RenderSettings, RenderedReport, ReportFormat,
    ReportKind,
};
use crate::store::{
    CellOutcome, HistoryFilter, ManagerDashboard, MonthlySummary, StoreStats, TeamReportFilter,
    TimesheetStore, WeekView,
};
use crate::week_status::{Decision, WeekRecord};

pub const EMPLOYEE_HEADER: &str = "x-employee-id";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TimesheetStore>,
    pub chart_scale: f32,
}

impl AppState {
    fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            chart_scale: self.chart_scale,
            generated_at: self.store.clock().now(),
        }
    }
}

/// The calling employee, taken from the `x-employee-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub EmployeeId);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(EMPLOYEE_HEADER)
            .ok_or(AppError::MissingIdentity)?;
        raw.to_str()
            .ok()
            .and_then(|s| s.trim().parse::<EmployeeId>().ok())
            .map(Actor)
            .ok_or_else(|| AppError::InvalidIdentity(String::from_utf8_lossy(raw.as_bytes()).into_owned()))
    }
}

/// JSON body whose rejections are reported as `AppError` (400 with a JSON body).
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Path parameters whose rejections are reported as `AppError`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathParams<T>(pub T);

pub fn router(state: AppState) -> Router {
    let employee_routes = Router::new()
        .route("/week", get(handle_week_view))
        .route("/week/report", get(handle_week_report))
        .route("/cells", put(handle_record_cell))
        .route("/weeks/{year}/{week}/submit", post(handle_submit_week))
        .route("/weeks/{year}/{week}/reopen", post(handle_reopen_week))
        .route("/history", get(handle_history))
        .route("/monthly-summary", get(handle_monthly_summary));

    let manager_routes = Router::new()
        .route("/dashboard", get(handle_dashboard))
        .route(
            "/weeks/{employee}/{year}/{week}/decision",
            post(handle_decision),
        )
        .route("/reporting", get(handle_reporting));

    let api_routes = Router::new()
        .nest("/employee", employee_routes)
        .nest("/manager", manager_routes);

    Router::new()
        .nest("/api", api_routes)
        .route("/status", get(handle_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Query parsing ---
// Empty values (`from=`) are treated as absent.

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(raw: &Option<String>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    non_empty(raw)
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(format!("{} must be YYYY-MM-DD, got '{}'", field, s)))
        })
        .transpose()
}

fn parse_number<T: FromStr>(raw: &Option<String>, field: &str) -> Result<Option<T>, AppError> {
    non_empty(raw)
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| AppError::BadRequest(format!("{} must be a number, got '{}'", field, s)))
        })
        .transpose()
}

fn parse_choice<T>(raw: &Option<String>) -> Result<T, AppError>
where
    T: FromStr<Err = String> + Default,
{
    non_empty(raw)
        .map(|s| s.parse::<T>().map_err(AppError::BadRequest))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn parse_projects(raw: &Option<String>) -> Result<Vec<ProjectId>, AppError> {
    let Some(list) = non_empty(raw) else {
        return Ok(Vec::new());
    };
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ProjectId>()
                .map_err(|_| AppError::BadRequest(format!("Invalid project id '{}'", s)))
        })
        .collect()
}

fn attachment(rendered: RenderedReport) -> Response {
    let mut response = rendered.bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(rendered.format.mime_type()),
    );
    if rendered.format != ReportFormat::Json {
        let disposition = format!("attachment; filename=\"{}\"", rendered.file_name);
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(CONTENT_DISPOSITION, value);
        }
    }
    response
}

// --- Employee handlers ---

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
    format: Option<String>,
}

async fn handle_week_view(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<DateQuery>,
) -> Result<Json<WeekView>, AppError> {
    let date = parse_date(&query.date, "date")?.unwrap_or_else(|| state.store.clock().today());
    debug!("Week view for Emp={} around {}", actor, date);
    Ok(Json(state.store.week_view(actor, date)?))
}

async fn handle_record_cell(
    State(state): State<AppState>,
    Actor(actor): Actor,
    JsonBody(edit): JsonBody<CellEdit>,
) -> Result<Json<CellOutcome>, AppError> {
    Ok(Json(state.store.record_cell(actor, edit)?))
}

async fn handle_submit_week(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams((year, week)): PathParams<(i32, u32)>,
) -> Result<Json<WeekRecord>, AppError> {
    let week = WeekKey::new(year, week)?;
    Ok(Json(state.store.submit_week(actor, week)?))
}

async fn handle_reopen_week(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams((year, week)): PathParams<(i32, u32)>,
) -> Result<Json<WeekRecord>, AppError> {
    let week = WeekKey::new(year, week)?;
    Ok(Json(state.store.reopen_week(actor, week)?))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    projects: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

async fn handle_history(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Imputation>>, AppError> {
    let filter = HistoryFilter {
        projects: parse_projects(&query.projects)?,
        from: parse_date(&query.from, "from")?,
        to: parse_date(&query.to, "to")?,
    };
    Ok(Json(state.store.history(actor, &filter)?))
}

#[derive(Debug, Deserialize)]
struct MonthQuery {
    year: Option<String>,
    month: Option<String>,
}

async fn handle_monthly_summary(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthlySummary>, AppError> {
    let today = state.store.clock().today();
    let year = parse_number(&query.year, "year")?.unwrap_or(today.year());
    let month = parse_number(&query.month, "month")?.unwrap_or(today.month());
    Ok(Json(state.store.monthly_summary(actor, year, month)?))
}

async fn handle_week_report(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<DateQuery>,
) -> Result<Response, AppError> {
    let date = parse_date(&query.date, "date")?.unwrap_or_else(|| state.store.clock().today());
    let format = parse_choice::<ReportFormat>(&query.format)?;
    let data = state.store.week_report(actor, date)?;
    let settings = state.render_settings();
    let rendered =
        tokio::task::spawn_blocking(move || render_week_report(&data, format, &settings)).await??;
    info!("Weekly report {} served to Emp={}", rendered.file_name, actor);
    Ok(attachment(rendered))
}

// --- Manager handlers ---

async fn handle_dashboard(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> Result<Json<ManagerDashboard>, AppError> {
    Ok(Json(state.store.manager_dashboard(actor)?))
}

async fn handle_decision(
    State(state): State<AppState>,
    Actor(actor): Actor,
    PathParams((employee, year, week)): PathParams<(EmployeeId, i32, u32)>,
    JsonBody(decision): JsonBody<Decision>,
) -> Result<Json<WeekRecord>, AppError> {
    let week = WeekKey::new(year, week)?;
    Ok(Json(state.store.decide_week(actor, employee, week, &decision)?))
}

#[derive(Debug, Deserialize)]
struct ReportingQuery {
    project: Option<String>,
    from: Option<String>,
    to: Option<String>,
    format: Option<String>,
    kind: Option<String>,
}

async fn handle_reporting(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<ReportingQuery>,
) -> Result<Response, AppError> {
    let filter = TeamReportFilter {
        project: parse_number(&query.project, "project")?,
        from: parse_date(&query.from, "from")?,
        to: parse_date(&query.to, "to")?,
    };
    let format = parse_choice::<ReportFormat>(&query.format)?;
    let kind = parse_choice::<ReportKind>(&query.kind)?;
    let report = state.store.team_report(actor, &filter)?;
    let settings = state.render_settings();
    let rendered =
        tokio::task::spawn_blocking(move || render_team_report(&report, kind, format, &settings))
            .await??;
    info!("Team report {} served to Emp={}", rendered.file_name, actor);
    Ok(attachment(rendered))
}

// --- Status ---

#[derive(Debug, serde::Serialize)]
struct StatusBody {
    status: &'static str,
    time: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    stats: StoreStats,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        status: "ok",
        time: state.store.clock().now(),
        stats: state.store.stats(),
    })
}
