// src/main.rs

use chrono::{Datelike, Duration, Local, NaiveDate};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;

// Ids from backend/sgrip-core/data/sample.json
const EMPLOYEE_ID: u32 = 1;
const MANAGER_ID: u32 = 10;
const PROJECT_ID: u32 = 100;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    employees: usize,
    imputations: usize,
    pending_weeks: usize,
}

#[derive(Debug, Deserialize)]
struct WeekKey {
    year: i32,
    week: u32,
}

#[derive(Debug, Deserialize)]
struct WeekView {
    week: WeekKey,
    status: String,
    editable: bool,
    totals: Value,
}

struct Api {
    client: Client,
    base_url: String,
}

impl Api {
    async fn call(
        &self,
        method: Method,
        path: &str,
        actor: Option<u32>,
        body: Option<Value>,
    ) -> Result<Response, Box<dyn Error>> {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(id) = actor {
            request = request.header("x-employee-id", id.to_string());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        Ok(request.send().await?)
    }

    async fn report(&self, label: &str, response: Response) -> Result<Option<Value>, Box<dyn Error>> {
        let status = response.status();
        if status.is_success() {
            let body = response.json::<Value>().await?;
            println!("{} -> {}", label, status);
            Ok(Some(body))
        } else {
            println!("{} -> {}: {}", label, status, response.text().await?);
            Ok(None)
        }
    }
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SGRIP_BASE_URL").ok())
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    let api = Api {
        client: Client::new(),
        base_url: base_url.trim_end_matches('/').to_string(),
    };
    let monday = monday_of(Local::now().date_naive());

    // Test 1: Liveness
    println!("\n🔍 Testing status endpoint...");
    let status = api
        .call(Method::GET, "/status", None, None)
        .await?
        .json::<StatusResponse>()
        .await?;
    println!("Status response: {:?}", status);

    // Test 2: Identity is required
    println!("\n🔍 Testing a request without x-employee-id...");
    let anonymous = api.call(Method::GET, "/api/employee/week", None, None).await?;
    println!("Anonymous request status: {} (expected 401)", anonymous.status());

    // Test 3: Enter hours for Monday and Tuesday
    println!("\n🔍 Recording cells for employee {}...", EMPLOYEE_ID);
    for (offset, hours) in [(0, "7.5"), (1, "8")] {
        let date = monday + Duration::days(offset);
        let cell = json!({
            "activity": { "kind": "project", "id": PROJECT_ID },
            "category": "project",
            "date": date,
            "hours": hours,
            "description": "Smoke test",
        });
        let response = api
            .call(Method::PUT, "/api/employee/cells", Some(EMPLOYEE_ID), Some(cell))
            .await?;
        api.report(&format!("PUT cell {}", date), response).await?;
    }

    // Test 4: Week view
    println!("\n🔍 Fetching the current week...");
    let view = api
        .call(
            Method::GET,
            &format!("/api/employee/week?date={}", monday),
            Some(EMPLOYEE_ID),
            None,
        )
        .await?
        .json::<WeekView>()
        .await?;
    println!(
        "Week {}-W{:02}: status={}, editable={}, total={}",
        view.week.year, view.week.week, view.status, view.editable, view.totals["total_hours"]
    );

    // Test 5: History and monthly summary
    println!("\n🔍 Testing history and monthly summary...");
    let history = api
        .call(
            Method::GET,
            &format!("/api/employee/history?projects={}", PROJECT_ID),
            Some(EMPLOYEE_ID),
            None,
        )
        .await?;
    if let Some(entries) = api.report("History", history).await? {
        println!("  {} entries on project {}", entries.as_array().map_or(0, |a| a.len()), PROJECT_ID);
    }
    let summary = api
        .call(Method::GET, "/api/employee/monthly-summary", Some(EMPLOYEE_ID), None)
        .await?;
    if let Some(body) = api.report("Monthly summary", summary).await? {
        println!("  {} hours, value {}", body["total_hours"], body["total_value"]);
    }

    // Test 6: Submit, reject, reopen
    println!("\n🔍 Testing the validation workflow...");
    let week_path = format!("{}/{}", view.week.year, view.week.week);
    let submit = api
        .call(
            Method::POST,
            &format!("/api/employee/weeks/{}/submit", week_path),
            Some(EMPLOYEE_ID),
            None,
        )
        .await?;
    api.report("Submit", submit).await?;

    let dashboard = api
        .call(Method::GET, "/api/manager/dashboard", Some(MANAGER_ID), None)
        .await?;
    if let Some(body) = api.report("Manager dashboard", dashboard).await? {
        println!(
            "  {} pending weeks, {} overdue projects",
            body["pending_weeks"].as_array().map_or(0, |a| a.len()),
            body["overdue_projects"]
        );
    }

    let decision = json!({ "action": "reject", "comment": "Smoke test rejection" });
    let decide = api
        .call(
            Method::POST,
            &format!("/api/manager/weeks/{}/{}/decision", EMPLOYEE_ID, week_path),
            Some(MANAGER_ID),
            Some(decision),
        )
        .await?;
    api.report("Reject", decide).await?;

    let reopen = api
        .call(
            Method::POST,
            &format!("/api/employee/weeks/{}/reopen", week_path),
            Some(EMPLOYEE_ID),
            None,
        )
        .await?;
    api.report("Reopen", reopen).await?;

    // Test 7: Report downloads
    println!("\n🔍 Testing report downloads...");
    for (label, actor, path) in [
        (
            "Weekly PDF",
            EMPLOYEE_ID,
            format!("/api/employee/week/report?date={}&format=pdf", monday),
        ),
        (
            "Team CSV",
            MANAGER_ID,
            "/api/manager/reporting?format=csv".to_string(),
        ),
        (
            "Team summary PDF",
            MANAGER_ID,
            "/api/manager/reporting?format=pdf&kind=summary".to_string(),
        ),
    ] {
        let response = api.call(Method::GET, &path, Some(actor), None).await?;
        let status = response.status();
        let disposition = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let bytes = response.bytes().await?;
        println!("{} -> {} ({} bytes, {})", label, status, bytes.len(), disposition);
    }

    println!("\n✅ Testing complete!");
    Ok(())
}
