// src/main.rs
use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod aggregation;
mod api;
mod chart;
mod clock;
mod config;
mod directory;
mod error;
mod grid;
mod imputation;
mod pdf;
mod reminders;
mod report;
mod store;
mod week_status;

use api::AppState;
use clock::{Clock, SystemClock};
use config::AppConfig;
use directory::{EmployeeId, ProjectId};
use reminders::{LogNotifier, Notifier, ReminderService, WebhookNotifier};
use report::{render_team_report, render_week_report, RenderSettings, ReportFormat, ReportKind};
use store::{TeamReportFilter, TimesheetStore};

#[derive(Parser, Debug)]
#[command(name = "sgrip", version, about = "Timesheet imputation and weekly validation service")]
struct Cli {
    /// Data file; overrides SGRIP_DATA_PATH.
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Render a report from the data file without starting the server.
    Render {
        #[command(subcommand)]
        target: RenderTarget,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// json, csv or pdf.
    #[arg(long, default_value = "pdf")]
    format: ReportFormat,
    /// Directory the report is written to.
    #[arg(long, short, default_value = ".")]
    out: PathBuf,
}

#[derive(Subcommand, Debug)]
enum RenderTarget {
    /// One employee's weekly report.
    Week {
        #[arg(long)]
        employee: EmployeeId,
        /// Any date inside the week (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Team report for a manager.
    Team {
        #[arg(long)]
        manager: EmployeeId,
        #[arg(long)]
        project: Option<ProjectId>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// detailed or summary.
        #[arg(long, default_value = "detailed")]
        kind: ReportKind,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("Loading SGRIP_* configuration failed")?;
    if let Some(data) = cli.data {
        config.data_path = data;
    }
    info!("Configuration loaded. Data file: {}", config.data_path.display());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Render { target } => render(&config, target),
    }
}

fn load_store(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<TimesheetStore> {
    TimesheetStore::load(&config.data_path, config.hour_policy(), clock).with_context(|| {
        format!(
            "Failed to load {} (start from data/sample.json)",
            config.data_path.display()
        )
    })
}

async fn serve(config: AppConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(load_store(&config, clock.clone())?);

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => {
            info!("Reminders are posted to {}", url);
            Arc::new(WebhookNotifier::new(url).context("Invalid webhook notifier")?)
        }
        None => {
            info!("No webhook configured, reminders are only logged");
            Arc::new(LogNotifier)
        }
    };
    let reminders = ReminderService::new(store.clone(), notifier, config.reminder_hour);
    tokio::spawn(run_reminders(
        reminders,
        clock.clone(),
        config.reminder_interval(),
    ));
    tokio::spawn(run_snapshots(
        store.clone(),
        config.data_path.clone(),
        config.snapshot_interval(),
    ));

    let app = api::router(AppState {
        store: store.clone(),
        chart_scale: config.chart_scale,
    });

    let handle = Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone()));

    let addr = config.bind_addr;
    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load TLS cert/key from {} and {}",
                        cert_path.display(),
                        key_path.display()
                    )
                })?;
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            warn!("No TLS cert/key configured, serving plain HTTP");
            info!("Starting server on http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }
    }

    store
        .save(&config.data_path)
        .context("Final snapshot failed")?;
    info!("Final snapshot written to {}", config.data_path.display());
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: Handle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown requested, draining connections...");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

async fn run_reminders(service: ReminderService, clock: Arc<dyn Clock>, period: Duration) {
    info!("Starting reminder task (every {}s)", period.as_secs());
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        service.run_scheduled_checks(clock.now()).await;
    }
}

async fn run_snapshots(store: Arc<TimesheetStore>, path: PathBuf, period: Duration) {
    info!("Starting snapshot task (every {}s)", period.as_secs());
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately; nothing has changed yet.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let store = store.clone();
        let path = path.clone();
        match tokio::task::spawn_blocking(move || store.save(&path)).await {
            Ok(Ok(())) => debug!("Periodic snapshot written"),
            Ok(Err(e)) => error!("Periodic snapshot failed: {}", e),
            Err(e) => error!("Snapshot task panicked: {}", e),
        }
    }
}

fn render(config: &AppConfig, target: RenderTarget) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = load_store(config, clock.clone())?;
    let settings = RenderSettings {
        chart_scale: config.chart_scale,
        generated_at: clock.now(),
    };

    let (rendered, out) = match target {
        RenderTarget::Week {
            employee,
            date,
            output,
        } => {
            let data = store.week_report(employee, date.unwrap_or_else(|| clock.today()))?;
            (render_week_report(&data, output.format, &settings)?, output.out)
        }
        RenderTarget::Team {
            manager,
            project,
            from,
            to,
            kind,
            output,
        } => {
            let report = store.team_report(manager, &TeamReportFilter { project, from, to })?;
            (
                render_team_report(&report, kind, output.format, &settings)?,
                output.out,
            )
        }
    };

    std::fs::create_dir_all(&out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let path = out.join(&rendered.file_name);
    std::fs::write(&path, &rendered.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} ({} bytes)", path.display(), rendered.bytes.len());
    Ok(())
}
