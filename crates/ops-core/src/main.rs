//! opsctl - Backend Supervisor CLI
//!
//! The main entry point for opsctl, handling:
//! - Backend lifecycle (up/down/restart) with ownership gating
//! - Health probing and bounded health waits
//! - Endpoint smoke tests and deep-learning job smoke
//! - Doctor diagnosis with reports and tickets

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use ops_common::error::{format_error_human, StructuredError};
use ops_common::{Error, OutputFormat, Result};
use ops_core::config::{self, OpsConfig};
use ops_core::doctor::{self, DoctorOptions};
use ops_core::exit_codes::ExitCode;
use ops_core::health;
use ops_core::inspect::{detect_inspector, ProcessInspector};
use ops_core::job::{self, FinalStatus, JobSpec};
use ops_core::lifecycle::{FileRecordStore, LifecycleController};
use ops_core::logging::{self, LogConfig, LogFormat, LogLevel};
use ops_core::probe::{join_url, HttpProbe};
use ops_core::report;
use serde_json::json;
use tracing::{debug, info};

/// opsctl - safe backend lifecycle, health, and diagnostics
#[derive(Parser)]
#[command(name = "opsctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Backend base URL (overrides --host/--port for probing)
    #[arg(long, global = true, env = "OPSCTL_URL")]
    url: Option<String>,

    /// Backend host
    #[arg(long, global = true, default_value = config::DEFAULT_HOST)]
    host: String,

    /// Backend port
    #[arg(long, global = true, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Health wait timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    /// Backend service checkout root (contains .venv/)
    #[arg(long, global = true, env = "OPSCTL_SERVICE_ROOT")]
    service_root: Option<PathBuf>,

    /// State directory (pid record and backend logs)
    #[arg(long, global = true, env = "OPSCTL_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Directory for doctor reports and tickets
    #[arg(long, global = true, env = "OPSCTL_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    format: OutputFormat,

    /// Log level (trace|debug|info|warn|error|off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human|jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Health + port ownership snapshot
    Status,

    /// Clear the port, start the backend, wait for health
    Up(ForceArgs),

    /// Stop the backend and free the port
    Down(ForceArgs),

    /// Down then up
    Restart(ForceArgs),

    /// Single health probe
    Health,

    /// Poll /health until healthy or the timeout passes
    WaitHealthy,

    /// Fast endpoint smoke, optionally followed by a deep-learning job smoke
    Smoke(SmokeArgs),

    /// Full ordered diagnosis with report and tickets
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
struct ForceArgs {
    /// Terminate port owners outside the allowlist
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Ticker symbol for the training job
    #[arg(long, default_value = "AAPL")]
    symbol: String,

    /// Model type for the training job
    #[arg(long, default_value = "lstm")]
    model_type: String,

    /// Training epochs
    #[arg(long, default_value_t = 1)]
    epochs: u32,

    /// Deadline in seconds for the job to reach a terminal state
    #[arg(long, default_value_t = 600)]
    job_timeout: u64,
}

impl JobArgs {
    fn spec(&self) -> JobSpec {
        JobSpec {
            symbol: self.symbol.clone(),
            model_type: self.model_type.clone(),
            epochs: self.epochs,
        }
    }
}

#[derive(Args, Debug)]
struct SmokeArgs {
    #[command(flatten)]
    job: JobArgs,

    /// Skip the deep-learning job smoke
    #[arg(long)]
    no_dl_job: bool,
}

#[derive(Args, Debug)]
struct DoctorArgs {
    #[command(flatten)]
    job: JobArgs,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    logging::init_logging(&log_config);
    let run_id = logging::generate_run_id();
    debug!(%run_id, "opsctl starting");

    let config = build_config(&cli.global);
    let code = match run(&cli, &config) {
        Ok(code) => code,
        Err(err) => {
            match cli.global.format {
                OutputFormat::Json => eprintln!("{}", StructuredError::from(&err).to_json()),
                OutputFormat::Text => eprintln!("{}", format_error_human(&err, use_color())),
            }
            exit_code_for(&err)
        }
    };
    std::process::exit(code.as_i32());
}

fn use_color() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

fn build_config(global: &GlobalOpts) -> OpsConfig {
    let mut config = OpsConfig::new(global.host.clone(), global.port);
    if let Some(root) = &global.service_root {
        config = config.with_service_root(root.clone());
    }
    if let Some(dir) = &global.state_dir {
        config.state_dir = dir.clone();
    }
    if let Some(dir) = &global.reports_dir {
        config.reports_dir = dir.clone();
    }
    if let Some(url) = &global.url {
        config = config.with_base_url(url.trim_end_matches('/'));
    }
    config.health_wait = Duration::from_secs(global.timeout.max(1));
    config
}

/// Usage and persisted-state problems are the caller's to fix; everything
/// else is a handled operational failure.
fn exit_code_for(err: &Error) -> ExitCode {
    match err.category() {
        ops_common::error::ErrorCategory::Config => ExitCode::UsageError,
        _ => ExitCode::CheckFailed,
    }
}

fn run(cli: &Cli, config: &OpsConfig) -> Result<ExitCode> {
    let probe = HttpProbe::new();
    let inspector = detect_inspector();
    let store = FileRecordStore::new(config.pid_file());
    let controller = LifecycleController::new(config, inspector.as_ref(), &store);
    let format = cli.global.format;

    match &cli.command {
        Commands::Status => cmd_status(&controller, &probe, format),
        Commands::Up(args) => cmd_up(&controller, &probe, config, args.force),
        Commands::Down(args) => cmd_down(&controller, args.force),
        Commands::Restart(args) => {
            cmd_down(&controller, args.force)?;
            cmd_up(&controller, &probe, config, args.force)
        }
        Commands::Health => cmd_health(&probe, config, format),
        Commands::WaitHealthy => cmd_wait_healthy(&probe, config, format),
        Commands::Smoke(args) => cmd_smoke(&probe, config, args),
        Commands::Doctor(args) => {
            cmd_doctor(&probe, inspector.as_ref(), config, args, format)
        }
    }
}

fn status_line(tag: &str, message: &str) {
    println!("[{}] {}", tag, message);
}

fn cmd_status(
    controller: &LifecycleController,
    probe: &HttpProbe,
    format: OutputFormat,
) -> Result<ExitCode> {
    let report = controller.status(probe)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Status Summary");
            println!(
                "  health: {} ({})",
                if report.health_ok { "PASS" } else { "FAIL" },
                report.health_detail
            );
            if report.owners.is_empty() {
                println!("  owner_pids: none");
            } else {
                for owner in &report.owners {
                    println!("  pid={} cmdline={}", owner.pid, owner.command_line);
                    println!(
                        "  pid={} managed_owner={}",
                        owner.pid,
                        if owner.safe_to_terminate { "yes" } else { "no" }
                    );
                }
            }
            match report.recorded_pid {
                Some(pid) => println!(
                    "  recorded_pid: {} ({})",
                    pid,
                    if report.recorded_alive { "alive" } else { "stale" }
                ),
                None => println!("  recorded_pid: none"),
            }
        }
    }

    Ok(if report.health_ok { ExitCode::Clean } else { ExitCode::CheckFailed })
}

fn cmd_up(
    controller: &LifecycleController,
    probe: &HttpProbe,
    config: &OpsConfig,
    force: bool,
) -> Result<ExitCode> {
    let owners = controller.owners()?;
    if !owners.is_empty() {
        info!(port = config.port, "clearing port before start");
        controller.stop(force)?;
    }

    let record = controller.start()?;
    status_line("INFO", &format!("started backend pid={}", record.pid));

    let wait = health::wait_healthy(probe, &config.base_url, config.health_wait);
    if wait.ok {
        status_line("PASS", &format!("backend healthy in {:.1}s", wait.elapsed.as_secs_f64()));
        return Ok(ExitCode::Clean);
    }

    status_line(
        "FAIL",
        &format!(
            "backend did not become healthy in {:.1}s ({})",
            wait.elapsed.as_secs_f64(),
            wait.last_detail
        ),
    );
    status_line("WARN", "latest backend log tail:");
    for line in tail_lines(&record.log_path, 30) {
        println!("  {}", line);
    }
    Ok(ExitCode::CheckFailed)
}

fn cmd_down(controller: &LifecycleController, force: bool) -> Result<ExitCode> {
    let outcome = controller.stop(force)?;
    if outcome.terminated.is_empty() {
        status_line("PASS", "down completed (nothing to stop)");
    } else {
        status_line("PASS", &format!("down completed, terminated pids {:?}", outcome.terminated));
    }
    if outcome.stale_record_cleared {
        status_line("INFO", "cleared stale pid record");
    }
    Ok(ExitCode::Clean)
}

fn cmd_health(probe: &HttpProbe, config: &OpsConfig, format: OutputFormat) -> Result<ExitCode> {
    let (ok, detail) = health::health_once(probe, &config.base_url);
    match format {
        OutputFormat::Json => println!("{}", json!({ "ok": ok, "detail": detail })),
        OutputFormat::Text => {
            status_line(if ok { "PASS" } else { "FAIL" }, &format!("GET /health ({})", detail))
        }
    }
    Ok(if ok { ExitCode::Clean } else { ExitCode::CheckFailed })
}

fn cmd_wait_healthy(
    probe: &HttpProbe,
    config: &OpsConfig,
    format: OutputFormat,
) -> Result<ExitCode> {
    let wait = health::wait_healthy(probe, &config.base_url, config.health_wait);
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "ok": wait.ok,
                "elapsed_seconds": wait.elapsed.as_secs_f64(),
                "detail": wait.last_detail,
            })
        ),
        OutputFormat::Text => {
            if wait.ok {
                status_line("PASS", &format!("healthy in {:.1}s", wait.elapsed.as_secs_f64()));
            } else {
                status_line(
                    "FAIL",
                    &format!(
                        "not healthy after {:.1}s ({})",
                        wait.elapsed.as_secs_f64(),
                        wait.last_detail
                    ),
                );
            }
        }
    }
    Ok(if wait.ok { ExitCode::Clean } else { ExitCode::CheckFailed })
}

fn cmd_smoke(probe: &HttpProbe, config: &OpsConfig, args: &SmokeArgs) -> Result<ExitCode> {
    let base = &config.base_url;

    let wait = health::wait_healthy(probe, base, config.health_wait);
    if !wait.ok {
        status_line(
            "FAIL",
            &format!(
                "GET /health failed after {:.1}s ({})",
                wait.elapsed.as_secs_f64(),
                wait.last_detail
            ),
        );
        return Ok(ExitCode::CheckFailed);
    }
    status_line("PASS", "GET /health");

    let result = probe.get(&join_url(base, "/api/status"), Duration::from_secs(15));
    if !result.success {
        status_line("FAIL", &format!("GET /api/status failed ({})", result.error));
        return Ok(ExitCode::CheckFailed);
    }
    status_line("PASS", "GET /api/status");

    // Optional endpoint on older backends; 404 is a warning, not a failure.
    let result = probe.get(&join_url(base, "/api/universe/list"), Duration::from_secs(20));
    if result.success {
        status_line("PASS", "GET /api/universe/list");
    } else if result.status_code == Some(404) {
        status_line("WARN", "GET /api/universe/list returned 404");
    } else {
        status_line("FAIL", &format!("GET /api/universe/list failed ({})", result.error));
        return Ok(ExitCode::CheckFailed);
    }

    if args.no_dl_job {
        return Ok(ExitCode::Clean);
    }

    let handle = job::enqueue(probe, base, &args.job.spec())?;
    status_line("PASS", &format!("deep-learning job enqueued id={}", handle.job_id));

    let deadline = Duration::from_secs(args.job.job_timeout.max(10));
    let outcome = job::await_terminal(
        probe,
        base,
        &handle.job_id,
        deadline,
        Duration::from_secs(2),
    );

    println!("DL Smoke Summary");
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "job_id": handle.job_id,
            "status": outcome.final_status.as_str(),
            "error": outcome.error_text,
            "artifact_path": outcome.artifact_path,
            "poll_count": outcome.poll_count,
        }))?
    );
    if !outcome.log_lines.is_empty() {
        println!("Last job log lines");
        for line in outcome.log_lines.iter().rev().take(20).rev() {
            println!("  {}", line);
        }
    }

    if outcome.final_status == FinalStatus::Success {
        status_line("PASS", "deep-learning smoke passed");
        Ok(ExitCode::Clean)
    } else {
        status_line("FAIL", "deep-learning smoke failed");
        Ok(ExitCode::CheckFailed)
    }
}

fn cmd_doctor(
    probe: &HttpProbe,
    inspector: &dyn ProcessInspector,
    config: &OpsConfig,
    args: &DoctorArgs,
    format: OutputFormat,
) -> Result<ExitCode> {
    let options = DoctorOptions {
        spec: args.job.spec(),
        job_timeout: Duration::from_secs(args.job.job_timeout),
        poll_interval: Duration::from_secs(2),
    };

    let mut diagnosis = doctor::run_checks(probe, &config.base_url, &options);

    let tickets_dir = config.reports_dir.join("tickets");
    let created = report::generate_tickets(&diagnosis, inspector, config.port, &tickets_dir)?;
    diagnosis.tickets = created.iter().map(|path| path.display().to_string()).collect();

    let (json_path, txt_path) = report::write_report(&diagnosis, &config.reports_dir)?;
    info!(json = %json_path.display(), txt = %txt_path.display(), "doctor report written");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diagnosis)?),
        OutputFormat::Text => print!("{}", report::format_report_text(&diagnosis)),
    }

    Ok(if diagnosis.summary.ok { ExitCode::Clean } else { ExitCode::CheckFailed })
}

/// Last `count` lines of a log file; empty when the file is unreadable.
fn tail_lines(path: &Path, count: usize) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].iter().map(|line| line.to_string()).collect()
}
