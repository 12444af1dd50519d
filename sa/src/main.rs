//! SitAware - live situational-awareness display
//!
//! CLI entry point for running the display and inspecting its setup.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use sitaware::cli::{Cli, Command, OutputFormat, get_log_path};
use sitaware::config::{Config, DisplayMode};
use sitaware::instance::InstanceLock;
use sitaware::report::ShutdownReport;
use sitaware::sequencer::{HostEnvironment, Sequencer, subsystem_registry};
use workthread::Trigger;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_thread_names(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    let simulator = cli.command.simulator_override();
    match cli.command {
        Command::Run { headless, duration, .. } => {
            debug!(headless, ?duration, ?simulator, "main: matched Run command");
            // Overrides apply to this run only
            let profile = config.clone();
            if headless {
                config.display.mode = DisplayMode::Headless;
            }
            if let Some(simulator) = simulator {
                config.device.simulator = simulator;
            }
            cmd_run(config, profile, duration.map(Duration::from_secs))
        }
        Command::Plan => {
            debug!("main: matched Plan command");
            cmd_plan()
        }
        Command::Status { format } => {
            debug!(?format, "main: matched Status command");
            cmd_status(&config, format)
        }
        Command::Config => {
            debug!("main: matched Config command");
            cmd_config(&config)
        }
    }
}

/// Start up, pump the device link until interrupted or the deadline passes, shut down
fn cmd_run(config: Config, profile: Config, duration: Option<Duration>) -> Result<()> {
    debug!(?duration, "cmd_run: called");
    let poll = config.device.sample_interval();
    let env = HostEnvironment::new(InstanceLock::new(config.instance.pid_file.clone()));
    let mut sequencer = Sequencer::new(config, env)
        .context("Invalid subsystem graph")?
        .with_profile(profile);

    if let Err(e) = sequencer.try_startup() {
        eprintln!("{} {}", "Startup failed:".red().bold(), e);
        std::process::exit(1);
    }
    sequencer.after_startup();

    let quit = Arc::new(Trigger::new("app::quit"));
    let handler_quit = quit.clone();
    ctrlc::set_handler(move || handler_quit.trigger()).context("Failed to install signal handler")?;

    let started = Instant::now();
    while !quit.wait(poll) {
        sequencer.poll_devices();
        if duration.is_some_and(|d| started.elapsed() >= d) {
            info!("cmd_run: duration elapsed");
            break;
        }
    }

    let report = sequencer.shutdown();
    print_report(&report);
    if !report.is_clean() {
        warn!(failures = report.failures().count(), "Shutdown finished with failures");
    }
    Ok(())
}

fn print_report(report: &ShutdownReport) {
    for outcome in &report.steps {
        let mark = if outcome.ok { "ok".green() } else { "FAILED".red().bold() };
        match &outcome.error {
            Some(error) => println!("  {:<28} {} ({})", outcome.step, mark, error),
            None => println!("  {:<28} {} {:>5}ms", outcome.step, mark, outcome.elapsed.as_millis()),
        }
    }
    if report.is_clean() {
        println!("{}", "Shutdown clean".green());
    } else {
        println!("{}", "Shutdown finished with failures".yellow());
    }
}

/// Print construction order with each subsystem's dependencies
fn cmd_plan() -> Result<()> {
    debug!("cmd_plan: called");
    let registry = subsystem_registry()?;
    let order = registry.plan()?;
    let entries: Vec<_> = registry.entries().collect();

    println!("{}", "Construction order".bright_cyan().bold());
    for (step, &index) in order.iter().enumerate() {
        let entry = entries[index];
        if entry.deps().is_empty() {
            println!("{:>3}. {}", step + 1, entry.id());
        } else {
            println!("{:>3}. {} {}", step + 1, entry.id(), format!("<- {}", entry.deps().join(", ")).dimmed());
        }
    }
    Ok(())
}

/// Show whether an instance holds the PID file
fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let status = InstanceLock::new(config.instance.pid_file.clone()).status();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!("SitAware Status");
            println!("---------------");
            match status.pid {
                Some(pid) => {
                    println!("Status: {}", "running".green());
                    println!("PID: {}", pid);
                }
                None => println!("Status: {}", "stopped".yellow()),
            }
            println!("PID file: {}", status.pid_file.display());
        }
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", config.to_yaml()?);
    Ok(())
}
