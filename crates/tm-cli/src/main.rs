use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod scenario;

use scenario::{load_scenario, parse_sites, replay, validate_scenario, ReplayOutcome, Scenario};

#[derive(Parser)]
#[command(name = "tm", version = "0.3.0", about = "Offline test-method cycle replay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Replay {
        scenario: PathBuf,
        #[arg(long)]
        force_pass: bool,
        /// Comma separated active sites, overriding the scenario.
        #[arg(long)]
        sites: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Check {
        scenario: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Replay {
            scenario,
            force_pass,
            sites,
            json,
        } => {
            let mut loaded = load_scenario(&scenario)?;
            if force_pass {
                loaded.config.force_pass = true;
            }
            if let Some(raw) = sites.as_deref() {
                loaded.sites = parse_sites(raw)?;
            }
            validate_scenario(&loaded)?;
            let outcome = replay(&loaded)?;
            if json {
                return Ok(Some(json!({
                    "ok": outcome.error.is_none(),
                    "command": "replay",
                    "generated_at": Utc::now().to_rfc3339(),
                    "scenario": scenario.display().to_string(),
                    "outcome": serde_json::to_value(&outcome)?,
                })));
            }
            print_outcome(&loaded, &outcome);
        }
        Commands::Check { scenario, json } => {
            let loaded = load_scenario(&scenario)?;
            validate_scenario(&loaded)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "check",
                    "scenario": scenario.display().to_string(),
                    "sites": loaded.sites,
                    "tests": loaded.tests.len(),
                    "force_pass": loaded.config.force_pass,
                })));
            }
            println!("scenario: {}", scenario.display());
            println!("sites: {:?}", loaded.sites);
            println!("tests: {}", loaded.tests.len());
            println!("force_pass: {}", loaded.config.force_pass);
            println!("ok");
        }
    }
    Ok(None)
}

fn print_outcome(scenario: &Scenario, outcome: &ReplayOutcome) {
    println!("test_name: {}", scenario.config.test_name);
    println!("sites: {:?}", scenario.sites);
    println!("force_pass: {}", scenario.config.force_pass);
    println!("setup_skipped: {}", outcome.setup_skipped);
    for record in &outcome.records {
        println!("[{}] {}", record.level, record.message);
    }
    for host in &outcome.host {
        let sites: Vec<String> = host
            .passed
            .iter()
            .map(|(site, ok)| format!("{}={}", site, if *ok { "pass" } else { "fail" }))
            .collect();
        println!("host {}: {}", host.name, sites.join(" "));
    }
    if let Some(report) = &outcome.report {
        println!("generation: {}", report.generation);
        if let Some(flags) = report.force_pass.flags() {
            for (site, on_pass) in flags.on_pass.iter() {
                let on_fail = flags.on_fail.get(site).unwrap_or_default();
                println!("site {}: set_on_pass={} set_on_fail={}", site, on_pass, on_fail);
            }
        }
        println!("tester_released: {}", report.tester_released);
        println!("device_data_released: {}", report.device_data_released);
    }
    match &outcome.error {
        Some(err) => println!("aborted: {}", err),
        None => println!("completed"),
    }
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Replay { json, .. } | Commands::Check { json, .. } => *json,
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}
