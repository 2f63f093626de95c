//! isolab CLI: provisions the schema and runs the scenario catalog.
//!
//! - `isolab migrate [--reset]`: apply pending migrations
//! - `isolab run [--scenario S]... [--level L]... [--repeat N]`: one verdict per run
//! - `isolab capabilities`: the engine's isolation capability table
//!
//! Exit codes: 0 when every run passed, 1 on an error that stopped the
//! command, 2 when a run produced a mismatch or an infrastructure error.

mod commands;
mod format;
mod parse;

use std::process;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use isolab_concurrency::{Coordinator, Fixture, Verdict};
use isolab_core::{Error, HarnessConfig};
use isolab_schema::SchemaProvisioner;
use isolab_session::open_factory;

use commands::build_cli;
use format::{
    format_capabilities, format_error, format_migration, format_run, format_summary, OutputMode,
    RunOutcome, RunRecord,
};
use parse::{load_config, matches_to_action, CliAction, RunRequest};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();
    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let code = match load_config(&matches).and_then(|config| {
        let action = matches_to_action(&matches)?;
        execute(&config, action, mode).map_err(|e| e.to_string())
    }) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            1
        }
    };
    process::exit(code);
}

fn execute(config: &HarnessConfig, action: CliAction, mode: OutputMode) -> Result<i32, Error> {
    match action {
        CliAction::Capabilities => {
            println!("{}", format_capabilities(config.engine()?.capabilities(), mode));
            Ok(0)
        }
        CliAction::Migrate { reset } => {
            let provisioner = SchemaProvisioner::new(open_factory(config)?);
            if reset {
                provisioner.reset()?;
            }
            let report = provisioner.migrate()?;
            println!("{}", format_migration(&report, mode));
            Ok(0)
        }
        CliAction::Run(request) => run_catalog(config, &request, mode),
    }
}

fn run_catalog(config: &HarnessConfig, request: &RunRequest, mode: OutputMode) -> Result<i32, Error> {
    let factory = open_factory(config)?;
    let provisioner = SchemaProvisioner::new(factory.clone());
    provisioner.migrate()?;

    let controller = factory.controller();
    let capabilities = controller.capabilities();
    let coordinator = Coordinator::new(Arc::clone(&factory));
    let fixture = Fixture::default();
    info!(
        target: "isolab::cli",
        engine = %factory.engine(),
        scenarios = request.scenarios.len(),
        levels = request.levels.len(),
        repeat = request.repeat,
        "Running catalog"
    );

    let (mut passed, mut failed, mut errors, mut skipped) = (0, 0, 0, 0);
    for entry in &request.scenarios {
        for &level in &request.levels {
            if let Err(e) = controller.resolve(level) {
                skipped += 1;
                let record = RunRecord {
                    scenario: entry.name.to_string(),
                    level,
                    iteration: 1,
                    outcome: RunOutcome::Skipped {
                        skipped: e.to_string(),
                    },
                };
                println!("{}", format_run(&record, mode));
                continue;
            }
            for iteration in 1..=request.repeat {
                provisioner.truncate()?;
                fixture.seed(factory.as_ref())?;
                let scenario = entry.scenario(&fixture, level).timeouts_from(config).build()?;
                let run = coordinator.run(&scenario);
                let verdict = entry.judge(&scenario, &run, capabilities);
                match &verdict {
                    Verdict::Pass { .. } => passed += 1,
                    Verdict::AnomalyMismatch { .. } => failed += 1,
                    Verdict::InfrastructureError { .. } => errors += 1,
                }
                let record = RunRecord {
                    scenario: entry.name.to_string(),
                    level,
                    iteration,
                    outcome: RunOutcome::Judged {
                        verdict,
                        result: run.ok(),
                    },
                };
                println!("{}", format_run(&record, mode));
            }
        }
    }

    println!("{}", format_summary(passed, failed, errors, skipped, mode));
    Ok(if failed + errors == 0 { 0 } else { 2 })
}
