//! ArgMatches → configuration and action.
//!
//! Global flags override the configuration file; the subcommand becomes a
//! [`CliAction`].

use std::path::PathBuf;

use clap::ArgMatches;
use isolab_concurrency::{catalog, CatalogEntry};
use isolab_core::{HarnessConfig, IsolationLevel, MySqlConfig, CONFIG_FILE_NAME};

/// What the user asked for.
#[derive(Debug)]
pub enum CliAction {
    /// Apply migrations, optionally dropping the schema first
    Migrate { reset: bool },
    /// Run catalog scenarios
    Run(RunRequest),
    /// Print the capability table of the configured engine
    Capabilities,
}

/// Scenarios, levels and repetitions of a `run`.
#[derive(Debug)]
pub struct RunRequest {
    pub scenarios: Vec<&'static CatalogEntry>,
    pub levels: Vec<IsolationLevel>,
    pub repeat: u32,
}

/// Load the configuration file and apply `--engine`, `--db` and `--url`.
///
/// A missing file yields the defaults. Selecting `--url` alone implies the
/// MySQL engine.
pub fn load_config(matches: &ArgMatches) -> Result<HarnessConfig, String> {
    let path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let mut config = HarnessConfig::load_or_default(&path)
        .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;

    if let Some(url) = matches.get_one::<String>("url") {
        config.mysql = Some(MySqlConfig { url: url.clone() });
        config.engine = "mysql".to_string();
    }
    if let Some(db) = matches.get_one::<String>("db") {
        config.sqlite.path = PathBuf::from(db);
        config.engine = "sqlite".to_string();
    }
    if let Some(engine) = matches.get_one::<String>("engine") {
        config.engine = engine.clone();
    }
    config.engine().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Translate the subcommand.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction, String> {
    match matches.subcommand() {
        Some(("migrate", sub)) => Ok(CliAction::Migrate {
            reset: sub.get_flag("reset"),
        }),
        Some(("run", sub)) => parse_run(sub).map(CliAction::Run),
        Some(("capabilities", _)) => Ok(CliAction::Capabilities),
        Some((other, _)) => Err(format!("Unknown command '{}'", other)),
        None => Err("No command given".to_string()),
    }
}

fn parse_run(matches: &ArgMatches) -> Result<RunRequest, String> {
    let scenarios = match matches.get_many::<String>("scenario") {
        Some(names) => names
            .map(|n| catalog::by_name(n).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        None => catalog::entries().iter().collect(),
    };
    let levels = match matches.get_many::<String>("level") {
        Some(levels) => levels
            .map(|l| l.parse::<IsolationLevel>().map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        None => IsolationLevel::ALL.to_vec(),
    };
    let repeat = matches.get_one::<u32>("repeat").copied().unwrap_or(1);
    Ok(RunRequest {
        scenarios,
        levels,
        repeat,
    })
}
