//! Output → human/json string formatting.
//!
//! Two modes:
//! - **Human** (default): one line per run, e.g. `PASS  dirty_read_rollback  read-uncommitted  #1  mid=50 final=100`
//! - **JSON** (`--json`): one compact JSON object per line

use serde::Serialize;

use isolab_concurrency::{ScenarioResult, Verdict};
use isolab_core::{Capabilities, IsolationLevel, Support};
use isolab_schema::MigrationReport;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Outcome of one scenario run at one level.
#[derive(Debug, Serialize)]
pub struct RunRecord {
    pub scenario: String,
    pub level: IsolationLevel,
    pub iteration: u32,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

/// Either a verdict or the reason the run was skipped.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Judged {
        verdict: Verdict,
        result: Option<ScenarioResult>,
    },
    Skipped {
        skipped: String,
    },
}

/// Format one run record.
pub fn format_run(record: &RunRecord, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json_line(record),
        OutputMode::Human => {
            let head = format!(
                "{:<28} {:<17} #{}",
                record.scenario,
                record.level.name(),
                record.iteration
            );
            match &record.outcome {
                RunOutcome::Skipped { skipped } => format!("SKIP  {}  {}", head, skipped),
                RunOutcome::Judged { verdict, result } => {
                    let observed = result
                        .as_ref()
                        .map(format_observations)
                        .unwrap_or_default();
                    match verdict {
                        Verdict::Pass { .. } => format!("PASS  {}  {}", head, observed),
                        Verdict::AnomalyMismatch { mismatch } => {
                            format!("FAIL  {}  {}", head, mismatch)
                        }
                        Verdict::InfrastructureError { error } => {
                            format!("ERROR {}  {}", head, error)
                        }
                    }
                }
            }
        }
    }
}

fn format_observations(result: &ScenarioResult) -> String {
    result
        .sequence()
        .into_iter()
        .map(|(label, value)| match value {
            Some(v) => format!("{}={}", label, v),
            None => format!("{}=(nil)", label),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format the totals line printed after a `run`.
pub fn format_summary(passed: usize, failed: usize, errors: usize, skipped: usize, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json_line(&serde_json::json!({
            "summary": { "passed": passed, "failed": failed, "errors": errors, "skipped": skipped }
        })),
        OutputMode::Human => format!(
            "{} passed, {} failed, {} errors, {} skipped",
            passed, failed, errors, skipped
        ),
    }
}

/// Format an engine's capability table.
pub fn format_capabilities(capabilities: &Capabilities, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json_line(capabilities),
        OutputMode::Human => {
            let mut lines = vec![format!("engine: {}", capabilities.engine)];
            for (level, support) in &capabilities.levels {
                let how = match support {
                    Support::Native => "native".to_string(),
                    Support::Strengthened(actual) => format!("runs as {}", actual.name()),
                    Support::Unsupported => "unsupported".to_string(),
                };
                let blocks = if capabilities.reads_block_on_writers(*level) {
                    ", reads wait for writers"
                } else {
                    ""
                };
                lines.push(format!("  {:<17} {}{}", level.name(), how, blocks));
            }
            lines.push(format!("dirty reads: {:?}", capabilities.dirty_reads));
            lines.join("\n")
        }
    }
}

/// Format a migration report.
pub fn format_migration(report: &MigrationReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json_line(report),
        OutputMode::Human if report.is_noop() => {
            format!("schema up to date at version {}", report.current_version)
        }
        OutputMode::Human => {
            let mut lines: Vec<String> = report
                .applied
                .iter()
                .map(|version| format!("applied V{}", version))
                .collect();
            lines.push(format!("schema at version {}", report.current_version));
            lines.join("\n")
        }
    }
}

/// Format an error.
pub fn format_error(err: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json_line(&serde_json::json!({ "error": err })),
        OutputMode::Human => format!("(error) {}", err),
    }
}

fn json_line<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}
