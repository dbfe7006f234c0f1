//! Orchestration for the `focus-validate` binary: load → resolve → plan →
//! execute → report. Thin by design — the core crate's public API
//! (`catalog`, `graph`, `plan`, `engine`, `explain`) does all the work;
//! this module only wires CLI input to it and renders the result.

use std::{collections::HashSet, fs};

use colored::Colorize;
use focus_validator_core::{
    catalog::{self, CatalogSource},
    config::Config,
    engine,
    error::{AppResult, catalog_io_error},
    explain,
    graph,
    plan,
    result::{Outcome, Report},
    table::TableHandle
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::Cli;

/// Runs the CLI end to end, returning `true` if the run should exit
/// non-zero (a `FAIL`/`ABORTED` outcome was present and the caller asked
/// to fail on violation).
pub fn run(cli: &Cli) -> AppResult<bool> {
    let mut config = Config::load()?;
    if let Some(prefix) = &cli.target_prefix {
        config.rules.target_prefix = Some(prefix.clone());
    }
    if cli.parallelism > 1 {
        config.engine.parallelism = cli.parallelism;
    }
    if let Some(deadline_ms) = cli.deadline_ms {
        config.engine.deadline_ms = Some(deadline_ms);
    }
    let applicability: HashSet<String> = cli.applicability.iter().cloned().collect();
    let applicability = if applicability.is_empty() {
        config.rules.applicability.clone()
    } else {
        applicability
    };

    let catalog_text = fs::read_to_string(&cli.catalog)
        .map_err(|e| catalog_io_error(&cli.catalog.display().to_string(), e))?;
    let rules = catalog::load_catalog(&cli.catalog_version, CatalogSource::Json(&catalog_text))?;
    eprintln!("{} loaded {} rule(s)", "info:".blue().bold(), rules.len());

    let resolved = graph::resolve(&rules, config.rules.target_prefix.as_deref())?;
    eprintln!("{} resolved {} node(s)", "info:".blue().bold(), resolved.rules.len());

    let built_plan = plan::build(&resolved, &applicability, config.rules.draft_policy)?;
    eprintln!(
        "{} built plan: {} layer(s), {} node(s)",
        "info:".blue().bold(),
        built_plan.layers.len(),
        built_plan.total_len()
    );

    if cli.explain {
        for explanation in explain::explain(&built_plan) {
            println!("{}  {}", explanation.rule_id.bold(), explanation.must_satisfy.dimmed());
        }
        return Ok(false);
    }

    let table = TableHandle::open(&cli.data.display().to_string(), "focus_data")?;

    let progress = ProgressBar::new(built_plan.total_len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    );
    let report = engine::run_with_progress(&built_plan, &table, &config.engine, |completed| {
        progress.inc(completed as u64);
    })?;
    progress.finish_and_clear();

    render(&report);

    Ok(!report.all_clean() && !cli.no_fail_on_violation)
}

fn render(report: &Report) {
    for (rule_id, outcome) in report.sorted_iter() {
        match outcome {
            Outcome::Pass => println!("{} {rule_id}", "PASS".green().bold()),
            Outcome::Fail {
                violation_count,
                error_message,
                ..
            } => println!(
                "{} {rule_id} ({violation_count} violation(s)): {error_message}",
                "FAIL".red().bold()
            ),
            Outcome::SkippedNonApplicable => println!("{} {rule_id} (not applicable)", "SKIP".yellow()),
            Outcome::SkippedDynamic => println!("{} {rule_id} (dynamic)", "SKIP".yellow()),
            Outcome::SkippedUpstream {
                reason
            } => println!("{} {rule_id} ({reason})", "SKIP".yellow()),
            Outcome::Aborted => println!("{} {rule_id}", "ABORTED".red())
        }
    }
    println!(
        "\n{}: {} pass, {} fail, {} skipped (non-applicable), {} skipped (dynamic), {} skipped (upstream), {} aborted",
        "summary".bold(),
        report.summary.pass,
        report.summary.fail,
        report.summary.skipped_non_applicable,
        report.summary.skipped_dynamic,
        report.summary.skipped_upstream,
        report.summary.aborted
    );
}
