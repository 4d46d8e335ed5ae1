//! tsqlscope CLI - T-SQL static analysis tool

mod args;
mod config;
mod output;

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use tsqlscope_core::{AnalysisSettings, Analyzer, Catalog, Issue, Script, Severity};

use crate::args::{Args, Command};
use crate::config::Config;
use crate::output::{FileReport, OutputFormatter};

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);

    match run(args) {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn run(args: Args) -> Result<bool> {
    match args.command {
        Command::Check {
            files,
            config: config_path,
            format,
            disable,
            default_schema,
            default_database,
            jobs,
        } => {
            let config = Config::load(config_path.as_deref())?.merge_with_args(
                &files,
                format,
                &disable,
                default_schema.as_deref(),
                default_database.as_deref(),
            );
            let output_format = config.output_format()?;

            let paths = expand_patterns(&config.files)?;
            if paths.is_empty() {
                miette::bail!(
                    "No script files specified. Use positional arguments or configure in tsqlscope.toml"
                );
            }

            let sources = read_sources(&paths)?;
            let scripts: Vec<Script> = sources
                .iter()
                .map(|(path, source)| Script::parse(path.clone(), source))
                .collect();

            // every script must be in the catalog before any is analyzed
            let catalog = Catalog::build(&scripts, &config.analysis);
            tracing::debug!(objects = catalog.object_count(), "catalog built");

            let jobs = jobs
                .or_else(|| std::thread::available_parallelism().ok().map(NonZeroUsize::get))
                .unwrap_or(1);
            let issues = analyze_parallel(&scripts, &catalog, &config.analysis, jobs);

            let mut total_errors = 0;
            let mut total_warnings = 0;
            let reports: Vec<FileReport<'_>> = sources
                .iter()
                .zip(issues)
                .map(|((path, source), issues)| {
                    let issues: Vec<Issue> = issues
                        .into_iter()
                        .filter(|i| !config.is_disabled(i.code(), i.kind.name()))
                        .collect();
                    for issue in &issues {
                        match issue.severity {
                            Severity::Error => total_errors += 1,
                            Severity::Warning => total_warnings += 1,
                            Severity::Info => {}
                        }
                    }
                    FileReport {
                        file: path.display().to_string(),
                        source,
                        issues,
                    }
                })
                .collect();

            OutputFormatter::new(output_format).print_reports(&reports)?;

            if !args.quiet {
                if total_errors > 0 || total_warnings > 0 {
                    eprintln!();
                    eprintln!(
                        "Found {} error(s), {} warning(s) in {} file(s)",
                        total_errors,
                        total_warnings,
                        scripts.len()
                    );
                } else {
                    eprintln!("All {} file(s) passed validation", scripts.len());
                }
            }

            Ok(total_errors > 0)
        }

        Command::Catalog {
            files,
            config: config_path,
            default_schema,
            default_database,
            json,
        } => {
            let config = Config::load(config_path.as_deref())?.merge_with_args(
                &files,
                None,
                &[],
                default_schema.as_deref(),
                default_database.as_deref(),
            );
            let paths = expand_patterns(&config.files)?;
            let sources = read_sources(&paths)?;
            let scripts: Vec<Script> = sources
                .iter()
                .map(|(path, source)| Script::parse(path.clone(), source))
                .collect();
            for script in scripts.iter().filter(|s| !s.is_parsed()) {
                if let Some(failure) = script.failure() {
                    tracing::warn!(path = %script.display_path(), error = %failure, "skipped unparseable script");
                }
            }
            let catalog = Catalog::build(&scripts, &config.analysis);

            if json {
                println!("{}", serde_json::to_string_pretty(&catalog).into_diagnostic()?);
            } else {
                print_catalog(&catalog);
            }

            Ok(false)
        }

        Command::Tree { file } => {
            let content = fs::read_to_string(&file).into_diagnostic()?;
            match tsqlscope_core::parse_script(&content) {
                Ok(tree) => {
                    print!("{}", tree.dump());
                    Ok(false)
                }
                Err(e) => {
                    eprintln!("Parse error: {}", e);
                    Ok(true)
                }
            }
        }
    }
}

/// Analyze scripts on `jobs` scoped threads sharing the read-only catalog.
/// Results come back in script order.
fn analyze_parallel(
    scripts: &[Script],
    catalog: &Catalog,
    settings: &AnalysisSettings,
    jobs: usize,
) -> Vec<Vec<Issue>> {
    let analyzer = Analyzer::new(catalog, settings);
    let chunk_size = scripts.len().div_ceil(jobs.max(1)).max(1);

    std::thread::scope(|s| {
        let handles: Vec<_> = scripts
            .chunks(chunk_size)
            .map(|chunk| {
                s.spawn(move || {
                    chunk
                        .iter()
                        .map(|script| {
                            let mut issues = Vec::new();
                            analyzer.check(script, &mut issues);
                            issues
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(issues) => issues,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Expand paths, directories and glob patterns into a sorted list of script files
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_dir() {
            let pattern = format!("{}/**/*.sql", pattern.trim_end_matches('/'));
            paths.extend(glob::glob(&pattern).into_diagnostic()?.flatten());
        } else if pattern.contains(['*', '?', '[']) {
            paths.extend(glob::glob(pattern).into_diagnostic()?.flatten());
        } else {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn read_sources(paths: &[PathBuf]) -> Result<Vec<(PathBuf, String)>> {
    paths
        .iter()
        .map(|path| {
            let source = fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            Ok((path.clone(), source))
        })
        .collect()
}

fn print_catalog(catalog: &Catalog) {
    println!("Catalog Information:");
    println!("====================");
    for database in catalog.databases() {
        println!("\nDatabase: {}", database.name);
        for schema in database.schemas.values() {
            println!("  Schema: {}", schema.name);
            for table in schema.tables.values() {
                println!("    Table: {}", table.name.name);
                for column in &table.columns {
                    println!(
                        "      - {} {}",
                        column.name,
                        column.data_type.as_deref().unwrap_or("(computed)")
                    );
                }
            }
            for view in schema.views.values() {
                println!("    View: {} ({})", view.name.name, view.columns.join(", "));
            }
            for (label, routines) in [("Procedure", &schema.procedures), ("Function", &schema.functions)] {
                for routine in routines.values() {
                    let parameters: Vec<String> = routine
                        .parameters
                        .iter()
                        .map(|p| {
                            let output = if p.output { " OUTPUT" } else { "" };
                            format!("{}{}", p.name, output)
                        })
                        .collect();
                    println!("    {}: {}({})", label, routine.name.name, parameters.join(", "));
                }
            }
            for synonym in schema.synonyms.values() {
                println!("    Synonym: {} -> {}", synonym.name.name, synonym.target);
            }
        }
    }
}
