//! Lintel CLI - rule-driven source linter with autocorrection

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use colored::Colorize;
use glob::glob;
use lintel::config::Config;
use lintel::output::{JsonFormatter, OutputFormatter, TextFormatter};
use lintel::plugins::ruby::RubyParser;
use lintel::registry::{Registry, RuleSet};
use lintel::runner::{Report, RunOptions, Runner};
use lintel::{Parser, Source};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Exit code for configuration and other fatal errors
const EXIT_FATAL: i32 = 3;

#[derive(ClapParser)]
#[command(
    name = "lintel",
    version,
    about = "Rule-driven source linter with autocorrection",
    long_about = "Lints Ruby-like sources and, with --autocorrect, rewrites them until no correctable issue remains."
)]
struct Cli {
    /// Files, directories or glob patterns to lint
    files: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Apply corrections and write them back to the files
    #[arg(short, long)]
    autocorrect: bool,

    /// Run only these rules or groups (comma-separated)
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Skip these rules or groups (comma-separated)
    #[arg(long, value_delimiter = ',')]
    except: Vec<String>,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Maximum correction rounds per file
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Show per-rule timing statistics
    #[arg(long)]
    stats: bool,

    /// List available rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load_default().context("failed to load configuration")?,
    };
    config.merge_cli(
        cli.autocorrect.then_some(true),
        cli.jobs,
        cli.max_iterations,
        cli.only.clone(),
        cli.except.clone(),
    );
    config.validate()?;

    let registry = Registry::builtin();
    let rules = RuleSet::resolve(&registry, &config)?;

    if cli.list_rules {
        list_rules(&registry, &rules);
        return Ok(0);
    }

    if cli.files.is_empty() {
        bail!("no files specified\n\nUsage: lintel [OPTIONS] [FILES]...\n\nFor more information, try '--help'");
    }

    let parser = RubyParser::new();
    let files = expand_files(&cli.files, &parser)?;
    if files.is_empty() {
        bail!("no files found to lint");
    }
    log::debug!("{} files to lint, {} rules enabled", files.len(), rules.enabled().count());

    let sources = files
        .iter()
        .map(|path| {
            Source::from_file(path, &parser)
                .with_context(|| format!("failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let report = Runner::new(rules, Arc::new(parser))
        .with_options(RunOptions::from_config(&config))
        .run(sources, config.autocorrect)?;

    if config.autocorrect {
        let written = write_corrections(&report)?;
        if cli.verbose && written > 0 {
            eprintln!("Wrote corrections to {} files", written);
        }
    }

    let formatter: Box<dyn OutputFormatter> = match cli.format {
        Format::Text => {
            let mut f = TextFormatter::new().with_timings(cli.stats);
            if cli.no_color {
                f = f.without_color();
            }
            Box::new(f)
        }
        Format::Json => Box::new(JsonFormatter::new().pretty()),
    };
    print!("{}", formatter.format(&report));

    Ok(report.exit_code())
}

/// Expand file arguments: plain files, directories and glob patterns
fn expand_files(patterns: &[String], parser: &dyn Parser) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_dir() {
            for ext in parser.extensions() {
                let nested = format!("{}/**/*.{}", pattern.trim_end_matches('/'), ext);
                collect_glob(&nested, &mut files)?;
            }
        } else {
            collect_glob(pattern, &mut files)?;
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn collect_glob(pattern: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    let paths = glob(pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;
    for entry in paths.flatten() {
        if entry.is_file() {
            files.push(entry);
        }
    }
    Ok(())
}

/// Write every modified source back to its file
fn write_corrections(report: &Report) -> Result<usize> {
    let mut written = 0;
    for source_report in &report.sources {
        let source = &source_report.source;
        if !source.is_modified() {
            continue;
        }
        if let Some(path) = source.path() {
            std::fs::write(path, source.text())
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::debug!("wrote corrections to {}", path.display());
            written += 1;
        }
    }
    Ok(written)
}

fn list_rules(registry: &Registry, rules: &RuleSet) {
    println!("{}", "Available rules:".bold());
    println!();

    let defaults = Mapping::new();
    for entry in registry.entries() {
        let id = entry.id();
        let description = match (entry.build)(&defaults) {
            Ok(rule) => rule.description().to_string(),
            Err(_) => String::new(),
        };
        let (state, severity) = match rules.get(&id) {
            Some(rule) if rule.enabled => ("enabled".green(), rule.severity.to_string()),
            Some(rule) => ("disabled".dimmed(), rule.severity.to_string()),
            None => ("disabled".dimmed(), entry.group.default_severity().to_string()),
        };
        println!(
            "  {:<36} {:<8} {:<8} {}",
            id.cyan(),
            severity,
            state,
            description
        );
    }

    println!();
    println!("{} rules ({} enabled)", registry.len(), rules.enabled().count());
}
