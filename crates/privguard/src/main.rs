//! `privguard`: scan source repositories for privacy violations and run
//! the five-stage analysis pipeline from the command line.

mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use privguard_config::{Cli, Command, CompletionsArgs, PipelineArgs, RulesArgs, ScanArgs, Settings};
use privguard_engine::Engine;
use privguard_pipeline::Orchestrator;
use privguard_store::{FsStore, MemoryStore, ResultStore};
use privguard_types::{
    InlineSource, RuleFilter, ScanOptions, ScanRequest, Severity,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = Settings::from_env();

    match cli.command {
        Command::Scan(args) => cmd_scan(args, settings),
        Command::Pipeline(args) => cmd_pipeline(args, settings),
        Command::Rules(args) => cmd_rules(args, settings),
        Command::Completions(args) => cmd_completions(args),
    }
}

fn cmd_completions(args: CompletionsArgs) -> Result<()> {
    let mut command = Cli::command();
    clap_complete::generate(args.shell, &mut command, "privguard", &mut std::io::stdout());
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_severity(raw: &str) -> Result<Severity> {
    match raw.to_ascii_uppercase().as_str() {
        "LOW" => Ok(Severity::Low),
        "MEDIUM" => Ok(Severity::Medium),
        "HIGH" => Ok(Severity::High),
        "CRITICAL" => Ok(Severity::Critical),
        other => anyhow::bail!("unknown severity {other:?} (use LOW, MEDIUM, HIGH, CRITICAL)"),
    }
}

fn build_engine(settings: &Settings, ai: bool) -> Engine {
    let mut engine = Engine::new(settings.scan.workers);
    engine.set_ignored_extra(settings.scan.ignored_extra.clone());
    if ai && settings.ai.enabled {
        engine.set_ai_config(settings.ai.clone());
    } else {
        engine.set_ai_enabled(false);
    }
    engine
}

fn cmd_scan(args: ScanArgs, settings: Settings) -> Result<()> {
    let severity_floor = parse_severity(&args.severity_floor)?;
    let engine = build_engine(&settings, !args.no_ai);

    let options = ScanOptions {
        ai_enabled: !args.no_ai,
        max_bytes_per_file: settings.scan.max_bytes_per_file,
        rule_filter: if args.rules.is_empty() {
            RuleFilter::All
        } else {
            RuleFilter::Only(args.rules.iter().cloned().collect())
        },
        severity_floor,
        ..ScanOptions::default()
    };

    let run = engine.run(&args.path, &options);
    let findings: Vec<_> = run
        .findings
        .iter()
        .filter(|f| f.is_positive || f.severity >= severity_floor)
        .collect();

    if args.json {
        let payload = serde_json::json!({
            "findings": findings,
            "files_scanned": run.files_scanned,
            "warnings": run.warnings,
            "duration_ms": run.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for finding in &findings {
            println!("{}", privguard_engine::format_envelope(finding));
        }
        output::print_scan_footer(findings.len(), run.files_scanned, &run.warnings);
    }
    Ok(())
}

fn cmd_pipeline(args: PipelineArgs, mut settings: Settings) -> Result<()> {
    if args.no_ai {
        settings.ai.enabled = false;
    }

    let inline_source = match &args.inline {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Some(InlineSource {
                content,
                file_type: args.file_type.clone(),
            })
        }
        None => None,
    };

    let request = ScanRequest {
        correlation_id: args.correlation_id.clone(),
        project_path: args.path.clone(),
        inline_source,
        options: ScanOptions {
            ai_enabled: !args.no_ai,
            max_bytes_per_file: settings.scan.max_bytes_per_file,
            ..ScanOptions::default()
        },
    };

    let store: Arc<dyn ResultStore> = match args.store.clone().or(settings.store_root.clone()) {
        Some(root) => Arc::new(FsStore::new(root)),
        None => Arc::new(MemoryStore::new()),
    };

    let orchestrator = Orchestrator::new(settings, store);
    let outcome = orchestrator.run(request);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else if args.markdown {
        print!("{}", output::render_markdown(&outcome.report));
    } else {
        output::print_report_summary(&outcome.report, outcome.locator.as_deref(), &outcome.metrics);
    }
    Ok(())
}

fn cmd_rules(args: RulesArgs, settings: Settings) -> Result<()> {
    let engine = build_engine(&settings, true);
    let stats = engine.rule_stats();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{} rules in the catalog", stats.count);
        for info in &stats.rule_descriptions {
            println!("  {:<4} {}", info.rule_id, info.description);
        }
    }
    Ok(())
}
