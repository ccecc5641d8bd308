//! # privguard-config
//!
//! **Tier 3 (Configuration)**
//!
//! Environment-driven runtime settings plus the Clap CLI surface.
//!
//! ## What belongs here
//! * `Settings` and its `from_env` loaders with defaults
//! * Clap `Parser`, `Args`, `Subcommand` structs
//!
//! Every key is optional; an unset or unparsable value falls back to its
//! documented default (a bad value is logged, never fatal).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// AI collaborator settings (the `AI_*` environment surface).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    /// `AI_ENABLED`, default true.
    pub enabled: bool,
    /// `AI_MODEL_ID`; opaque to the pipeline.
    pub model_id: String,
    /// `AI_MAX_TOKENS`, default 2000.
    pub max_tokens: u32,
    /// `AI_TEMPERATURE`, default 0.1.
    pub temperature: f64,
    /// `AI_TIMEOUT_MS`, default 30000.
    pub timeout_ms: u64,
    /// `AI_ENDPOINT`; no default. Without it the adapter always falls back.
    pub endpoint: Option<String>,
    /// `AI_API_KEY`.
    pub api_key: Option<String>,
    /// `AI_TOKEN_BUDGET`: pipeline-wide cap on estimated tokens sent.
    pub token_budget: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model_id: "privguard-analyst-v1".to_string(),
            max_tokens: 2000,
            temperature: 0.1,
            timeout_ms: 30_000,
            endpoint: None,
            api_key: None,
            token_budget: 200_000,
        }
    }
}

impl AiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Scan / engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// `RULE_MAX_BYTES_PER_FILE`, default 1 MiB.
    pub max_bytes_per_file: u64,
    /// `SCAN_WORKERS`, default 4.
    pub workers: usize,
    /// `IGNORED_PATH_EXTRA`: comma-separated extra path substrings to skip.
    pub ignored_extra: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_bytes_per_file: 1_048_576,
            workers: 4,
            ignored_extra: Vec::new(),
        }
    }
}

/// Full runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub ai: AiSettings,
    pub scan: ScanSettings,
    /// `GLOBAL_DEADLINE_MS`, default 900000.
    pub deadline_ms: u64,
    /// `STORE_ROOT`: directory for the filesystem result store.
    pub store_root: Option<PathBuf>,
}

impl Settings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(if self.deadline_ms == 0 {
            900_000
        } else {
            self.deadline_ms
        })
    }

    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Tests use this instead of mutating
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings {
            deadline_ms: 900_000,
            ..Settings::default()
        };

        let ai = AiSettings {
            enabled: parse_or("AI_ENABLED", defaults.ai.enabled, &lookup),
            model_id: lookup("AI_MODEL_ID").unwrap_or(defaults.ai.model_id),
            max_tokens: parse_or("AI_MAX_TOKENS", defaults.ai.max_tokens, &lookup),
            temperature: parse_or("AI_TEMPERATURE", defaults.ai.temperature, &lookup),
            timeout_ms: parse_or("AI_TIMEOUT_MS", defaults.ai.timeout_ms, &lookup),
            endpoint: lookup("AI_ENDPOINT").filter(|s| !s.is_empty()),
            api_key: lookup("AI_API_KEY").filter(|s| !s.is_empty()),
            token_budget: parse_or("AI_TOKEN_BUDGET", defaults.ai.token_budget, &lookup),
        };

        let scan = ScanSettings {
            max_bytes_per_file: parse_or(
                "RULE_MAX_BYTES_PER_FILE",
                defaults.scan.max_bytes_per_file,
                &lookup,
            ),
            workers: parse_or("SCAN_WORKERS", defaults.scan.workers, &lookup).max(1),
            ignored_extra: lookup("IGNORED_PATH_EXTRA")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };

        Settings {
            ai,
            scan,
            deadline_ms: parse_or("GLOBAL_DEADLINE_MS", defaults.deadline_ms, &lookup),
            store_root: lookup("STORE_ROOT").filter(|s| !s.is_empty()).map(PathBuf::from),
        }
    }
}

fn parse_or<T, F>(key: &str, default: T, lookup: &F) -> T
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparsable setting, using default");
                default
            }
        },
    }
}

// --------------------------
// CLI
// --------------------------

/// `privguard`: scan source repositories for privacy and data-protection
/// violations and run the five-stage analysis pipeline.
#[derive(Parser, Debug)]
#[command(name = "privguard", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (repeat for more detail).
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the rule engine only and print violations.
    Scan(ScanArgs),

    /// Run the full pipeline (scan, AI-enhance, compliance, fixes, report).
    Pipeline(PipelineArgs),

    /// Print the rule catalog.
    Rules(RulesArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Directory to scan.
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Emit structured findings as JSON instead of envelope lines.
    #[arg(long)]
    pub json: bool,

    /// Minimum severity to report (LOW, MEDIUM, HIGH, CRITICAL).
    #[arg(long, value_name = "SEVERITY", default_value = "LOW")]
    pub severity_floor: String,

    /// Restrict to specific rule ids. Repeatable.
    #[arg(long = "rule", value_name = "RULE_ID")]
    pub rules: Vec<String>,

    /// Disable the remote AI rule for this run.
    #[arg(long)]
    pub no_ai: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Directory to scan. Mutually exclusive with --inline.
    #[arg(value_name = "PATH", required_unless_present = "inline")]
    pub path: Option<PathBuf>,

    /// Scan a single inline source file instead of a directory.
    #[arg(long, value_name = "FILE", conflicts_with = "path")]
    pub inline: Option<PathBuf>,

    /// Extension for --inline content, e.g. `java`.
    #[arg(long, value_name = "EXT", default_value = "java", requires = "inline")]
    pub file_type: String,

    /// Correlation id; generated when omitted.
    #[arg(long, value_name = "ID")]
    pub correlation_id: Option<String>,

    /// Disable AI enhancement for this run.
    #[arg(long)]
    pub no_ai: bool,

    /// Directory for persisted stage results and reports.
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Print the full report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,

    /// Print the report as Markdown instead of a summary.
    #[arg(long, conflicts_with = "json")]
    pub markdown: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RulesArgs {
    /// Emit the catalog as JSON.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_match_contract() {
        let settings = Settings::from_lookup(|_| None);
        assert!(settings.ai.enabled);
        assert_eq!(settings.ai.max_tokens, 2000);
        assert_eq!(settings.ai.temperature, 0.1);
        assert_eq!(settings.ai.timeout_ms, 30_000);
        assert_eq!(settings.scan.max_bytes_per_file, 1_048_576);
        assert_eq!(settings.scan.workers, 4);
        assert_eq!(settings.deadline_ms, 900_000);
        assert!(settings.scan.ignored_extra.is_empty());
    }

    #[test]
    fn env_overrides_apply() {
        let pairs = [
            ("AI_ENABLED", "false"),
            ("AI_MODEL_ID", "m-42"),
            ("AI_MAX_TOKENS", "512"),
            ("SCAN_WORKERS", "8"),
            ("GLOBAL_DEADLINE_MS", "1000"),
            ("IGNORED_PATH_EXTRA", "vendor, generated ,"),
        ];
        let settings = Settings::from_lookup(lookup_from(&pairs));
        assert!(!settings.ai.enabled);
        assert_eq!(settings.ai.model_id, "m-42");
        assert_eq!(settings.ai.max_tokens, 512);
        assert_eq!(settings.scan.workers, 8);
        assert_eq!(settings.deadline_ms, 1000);
        assert_eq!(settings.scan.ignored_extra, vec!["vendor", "generated"]);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let pairs = [("AI_MAX_TOKENS", "lots"), ("SCAN_WORKERS", "-3")];
        let settings = Settings::from_lookup(lookup_from(&pairs));
        assert_eq!(settings.ai.max_tokens, 2000);
        assert_eq!(settings.scan.workers, 4);
    }

    #[test]
    fn workers_clamped_to_at_least_one() {
        let pairs = [("SCAN_WORKERS", "0")];
        let settings = Settings::from_lookup(lookup_from(&pairs));
        assert_eq!(settings.scan.workers, 1);
    }

    #[test]
    fn cli_parses_pipeline_inline() {
        let cli = Cli::try_parse_from([
            "privguard",
            "pipeline",
            "--inline",
            "snippet.java",
            "--file-type",
            "java",
            "--no-ai",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Pipeline(args) => {
                assert!(args.path.is_none());
                assert!(args.inline.is_some());
                assert!(args.no_ai);
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_path_and_inline_together() {
        let err = Cli::try_parse_from([
            "privguard",
            "pipeline",
            "src/",
            "--inline",
            "snippet.java",
        ]);
        assert!(err.is_err());
    }
}
