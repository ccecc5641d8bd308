//! # privguard-engine
//!
//! The rule engine: fans the scanner set and the rule catalog over a
//! directory, evaluating files on a bounded worker pool and reordering
//! results deterministically. Emits both structured findings and the stable
//! envelope strings external tooling consumes.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use privguard_ai::AiClient;
use privguard_config::AiSettings;
use privguard_rules::{Catalog, Rule, RuleMatch};
use privguard_scan::{scan_all, ScanLimits, ScannedFile};
use privguard_types::{
    finding_identity, truncate_excerpt, Finding, Language, RuleStats, ScanOptions,
};

/// Bounded job queue capacity; the scanner iterator blocks when it fills.
const QUEUE_CAPACITY: usize = 256;

/// Heartbeat cadence for long runs.
const HEARTBEAT: Duration = Duration::from_secs(30);

/// One full engine pass over a directory.
#[derive(Debug, Clone, Default)]
pub struct EngineRun {
    /// Envelope strings, in the contract order.
    pub violations: Vec<String>,
    /// Structured findings, same order as `violations`.
    pub findings: Vec<Finding>,
    /// Per-file, non-fatal problems.
    pub warnings: Vec<String>,
    pub files_scanned: usize,
    pub duration_ms: u128,
}

pub struct Engine {
    catalog: Catalog,
    workers: usize,
    ignored_extra: Vec<String>,
    ai_enabled: bool,
    ai_key: Option<String>,
    ai_settings: Option<AiSettings>,
}

impl Engine {
    pub fn new(workers: usize) -> Self {
        Self {
            catalog: Catalog::builtin(),
            workers: workers.max(1),
            ignored_extra: Vec::new(),
            ai_enabled: true,
            ai_key: None,
            ai_settings: None,
        }
    }

    /// Extra ignored-path substrings (`IGNORED_PATH_EXTRA`).
    pub fn set_ignored_extra(&mut self, extra: Vec<String>) {
        self.ignored_extra = extra;
    }

    /// Toggle the remote-AI rule. The nine built-in rules always run.
    pub fn set_ai_enabled(&mut self, enabled: bool) {
        self.ai_enabled = enabled;
        self.rebuild_catalog();
    }

    pub fn set_ai_key(&mut self, key: impl Into<String>) {
        self.ai_key = Some(key.into());
        self.rebuild_catalog();
    }

    pub fn set_ai_config(&mut self, settings: AiSettings) {
        self.ai_settings = Some(settings);
        self.rebuild_catalog();
    }

    fn rebuild_catalog(&mut self) {
        let mut catalog = Catalog::builtin();
        if self.ai_enabled {
            if let Some(mut settings) = self.ai_settings.clone() {
                if let Some(key) = &self.ai_key {
                    settings.api_key = Some(key.clone());
                }
                catalog = catalog.with_remote(Arc::new(AiClient::new(settings)));
            }
        }
        self.catalog = catalog;
    }

    pub fn rule_stats(&self) -> RuleStats {
        self.catalog.stats()
    }

    /// Run the catalog over `root`. Never fails: an empty, missing, or
    /// all-ignored directory produces an empty run, and per-file problems
    /// land in `warnings`.
    pub fn run(&self, root: &Path, options: &ScanOptions) -> EngineRun {
        let started = Instant::now();
        let limits = ScanLimits {
            max_bytes_per_file: options.max_bytes_per_file,
            ignored_extra: self.ignored_extra.clone(),
        };
        let rules: Vec<(usize, Arc<dyn Rule>)> = self
            .catalog
            .rules()
            .iter()
            .enumerate()
            .filter(|(_, rule)| options.rule_filter.matches(rule.id()))
            .map(|(pos, rule)| (pos, Arc::clone(rule)))
            .collect();

        let mut warnings: Vec<String> = Vec::new();
        let mut raws: Vec<RawViolation> = Vec::new();
        let mut files_scanned = 0usize;

        let stop = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut last_beat = Instant::now();
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(200));
                    if last_beat.elapsed() >= HEARTBEAT {
                        tracing::info!(
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "scan heartbeat"
                        );
                        last_beat = Instant::now();
                    }
                }
            });

            let (job_tx, job_rx) = mpsc::sync_channel::<ScannedFile>(QUEUE_CAPACITY);
            let job_rx = Arc::new(Mutex::new(job_rx));
            let (out_tx, out_rx) = mpsc::channel::<FileOutcome>();

            let rules_ref = &rules;
            for _ in 0..self.workers {
                let job_rx = Arc::clone(&job_rx);
                let out_tx = out_tx.clone();
                scope.spawn(move || loop {
                    let job = { job_rx.lock().expect("job queue lock").recv() };
                    let Ok(file) = job else { break };
                    let _ = out_tx.send(evaluate_file(rules_ref, &file));
                });
            }
            drop(out_tx);

            // The bounded queue applies backpressure by blocking this
            // iterator when workers fall behind.
            for item in scan_all(root, &limits) {
                match item {
                    Ok(file) => {
                        if !options.language_filter.matches(file.language) {
                            continue;
                        }
                        files_scanned += 1;
                        if job_tx.send(file).is_err() {
                            break;
                        }
                    }
                    Err(warning) => warnings.push(warning.to_string()),
                }
            }
            drop(job_tx);

            for outcome in out_rx {
                raws.extend(outcome.raws);
                warnings.extend(outcome.warnings);
            }
            stop.store(true, Ordering::Relaxed);
        });

        // The ordering contract: (file_path, line, rule position,
        // pattern_index), independent of worker interleaving.
        raws.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then_with(|| a.m.line.cmp(&b.m.line))
                .then_with(|| a.rule_pos.cmp(&b.rule_pos))
                .then_with(|| a.m.pattern_index.cmp(&b.m.pattern_index))
        });

        let findings: Vec<Finding> = raws.into_iter().map(RawViolation::into_finding).collect();
        let violations = findings.iter().map(format_envelope).collect();

        EngineRun {
            violations,
            findings,
            warnings,
            files_scanned,
            duration_ms: started.elapsed().as_millis(),
        }
    }
}

struct RawViolation {
    file_path: String,
    language: Language,
    truncated: bool,
    rule_pos: usize,
    rule_id: &'static str,
    rule_description: &'static str,
    category: privguard_types::Category,
    m: RuleMatch,
}

impl RawViolation {
    fn into_finding(self) -> Finding {
        let excerpt = truncate_excerpt(&self.m.excerpt);
        Finding {
            finding_id: finding_identity(&self.file_path, self.m.line, self.rule_id, &excerpt),
            file_path: self.file_path,
            line: self.m.line,
            language: self.language,
            rule_id: self.rule_id.to_string(),
            rule_description: self.rule_description.to_string(),
            category: self.category,
            severity: self.m.severity,
            match_excerpt: excerpt,
            description: self.m.description,
            fix_hint: self.m.fix_hint,
            impact: self.m.impact,
            regulation_refs: self.m.regulations,
            is_positive: self.m.is_positive,
            suppressed: false,
            suppressed_reason: None,
            truncated: self.truncated,
            ai_enhanced: false,
            ai_confidence: 0.0,
            ai_model: None,
        }
    }
}

struct FileOutcome {
    raws: Vec<RawViolation>,
    warnings: Vec<String>,
}

fn evaluate_file(rules: &[(usize, Arc<dyn Rule>)], file: &ScannedFile) -> FileOutcome {
    let file_path = file.path.display().to_string();
    let mut raws = Vec::new();
    let mut warnings = Vec::new();

    for (rule_pos, rule) in rules {
        // A defect inside one rule skips that (file, rule) pair only.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            rule.evaluate(&file.content, &file.path)
        }));
        match result {
            Ok(matches) => {
                for m in matches {
                    raws.push(RawViolation {
                        file_path: file_path.clone(),
                        language: file.language,
                        truncated: file.truncated,
                        rule_pos: *rule_pos,
                        rule_id: rule.id(),
                        rule_description: rule.description(),
                        category: rule.category(),
                        m,
                    });
                }
            }
            Err(_) => {
                tracing::warn!(rule = rule.id(), file = %file_path, "rule evaluator failed");
                warnings.push(format!(
                    "RULE_INTERNAL: rule {} failed on {}",
                    rule.id(),
                    file_path
                ));
            }
        }
    }

    FileOutcome { raws, warnings }
}

/// Render a finding into the stable envelope:
/// `[<language>] <absolute_path>:<line> - <rule_description> (found: "<excerpt>")`.
///
/// The description slot carries the rule-level description; the per-pattern
/// subtype detail already travels inside the excerpt where the catalog puts
/// it there.
pub fn format_envelope(finding: &Finding) -> String {
    format!(
        "[{}] {}:{} - {} (found: \"{}\")",
        finding.language.tag(),
        finding.file_path,
        finding.line,
        finding.rule_description,
        escape_excerpt(&finding.match_excerpt),
    )
}

/// Escape an excerpt for the envelope: `"` as `\"`, newlines as `\n`.
/// The excerpt is already truncated to the 512-byte contract cap.
pub fn escape_excerpt(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// A violation parsed back out of the envelope form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedViolation {
    pub language: Language,
    pub file_path: String,
    pub line: u32,
    pub rule_description: String,
    pub excerpt: String,
}

/// Parse an envelope line. The inverse of [`format_envelope`], used by
/// external tooling and exercised by the round-trip tests.
pub fn parse_envelope(envelope: &str) -> Option<ParsedViolation> {
    let rest = envelope.strip_prefix('[')?;
    let (tag, rest) = rest.split_once("] ")?;
    let language = Language::from_tag(tag)?;

    let marker = " (found: \"";
    let body_end = envelope.rfind(marker)?;
    let excerpt_raw = &envelope[body_end + marker.len()..];
    let excerpt_raw = excerpt_raw.strip_suffix("\")")?;

    let offset = envelope.len() - rest.len();
    if body_end < offset {
        return None;
    }
    let body = &envelope[offset..body_end];
    let (location, rule_description) = body.split_once(" - ")?;
    let (file_path, line) = location.rsplit_once(':')?;
    let line: u32 = line.parse().ok()?;

    Some(ParsedViolation {
        language,
        file_path: file_path.to_string(),
        line,
        rule_description: rule_description.to_string(),
        excerpt: unescape_excerpt(excerpt_raw),
    })
}

fn unescape_excerpt(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding_with_excerpt(excerpt: &str) -> Finding {
        Finding {
            finding_id: "id".into(),
            file_path: "/tmp/app/src/login.js".into(),
            line: 42,
            language: Language::JavaScript,
            rule_id: "R1".into(),
            rule_description: "Hardcoded email address".into(),
            category: privguard_types::Category::Pii,
            severity: privguard_types::Severity::Medium,
            match_excerpt: excerpt.into(),
            // Deliberately different from rule_description: the envelope
            // must carry the rule-level text, not the per-match detail.
            description: "Email literal in string assignment".into(),
            fix_hint: String::new(),
            impact: None,
            regulation_refs: Vec::new(),
            is_positive: false,
            suppressed: false,
            suppressed_reason: None,
            truncated: false,
            ai_enhanced: false,
            ai_confidence: 0.0,
            ai_model: None,
        }
    }

    #[test]
    fn envelope_format_matches_contract() {
        let finding = finding_with_excerpt("let e = \"user@example.com\";");
        let envelope = format_envelope(&finding);
        assert_eq!(
            envelope,
            "[JS] /tmp/app/src/login.js:42 - Hardcoded email address (found: \"let e = \\\"user@example.com\\\";\")"
        );
    }

    #[test]
    fn envelope_roundtrip() {
        let finding = finding_with_excerpt("quote \" and\nnewline");
        let envelope = format_envelope(&finding);
        let parsed = parse_envelope(&envelope).unwrap();
        assert_eq!(parsed.language, Language::JavaScript);
        assert_eq!(parsed.file_path, "/tmp/app/src/login.js");
        assert_eq!(parsed.line, 42);
        assert_eq!(parsed.rule_description, "Hardcoded email address");
        assert_eq!(parsed.excerpt, "quote \" and\nnewline");
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(parse_envelope("not an envelope").is_none());
        assert!(parse_envelope("[NOPE] x:1 - y (found: \"z\")").is_none());
        assert!(parse_envelope("[JS] x:abc - y (found: \"z\")").is_none());
    }
}
