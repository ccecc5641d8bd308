//! S1: the scan stage. Runs the rule engine over a project directory or an
//! inline source snippet, deduplicates findings, and applies the request
//! filters.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use privguard_engine::Engine;
use privguard_types::{
    AiUsage, ErrorCategory, Finding, ScanOutput, ScanRequest, StageError, StageId,
};

use crate::framework::{Stage, StageContext};

pub struct ScanStage {
    engine: Arc<Engine>,
}

impl ScanStage {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

impl Stage for ScanStage {
    type Input = ScanRequest;
    type Output = ScanOutput;

    fn id(&self) -> StageId {
        StageId::Scan
    }

    fn input_summary(&self, input: &ScanRequest) -> String {
        match (&input.project_path, &input.inline_source) {
            (Some(path), _) => format!("project_path={}", path.display()),
            (None, Some(inline)) => format!(
                "inline_source({} bytes, .{})",
                inline.content.len(),
                inline.file_type
            ),
            _ => "no source".to_string(),
        }
    }

    fn validate(&self, input: &ScanRequest) -> Result<(), StageError> {
        input.validate_source()
    }

    fn fallback(&self, _input: &ScanRequest) -> ScanOutput {
        ScanOutput {
            rule_stats: self.engine.rule_stats(),
            ..ScanOutput::default()
        }
    }

    fn compute(
        &self,
        _ctx: &StageContext<'_>,
        input: &ScanRequest,
        errors: &mut Vec<StageError>,
        _ai: &mut AiUsage,
    ) -> anyhow::Result<ScanOutput> {
        // Inline sources scan from a per-invocation scratch directory;
        // concurrent runs never share one.
        let mut scratch: Option<tempfile::TempDir> = None;
        let root: PathBuf = match (&input.project_path, &input.inline_source) {
            (Some(path), _) => path.clone(),
            (None, Some(inline)) => {
                let dir = tempfile::Builder::new()
                    .prefix("privguard-inline-")
                    .tempdir()?;
                let file = dir.path().join(format!("test.{}", inline.file_type));
                std::fs::write(&file, &inline.content)?;
                let root = dir.path().to_path_buf();
                scratch = Some(dir);
                root
            }
            _ => unreachable!("validate_source guarantees one source"),
        };

        let run = self.engine.run(&root, &input.options);

        // The scratch dir is removed only after the engine has finished
        // with it; cleanup problems are logged, never raised.
        if let Some(dir) = scratch {
            if let Err(err) = dir.close() {
                tracing::warn!(error = %err, "scratch directory cleanup failed");
            }
        }

        for warning in &run.warnings {
            let category = if warning.starts_with("RULE_INTERNAL") {
                ErrorCategory::RuleInternal
            } else {
                ErrorCategory::IoTransient
            };
            errors.push(StageError::new(category, warning.clone()));
        }

        // Dedup on exact finding_id; first occurrence wins (catalog order).
        let mut seen = std::collections::BTreeSet::new();
        let mut findings: Vec<Finding> = Vec::new();
        for finding in run.findings {
            if !seen.insert(finding.finding_id.clone()) {
                continue;
            }
            // The severity floor applies to countable findings; positive
            // practices are carried regardless.
            if !finding.is_positive && finding.severity < input.options.severity_floor {
                continue;
            }
            findings.push(finding);
        }

        let mut counts_by_severity = BTreeMap::new();
        let mut counts_by_language = BTreeMap::new();
        for finding in findings.iter().filter(|f| f.is_countable()) {
            *counts_by_severity.entry(finding.severity).or_insert(0) += 1;
            *counts_by_language.entry(finding.language).or_insert(0) += 1;
        }

        Ok(ScanOutput {
            findings,
            rule_stats: self.engine.rule_stats(),
            counts_by_severity,
            counts_by_language,
            files_scanned: run.files_scanned,
            warnings: run.warnings,
        })
    }
}
