//! S5: the report stage. Compiles the cumulative dossier into the terminal
//! `Report`, persists it as a blob, and returns both the object and the
//! locator. `compose_report` is also what the orchestrator uses to build a
//! PARTIAL report when the deadline trips before this stage runs.

use privguard_types::{
    highest_severity, status_for_score, AiUsage, ComplianceAnalysis, ComplianceStatus,
    EnhanceOutput, ErrorCategory, ExecutiveSummary, FixReport, Report, ReportMetadata,
    RiskAssessment, RiskLevel, ScanOutput, Severity, StageError, StageId, SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::framework::{now_ms, Stage, StageContext};

pub const AGENT_NAMES: [&str; 5] = [
    "ScanAgent",
    "AiEnhanceAgent",
    "ComplianceAgent",
    "FixSuggestAgent",
    "ReportAgent",
];

/// The cumulative dossier the orchestrator hands the report stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportInputs {
    pub scan: ScanOutput,
    pub enhanced: EnhanceOutput,
    pub compliance: ComplianceAnalysis,
    pub fixes: FixReport,
    pub project_path: Option<String>,
    pub ai_used: bool,
    pub degraded_reasons: Vec<ErrorCategory>,
    pub completed_stages: Vec<StageId>,
}

/// Build the report from whatever stages completed. Pure; no I/O.
pub fn compose_report(correlation_id: &str, inputs: &ReportInputs) -> Report {
    let findings = &inputs.enhanced.findings;
    let total_violations = findings.iter().filter(|f| f.is_countable()).count();
    let positive_practices = findings.iter().filter(|f| f.is_positive).count();
    let high_severity_count = findings
        .iter()
        .filter(|f| f.is_countable() && f.severity >= Severity::High)
        .count();

    // When the compliance stage never ran, score straight from findings so
    // a partial report is not pinned at zero.
    let compliance_score = if inputs.completed_stages.contains(&StageId::Compliance) {
        inputs.compliance.compliance_score
    } else {
        privguard_types::compliance_score(
            findings
                .iter()
                .filter(|f| f.is_countable())
                .map(|f| f.severity),
        )
    };
    let deadline_tripped = inputs
        .degraded_reasons
        .contains(&ErrorCategory::DeadlineExceeded);
    let input_invalid = inputs
        .degraded_reasons
        .contains(&ErrorCategory::InputInvalid);

    // Status severity order: DEADLINE_EXCEEDED > INPUT_INVALID > score.
    let status = if deadline_tripped {
        ComplianceStatus::Partial
    } else if input_invalid {
        ComplianceStatus::NonCompliant
    } else {
        status_for_score(compliance_score)
    };

    let risk_assessment = inputs.compliance.risk_assessment.clone().unwrap_or_default();
    let risk_level = highest_severity(findings)
        .map(RiskLevel::from)
        .unwrap_or(RiskLevel::Low);

    let message = if input_invalid {
        "Invalid scan request; nothing was scanned".to_string()
    } else if deadline_tripped {
        format!(
            "Deadline exceeded after {} of {} stages",
            inputs.completed_stages.len(),
            StageId::ALL.len()
        )
    } else if total_violations == 0 {
        "No privacy violations detected".to_string()
    } else {
        format!("Found {total_violations} privacy violations requiring attention")
    };

    let mut action_items = Vec::new();
    if high_severity_count > 0 {
        action_items.push("Immediately address high-severity violations".to_string());
    }
    if compliance_score < 80 {
        action_items.push("Improve compliance score through systematic fixes".to_string());
    }
    if total_violations > 0 {
        action_items.push("Implement suggested fixes for all violations".to_string());
    }
    action_items.push("Establish ongoing privacy monitoring".to_string());

    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Report {
        metadata: ReportMetadata {
            schema_version: SCHEMA_VERSION,
            generated_at,
            generated_at_ms: now_ms(),
            correlation_id: correlation_id.to_string(),
            project_path: inputs.project_path.clone(),
            total_violations,
            positive_practices,
            agents_used: AGENT_NAMES.iter().map(|s| s.to_string()).collect(),
            ai_enhanced: inputs.ai_used,
            degraded_reasons: inputs.degraded_reasons.clone(),
            completed_stages: inputs.completed_stages.clone(),
        },
        executive_summary: ExecutiveSummary {
            status,
            message,
            compliance_score,
            risk_level,
            total_violations,
            high_severity_count,
            positive_practices,
        },
        detailed_findings: findings.clone(),
        compliance_analysis: inputs.compliance.clone(),
        fix_recommendations: inputs.fixes.clone(),
        risk_assessment,
        action_items,
        bedrock_enhanced: inputs.ai_used,
    }
}

/// What the report stage hands back: the report plus the blob locator (when
/// persistence succeeded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutput {
    pub report: Report,
    pub locator: Option<String>,
}

pub struct ReportStage;

impl Stage for ReportStage {
    type Input = ReportInputs;
    type Output = ReportOutput;

    fn id(&self) -> StageId {
        StageId::Report
    }

    fn input_summary(&self, input: &ReportInputs) -> String {
        format!(
            "{} findings, score {}",
            input.enhanced.findings.len(),
            input.compliance.compliance_score
        )
    }

    fn fallback(&self, input: &ReportInputs) -> ReportOutput {
        ReportOutput {
            report: compose_report("unknown", input),
            locator: None,
        }
    }

    fn compute(
        &self,
        ctx: &StageContext<'_>,
        input: &ReportInputs,
        errors: &mut Vec<StageError>,
        _ai: &mut AiUsage,
    ) -> anyhow::Result<ReportOutput> {
        let report = compose_report(&ctx.correlation_id, input);

        let locator = match serde_json::to_vec_pretty(&report) {
            Ok(bytes) => {
                match ctx
                    .store
                    .put_report(&ctx.correlation_id, &bytes, "application/json")
                {
                    Ok(locator) => Some(locator),
                    Err(err) => {
                        errors.push(StageError::new(
                            ErrorCategory::IoTransient,
                            format!("report persistence failed: {err}"),
                        ));
                        None
                    }
                }
            }
            Err(err) => {
                errors.push(StageError::new(
                    ErrorCategory::IoTransient,
                    format!("report serialization failed: {err}"),
                ));
                None
            }
        };

        Ok(ReportOutput { report, locator })
    }
}
