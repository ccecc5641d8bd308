//! Report and per-stage analysis payloads.
//!
//! These are the shapes the compliance, fix-suggest, and report stages emit
//! and that external consumers read back; field names are part of the
//! persisted contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    ComplianceStatus, ErrorCategory, Finding, FixEffort, Language, RiskLevel, Severity, StageId,
};

/// One grouped entry under `violations_by_regulation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulationEntry {
    pub finding_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub file_path: String,
    pub line: u32,
    pub description: String,
}

/// A prioritized remediation recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Severity,
    pub action: String,
    pub timeline: String,
    pub impact: String,
}

/// Risk rollup keyed on the highest severity present in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub business_risk: RiskLevel,
    pub legal_risk: RiskLevel,
    pub reputation_risk: RiskLevel,
    /// Illustrative estimate string, e.g. `"$11000 estimated"`.
    pub financial_impact: String,
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self {
            business_risk: RiskLevel::Low,
            legal_risk: RiskLevel::Low,
            reputation_risk: RiskLevel::Low,
            financial_impact: "$0 estimated".to_string(),
        }
    }
}

/// Output of the Compliance stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceAnalysis {
    pub total_violations: usize,
    /// Integer in `[0, 100]`; 100 iff no countable violations.
    pub compliance_score: u8,
    pub status: Option<ComplianceStatus>,
    pub message: String,
    pub violations_by_regulation: BTreeMap<String, Vec<RegulationEntry>>,
    pub risk_assessment: Option<RiskAssessment>,
    pub recommendations: Vec<Recommendation>,
}

/// A concrete remediation for one finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub finding_id: String,
    pub rule_id: String,
    pub file_path: String,
    pub line: u32,
    pub language: Language,
    /// The offending excerpt as scanned.
    pub before: String,
    /// Concrete replacement.
    pub after: String,
    pub steps: Vec<String>,
    pub alternatives: Vec<String>,
    pub effort: FixEffort,
    pub priority: Severity,
    #[serde(default)]
    pub ai_enhanced: bool,
    #[serde(default)]
    pub ai_confidence: f64,
}

/// Output of the Fix-Suggest stage: one suggestion per countable finding,
/// grouped three ways (by violation via `suggestions`, by file, by priority).
/// The group maps hold `finding_id`s to keep the payload flat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixReport {
    pub total: usize,
    pub suggestions: Vec<FixSuggestion>,
    pub by_file: BTreeMap<String, Vec<String>>,
    pub by_priority: BTreeMap<Severity, Vec<String>>,
}

/// Report header block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub schema_version: u32,
    /// RFC 3339 timestamp.
    pub generated_at: String,
    pub generated_at_ms: u128,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    pub total_violations: usize,
    /// `is_positive` findings carried in the run; never part of totals.
    pub positive_practices: usize,
    pub agents_used: Vec<String>,
    pub ai_enhanced: bool,
    /// Error categories encountered anywhere in the run.
    pub degraded_reasons: Vec<ErrorCategory>,
    pub completed_stages: Vec<StageId>,
}

/// The top-of-report verdict block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub status: ComplianceStatus,
    pub message: String,
    pub compliance_score: u8,
    pub risk_level: RiskLevel,
    pub total_violations: usize,
    pub high_severity_count: usize,
    pub positive_practices: usize,
}

impl Default for ExecutiveSummary {
    fn default() -> Self {
        Self {
            status: ComplianceStatus::Compliant,
            message: "No privacy violations detected".to_string(),
            compliance_score: 100,
            risk_level: RiskLevel::Low,
            total_violations: 0,
            high_severity_count: 0,
            positive_practices: 0,
        }
    }
}

/// The terminal pipeline artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub executive_summary: ExecutiveSummary,
    pub detailed_findings: Vec<Finding>,
    pub compliance_analysis: ComplianceAnalysis,
    pub fix_recommendations: FixReport,
    pub risk_assessment: RiskAssessment,
    pub action_items: Vec<String>,
    /// True iff any stage actually used the AI collaborator.
    pub bedrock_enhanced: bool,
}

/// End-to-end run metrics emitted by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stage_duration_ms: BTreeMap<StageId, u128>,
    pub ai_calls: u64,
    pub ai_failures: u64,
}
