//! # privguard-types
//!
//! **Tier 1 (Hard Contract)**
//!
//! This crate defines the core data structures and contracts for `privguard`.
//! It contains only data types, Serde definitions, identity/scoring helpers,
//! and `SCHEMA_VERSION`.
//!
//! ## What belongs here
//! * Pure data structs (Findings, StageResults, Reports)
//! * Serialization/Deserialization logic
//! * Stability markers (SCHEMA_VERSION)
//! * The scoring constants shared by the compliance and report stages
//!
//! ## What does NOT belong here
//! * File I/O
//! * Regex evaluation
//! * CLI argument parsing
//! * Anything that talks to the network

mod report;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

pub use report::{
    ComplianceAnalysis, ExecutiveSummary, FixReport, FixSuggestion, PipelineMetrics,
    Recommendation, RegulationEntry, Report, ReportMetadata, RiskAssessment,
};

/// The current schema version for all persisted payloads.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum byte length of a `match_excerpt` before truncation.
pub const EXCERPT_MAX_BYTES: usize = 512;

// --------------------------
// Enumerations
// --------------------------

/// Violation severity. Ordered so that `Low < Medium < High < Critical`,
/// which makes `severity >= floor` and `max()` read naturally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Contract weight used by the compliance score.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 10,
            Severity::High => 5,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Developer-guidance impact tag. Distinct from [`Severity`]: it classifies
/// how strongly a PII construction or storage pattern affects the codebase,
/// while severity feeds the compliance score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(self) -> &'static str {
        match self {
            Impact::High => "HIGH",
            Impact::Medium => "MEDIUM",
            Impact::Low => "LOW",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Pii,
    Security,
    Consent,
    #[serde(rename = "DATAFLOW")]
    DataFlow,
    Advanced,
    AiGuidance,
    DevGuidance,
}

/// The twelve supported source languages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Language {
    JavaScript,
    TypeScript,
    Java,
    Python,
    Go,
    #[serde(rename = "C#")]
    CSharp,
    Php,
    Ruby,
    Swift,
    Kotlin,
    Rust,
    Scala,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Java,
        Language::Python,
        Language::Go,
        Language::CSharp,
        Language::Php,
        Language::Ruby,
        Language::Swift,
        Language::Kotlin,
        Language::Rust,
        Language::Scala,
    ];

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Java => "Java",
            Language::Python => "Python",
            Language::Go => "Go",
            Language::CSharp => "C#",
            Language::Php => "PHP",
            Language::Ruby => "Ruby",
            Language::Swift => "Swift",
            Language::Kotlin => "Kotlin",
            Language::Rust => "Rust",
            Language::Scala => "Scala",
        }
    }

    /// Short tag used in the violation envelope, e.g. `[JAVA]`.
    ///
    /// Tags are `\w+` so external envelope consumers can parse them with a
    /// word-class pattern (`C#` becomes `CSHARP`).
    pub fn tag(self) -> &'static str {
        match self {
            Language::JavaScript => "JS",
            Language::TypeScript => "TS",
            Language::Java => "JAVA",
            Language::Python => "PYTHON",
            Language::Go => "GO",
            Language::CSharp => "CSHARP",
            Language::Php => "PHP",
            Language::Ruby => "RUBY",
            Language::Swift => "SWIFT",
            Language::Kotlin => "KOTLIN",
            Language::Rust => "RUST",
            Language::Scala => "SCALA",
        }
    }

    /// Inverse of [`Language::tag`].
    pub fn from_tag(tag: &str) -> Option<Language> {
        Language::ALL.into_iter().find(|l| l.tag() == tag)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Regulations findings can be mapped to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Regulation {
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "CCPA")]
    Ccpa,
    #[serde(rename = "HIPAA")]
    Hipaa,
    #[serde(rename = "PCI-DSS")]
    PciDss,
    #[serde(rename = "GENERAL")]
    General,
}

impl Regulation {
    pub fn as_str(self) -> &'static str {
        match self {
            Regulation::Gdpr => "GDPR",
            Regulation::Ccpa => "CCPA",
            Regulation::Hipaa => "HIPAA",
            Regulation::PciDss => "PCI-DSS",
            Regulation::General => "GENERAL",
        }
    }
}

impl fmt::Display for Regulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(regulation, article_or_section)` reference attached to a finding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegulationRef {
    pub regulation: Regulation,
    pub article: String,
}

impl RegulationRef {
    pub fn new(regulation: Regulation, article: impl Into<String>) -> Self {
        Self {
            regulation,
            article: article.into(),
        }
    }
}

// --------------------------
// Finding
// --------------------------

/// A single privacy observation produced by a rule against a file line.
///
/// Identity fields (`file_path`, `line`, `rule_id`, `match_excerpt`) are
/// frozen once the finding is created; enrichment stages add to the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable content hash of `(file_path, line, rule_id, match_excerpt)`.
    pub finding_id: String,
    pub file_path: String,
    /// 1-based line number.
    pub line: u32,
    pub language: Language,
    pub rule_id: String,
    pub rule_description: String,
    pub category: Category,
    pub severity: Severity,
    /// Offending line snippet, truncated to [`EXCERPT_MAX_BYTES`].
    pub match_excerpt: String,
    pub description: String,
    pub fix_hint: String,
    /// Developer-guidance impact classification; set by the guidance rule
    /// only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,
    /// Append-only across stages.
    pub regulation_refs: Vec<RegulationRef>,
    /// Good-practice marker; carried for bookkeeping, never counted.
    #[serde(default)]
    pub is_positive: bool,
    /// Set by a later stage that wants to drop the finding without deleting it.
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_reason: Option<String>,
    /// Source file was truncated at `max_bytes_per_file` before evaluation.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub ai_enhanced: bool,
    #[serde(default)]
    pub ai_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
}

impl Finding {
    /// True when the finding participates in totals and scoring.
    pub fn is_countable(&self) -> bool {
        !self.is_positive && !self.suppressed
    }
}

/// Compute the stable finding identity hash.
///
/// The hash covers exactly the four identity fields, separated by a byte
/// that cannot occur in any of them, so distinct tuples cannot collide by
/// concatenation.
pub fn finding_identity(file_path: &str, line: u32, rule_id: &str, match_excerpt: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(&[0]);
    hasher.update(&line.to_le_bytes());
    hasher.update(&[0]);
    hasher.update(rule_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(match_excerpt.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Truncate an excerpt to [`EXCERPT_MAX_BYTES`] on a char boundary, appending
/// `…` when anything was cut.
pub fn truncate_excerpt(excerpt: &str) -> String {
    if excerpt.len() <= EXCERPT_MAX_BYTES {
        return excerpt.to_string();
    }
    let mut end = EXCERPT_MAX_BYTES;
    while !excerpt.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = excerpt[..end].to_string();
    out.push('…');
    out
}

// --------------------------
// Requests and options
// --------------------------

/// Source provided inline instead of as a directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineSource {
    pub content: String,
    /// File extension without the dot, e.g. `java`.
    pub file_type: String,
}

/// Filter over rule ids: everything, or an explicit set.
///
/// Serialized as `"*"` or as a JSON array of rule ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuleFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl RuleFilter {
    pub fn matches(&self, rule_id: &str) -> bool {
        match self {
            RuleFilter::All => true,
            RuleFilter::Only(set) => set.contains(rule_id),
        }
    }
}

impl Serialize for RuleFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RuleFilter::All => serializer.serialize_str("*"),
            RuleFilter::Only(set) => {
                let mut seq = serializer.serialize_seq(Some(set.len()))?;
                for id in set {
                    seq.serialize_element(id)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for RuleFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FilterVisitor;

        impl<'de> Visitor<'de> for FilterVisitor {
            type Value = RuleFilter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"*\" or an array of rule ids")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RuleFilter, E> {
                if v == "*" {
                    Ok(RuleFilter::All)
                } else {
                    Err(E::custom(format!("expected \"*\", got {v:?}")))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RuleFilter, A::Error> {
                let mut set = BTreeSet::new();
                while let Some(id) = seq.next_element::<String>()? {
                    set.insert(id);
                }
                Ok(RuleFilter::Only(set))
            }
        }

        deserializer.deserialize_any(FilterVisitor)
    }
}

/// Filter over languages: everything, or an explicit set.
///
/// Serialized as `"*"` or as a JSON array of language names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LanguageFilter {
    #[default]
    All,
    Only(BTreeSet<Language>),
}

impl LanguageFilter {
    pub fn matches(&self, language: Language) -> bool {
        match self {
            LanguageFilter::All => true,
            LanguageFilter::Only(set) => set.contains(&language),
        }
    }
}

impl Serialize for LanguageFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LanguageFilter::All => serializer.serialize_str("*"),
            LanguageFilter::Only(set) => {
                let mut seq = serializer.serialize_seq(Some(set.len()))?;
                for lang in set {
                    seq.serialize_element(lang)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for LanguageFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FilterVisitor;

        impl<'de> Visitor<'de> for FilterVisitor {
            type Value = LanguageFilter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"*\" or an array of language names")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LanguageFilter, E> {
                if v == "*" {
                    Ok(LanguageFilter::All)
                } else {
                    Err(E::custom(format!("expected \"*\", got {v:?}")))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LanguageFilter, A::Error> {
                let mut set = BTreeSet::new();
                while let Some(lang) = seq.next_element::<Language>()? {
                    set.insert(lang);
                }
                Ok(LanguageFilter::Only(set))
            }
        }

        deserializer.deserialize_any(FilterVisitor)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_bytes() -> u64 {
    1_048_576
}

fn default_severity_floor() -> Severity {
    Severity::Low
}

/// Options accepted by a scan or pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub ai_enabled: bool,
    pub max_bytes_per_file: u64,
    pub rule_filter: RuleFilter,
    pub severity_floor: Severity,
    pub language_filter: LanguageFilter,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ai_enabled: default_true(),
            max_bytes_per_file: default_max_bytes(),
            rule_filter: RuleFilter::All,
            severity_floor: default_severity_floor(),
            language_filter: LanguageFilter::All,
        }
    }
}

/// Top-level pipeline request. Exactly one of `project_path` or
/// `inline_source` must be provided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_source: Option<InlineSource>,
    pub options: ScanOptions,
}

impl ScanRequest {
    /// Schema check: exactly one source must be present.
    pub fn validate_source(&self) -> Result<(), StageError> {
        match (&self.project_path, &self.inline_source) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(StageError::new(
                ErrorCategory::InputInvalid,
                "both project_path and inline_source provided",
            )),
            (None, None) => Err(StageError::new(
                ErrorCategory::InputInvalid,
                "one of project_path or inline_source is required",
            )),
        }
    }
}

// --------------------------
// Stage results
// --------------------------

/// The five pipeline stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Scan,
    AiEnhance,
    Compliance,
    FixSuggest,
    Report,
}

impl StageId {
    pub const ALL: [StageId; 5] = [
        StageId::Scan,
        StageId::AiEnhance,
        StageId::Compliance,
        StageId::FixSuggest,
        StageId::Report,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Scan => "scan",
            StageId::AiEnhance => "ai_enhance",
            StageId::Compliance => "compliance",
            StageId::FixSuggest => "fix_suggest",
            StageId::Report => "report",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy. Only `InputInvalid` and `DeadlineExceeded` are ever
/// visible in the final report status; everything else is recovered where it
/// occurs and recorded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    InputInvalid,
    IoTransient,
    RuleInternal,
    AiUnavailable,
    StagePartial,
    DeadlineExceeded,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::InputInvalid => "INPUT_INVALID",
            ErrorCategory::IoTransient => "IO_TRANSIENT",
            ErrorCategory::RuleInternal => "RULE_INTERNAL",
            ErrorCategory::AiUnavailable => "AI_UNAVAILABLE",
            ErrorCategory::StagePartial => "STAGE_PARTIAL",
            ErrorCategory::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded, recovered error inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub category: ErrorCategory,
    pub message: String,
    /// Narrower scope when the error did not cover the whole stage, e.g. a
    /// file path or a `finding_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl StageError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            scope: None,
        }
    }

    pub fn scoped(
        category: ErrorCategory,
        message: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            scope: Some(scope.into()),
        }
    }
}

/// AI involvement bookkeeping for a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiUsage {
    pub used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// The envelope every stage returns, no matter what went wrong inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult<T> {
    pub schema_version: u32,
    pub correlation_id: String,
    pub stage_id: StageId,
    pub produced_at_ms: u128,
    pub input_summary: String,
    pub output: T,
    pub ai: AiUsage,
    pub errors: Vec<StageError>,
}

// --------------------------
// Stage outputs
// --------------------------

/// Per-rule description, surfaced by the engine's rule stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub rule_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    pub count: usize,
    pub rule_descriptions: Vec<RuleInfo>,
}

/// Output of the Scan stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutput {
    pub findings: Vec<Finding>,
    pub rule_stats: RuleStats,
    pub counts_by_severity: std::collections::BTreeMap<Severity, usize>,
    pub counts_by_language: std::collections::BTreeMap<Language, usize>,
    pub files_scanned: usize,
    pub warnings: Vec<String>,
}

impl ScanOutput {
    /// Countable findings only (positives and suppressed are carried, not counted).
    pub fn total_violations(&self) -> usize {
        self.findings.iter().filter(|f| f.is_countable()).count()
    }
}

/// Output of the AI-Enhance stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhanceOutput {
    pub findings: Vec<Finding>,
    /// Count of findings newly discovered by the AI pass.
    pub discovered: usize,
}

// --------------------------
// Scoring (contract constants)
// --------------------------

/// Compliance status derived from the score thresholds `{>=90, 60..=89, <60}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NeedsImprovement,
    NonCompliant,
    /// Global deadline tripped; the report covers completed stages only.
    Partial,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::NeedsImprovement => "NEEDS_IMPROVEMENT",
            ComplianceStatus::NonCompliant => "NON_COMPLIANT",
            ComplianceStatus::Partial => "PARTIAL",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative risk level, ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        }
    }
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => RiskLevel::Critical,
            Severity::High => RiskLevel::High,
            Severity::Medium => RiskLevel::Medium,
            Severity::Low => RiskLevel::Low,
        }
    }
}

/// The effort bucket attached to a fix suggestion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum FixEffort {
    Trivial,
    Small,
    Medium,
    Large,
}

/// Compute the compliance score from countable severities.
///
/// `round(100 - sum(weight)/max_possible * 100)` with
/// `max_possible = total * 10`; an empty input scores 100. The result is
/// always in `[0, 100]` and equals 100 only for the empty input.
pub fn compliance_score<I>(severities: I) -> u8
where
    I: IntoIterator<Item = Severity>,
{
    let mut total = 0u32;
    let mut weight = 0u32;
    for severity in severities {
        total += 1;
        weight += severity.weight();
    }
    if total == 0 {
        return 100;
    }
    let max_possible = f64::from(total) * 10.0;
    let score = 100.0 - f64::from(weight) / max_possible * 100.0;
    score.round().clamp(0.0, 100.0) as u8
}

/// Map a score onto the contract status thresholds.
pub fn status_for_score(score: u8) -> ComplianceStatus {
    if score >= 90 {
        ComplianceStatus::Compliant
    } else if score >= 60 {
        ComplianceStatus::NeedsImprovement
    } else {
        ComplianceStatus::NonCompliant
    }
}

/// Highest severity across countable findings, if any.
pub fn highest_severity<'a, I>(findings: I) -> Option<Severity>
where
    I: IntoIterator<Item = &'a Finding>,
{
    findings
        .into_iter()
        .filter(|f| f.is_countable())
        .map(|f| f.severity)
        .max()
}
