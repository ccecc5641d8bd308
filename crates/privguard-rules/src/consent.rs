//! R4: consent rule. Data-capture assignments and PII-bearing object
//! literals are violations unless a consent marker sits on the same line or
//! the immediately preceding non-blank line.

use std::path::Path;

use privguard_types::{Category, Regulation, Severity};

use crate::patterns::{compile, evaluate, CompiledPattern, ExcerptStyle, MarkerWindow, PatternSpec};
use crate::{Rule, RuleMatch};

/// The canonical consent marker spellings. One line of suppression; not
/// configurable.
pub const CONSENT_MARKER: &str =
    r#"@consent_required|@privacy_consent|@gdpr_consent|data_purpose\s*=|profiling_disabled\s*=\s*true"#;

const CONSENT_REGS: &[(privguard_types::Regulation, &str)] =
    &[(Regulation::Gdpr, "Art. 6"), (Regulation::Gdpr, "Art. 7")];

static CONSENT_SPECS: &[PatternSpec] = &[
    PatternSpec {
        subtype: "Data Capture Without Consent",
        pattern: r"(?i)\b(?:data_capture|capture_user_data|collect_user_data|collect_data|track_user|user_tracking)\b\s*[(=:]",
        marker: Some(CONSENT_MARKER),
        requires_absent: &[],
        severity: Severity::High,
        description: "Data capture with no consent marker in scope",
        fix_hint: "Annotate the capture with @consent_required or a data_purpose",
        regulations: CONSENT_REGS,
        is_positive: false,
    },
    PatternSpec {
        subtype: "PII Object Without Consent",
        pattern: r#"(?i)[{,(]\s*(?:email|ssn|phone|address|date_of_birth|dob)\s*[:=]\s*["'\w]"#,
        marker: Some(CONSENT_MARKER),
        requires_absent: &[],
        severity: Severity::High,
        description: "PII-bearing object literal with no consent marker in scope",
        fix_hint: "Record the processing purpose next to the PII construction",
        regulations: CONSENT_REGS,
        is_positive: false,
    },
    PatternSpec {
        subtype: "Disabled Opt-Out",
        pattern: r"(?i)\b(?:opt_out|allow_opt_out|opt_out_enabled)\s*[:=]\s*(?:false|disabled)\b",
        marker: None,
        requires_absent: &[],
        severity: Severity::High,
        description: "Opt-out mechanism disabled",
        fix_hint: "Opt-out must stay available to the data subject",
        regulations: &[(Regulation::Gdpr, "Art. 21"), (Regulation::Ccpa, "§1798.120")],
        is_positive: false,
    },
    PatternSpec {
        subtype: "Forced Consent",
        pattern: r"(?i)\bforced_consent\s*[:=]\s*true\b",
        marker: None,
        requires_absent: &[],
        severity: Severity::High,
        description: "Consent is forced rather than freely given",
        fix_hint: "Consent must be freely given; remove the forced flag",
        regulations: &[(Regulation::Gdpr, "Art. 7(4)")],
        is_positive: false,
    },
];

pub struct ConsentRule {
    patterns: Vec<CompiledPattern>,
}

impl ConsentRule {
    pub fn new() -> Self {
        Self {
            patterns: compile(CONSENT_SPECS),
        }
    }
}

impl Default for ConsentRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ConsentRule {
    fn id(&self) -> &'static str {
        "R4"
    }

    fn description(&self) -> &'static str {
        "Consent management"
    }

    fn category(&self) -> Category {
        Category::Consent
    }

    fn evaluate(&self, content: &str, _path: &Path) -> Vec<RuleMatch> {
        evaluate(
            &self.patterns,
            content,
            MarkerWindow::PreviousNonBlank,
            ExcerptStyle::Line,
        )
    }
}
