//! R5: encryption and transport-security rule.

use std::path::Path;

use privguard_types::{Category, Regulation, Severity};

use crate::patterns::{compile, evaluate, CompiledPattern, ExcerptStyle, MarkerWindow, PatternSpec};
use crate::{Rule, RuleMatch};

/// Canonical encryption marker spellings; one-line suppression window.
pub const ENCRYPT_MARKER: &str = r"@encrypt\b|@encrypted\b|@secure\b";

const STORAGE_REGS: &[(Regulation, &str)] = &[
    (Regulation::Gdpr, "Art. 32(1)(a)"),
    (Regulation::Hipaa, "§164.312(a)(2)(iv)"),
    (Regulation::PciDss, "Req. 3.4"),
];
const TRANSPORT_REGS: &[(Regulation, &str)] = &[
    (Regulation::Gdpr, "Art. 32(1)"),
    (Regulation::Hipaa, "§164.312(e)(1)"),
    (Regulation::PciDss, "Req. 4.1"),
];

static ENCRYPTION_SPECS: &[PatternSpec] = &[
    PatternSpec {
        subtype: "Unencrypted Sensitive Table",
        pattern: r"(?i)\b(?:CREATE|ALTER)\s+TABLE\b.*\b(?:ssn|social_security|credit_card|card_number|password|date_of_birth|dob|email|phone|address|medical|salary)\b",
        marker: Some(ENCRYPT_MARKER),
        requires_absent: &[],
        severity: Severity::High,
        description: "Sensitive columns defined without an encryption marker",
        fix_hint: "Mark the column handling with @encrypted and encrypt at rest",
        regulations: STORAGE_REGS,
        is_positive: false,
    },
    PatternSpec {
        subtype: "Unencrypted Sensitive Write",
        pattern: r"(?i)\b(?:INSERT\s+INTO|UPDATE)\b.*\b(?:ssn|social_security|credit_card|card_number|password|date_of_birth|dob|medical|salary)\b",
        marker: Some(ENCRYPT_MARKER),
        requires_absent: &[],
        severity: Severity::High,
        description: "Sensitive data written without an encryption marker",
        fix_hint: "Encrypt sensitive values before they reach storage",
        regulations: STORAGE_REGS,
        is_positive: false,
    },
    PatternSpec::simple(
        "Insecure HTTP Protocol",
        r"http://",
        Severity::High,
        "Plain HTTP endpoint; data travels unencrypted",
        "Use https:// and verify certificates",
        TRANSPORT_REGS,
    ),
    PatternSpec::simple(
        "TLS Disabled",
        r"(?i)\b(?:tls|ssl)\s*[:=]\s*false\b",
        Severity::High,
        "Transport security explicitly disabled",
        "Remove the flag; TLS must stay on",
        TRANSPORT_REGS,
    ),
    PatternSpec::simple(
        "Raw PII Primary Key",
        r"(?i)(?:\b(?:email|phone|ssn)\w*\b.*\bPRIMARY\s+KEY\b|\bPRIMARY\s+KEY\s*\(\s*(?:email|phone|ssn))",
        Severity::High,
        "Raw PII used as a primary key",
        "Key rows on a surrogate id and move PII to protected columns",
        STORAGE_REGS,
    ),
    PatternSpec {
        subtype: "Missing Rate Limiting",
        pattern: r"(?i)(?:@GetMapping|@PostMapping|@RequestMapping|@app\.route|router\.(?:get|post)|app\.(?:get|post))\s*\(.*\b(?:user|profile|account|personal|pii)\b",
        marker: None,
        requires_absent: &["apply_rate_limit("],
        severity: Severity::Medium,
        description: "PII-returning endpoint with no rate limiting in the file",
        fix_hint: "Wrap the endpoint with apply_rate_limit(...)",
        regulations: &[(Regulation::Gdpr, "Art. 32(1)(b)")],
        is_positive: false,
    },
];

pub struct EncryptionRule {
    patterns: Vec<CompiledPattern>,
}

impl EncryptionRule {
    pub fn new() -> Self {
        Self {
            patterns: compile(ENCRYPTION_SPECS),
        }
    }
}

impl Default for EncryptionRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for EncryptionRule {
    fn id(&self) -> &'static str {
        "R5"
    }

    fn description(&self) -> &'static str {
        "Encryption and transport security"
    }

    fn category(&self) -> Category {
        Category::Security
    }

    fn evaluate(&self, content: &str, _path: &Path) -> Vec<RuleMatch> {
        evaluate(
            &self.patterns,
            content,
            MarkerWindow::Previous,
            ExcerptStyle::Line,
        )
    }
}
