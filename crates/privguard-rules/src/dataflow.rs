//! R6: data-flow rule. Sensitive sources, PII in logs, stack traces,
//! retention without expiry, and personal-data writes without DSAR
//! registration. Also tracks masking/hashing as positive practices.

use std::path::Path;

use privguard_types::{Category, Regulation, Severity};

use crate::patterns::{compile, evaluate, CompiledPattern, ExcerptStyle, MarkerWindow, PatternSpec};
use crate::{Rule, RuleMatch};

const FLOW_REGS: &[(Regulation, &str)] = &[(Regulation::Gdpr, "Art. 5(1)(f)")];

static DATAFLOW_SPECS: &[PatternSpec] = &[
    PatternSpec::simple(
        "Sensitive Data Source",
        r"(?i)\b\w*(?:ssn|password|credit_card|date_of_birth|dob|medical)\w*\s*=\s*\w+[\w.]*\.(?:get|read|fetch|input|param|body)\w*",
        Severity::Medium,
        "Sensitive value pulled from an external source",
        "Minimize and protect sensitive inputs at the point of capture",
        FLOW_REGS,
    ),
    PatternSpec::simple(
        "PII In Logs",
        r"(?i)\b(?:log|logger|console)\.\w+\s*\(.*\b(?:ssn|password|credit_card|email|date_of_birth|dob|phone)\b",
        Severity::High,
        "Logging call carries PII-denoting identifiers",
        "Redact or drop PII before logging",
        &[(Regulation::Gdpr, "Art. 5(1)(f)"), (Regulation::Hipaa, "§164.312(b)")],
    ),
    PatternSpec::simple(
        "Unsanitized Stack Trace",
        r"(?i)(?:\.printStackTrace\s*\(|traceback\.print_exc|console\.trace\s*\(|\berr(?:or)?\.stack\b)",
        Severity::Medium,
        "Raw stack trace emitted to output",
        "Sanitize stack traces before they leave the process",
        FLOW_REGS,
    ),
    PatternSpec {
        subtype: "Retention Without Expiry",
        pattern: r"(?i)\bretain\w*\s+.{0,40}\bfor\s+\d+",
        marker: None,
        requires_absent: &["ttl", "delete_after", "expires"],
        severity: Severity::Medium,
        description: "Retention declared with no companion expiry",
        fix_hint: "Pair retention with a ttl, delete_after, or expires policy",
        regulations: &[(Regulation::Gdpr, "Art. 5(1)(e)")],
        is_positive: false,
    },
    PatternSpec {
        subtype: "Missing DSAR Registration",
        pattern: r"(?i)\b(?:INSERT\s+INTO|UPDATE)\b[^()\n]*\([^)]*\b(?:email|ssn|phone|address|date_of_birth|dob)\b",
        marker: None,
        requires_absent: &["register_dsar("],
        severity: Severity::Medium,
        description: "Personal data written without DSAR registration in the file",
        fix_hint: "Call register_dsar(...) where personal data enters storage",
        regulations: &[(Regulation::Gdpr, "Art. 15"), (Regulation::Ccpa, "§1798.110")],
        is_positive: false,
    },
    // Positive practices: carried for reporting, never counted.
    PatternSpec {
        subtype: "Data Masking Practice",
        pattern: r"(?i)\b(?:mask|redact)\w*\s*\(\s*\w*(?:email|ssn|phone|pii|user)",
        marker: None,
        requires_absent: &[],
        severity: Severity::Low,
        description: "Masking applied to personal data",
        fix_hint: "",
        regulations: &[],
        is_positive: true,
    },
    PatternSpec {
        subtype: "PII Hashing Practice",
        pattern: r"(?i)\b(?:hash|bcrypt|argon2|scrypt)\w*\s*\(\s*\w*(?:password|ssn|email)",
        marker: None,
        requires_absent: &[],
        severity: Severity::Low,
        description: "Hashing applied to sensitive values",
        fix_hint: "",
        regulations: &[],
        is_positive: true,
    },
];

pub struct DataFlowRule {
    patterns: Vec<CompiledPattern>,
}

impl DataFlowRule {
    pub fn new() -> Self {
        Self {
            patterns: compile(DATAFLOW_SPECS),
        }
    }
}

impl Default for DataFlowRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for DataFlowRule {
    fn id(&self) -> &'static str {
        "R6"
    }

    fn description(&self) -> &'static str {
        "Data flow and handling"
    }

    fn category(&self) -> Category {
        Category::DataFlow
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

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(content: &str) -> Vec<RuleMatch> {
        DataFlowRule::new().evaluate(content, Path::new("t.js"))
    }

    #[test]
    fn sensitive_source_assignment_fires() {
        let hits = eval("user_ssn = request.body.ssn\n");
        assert!(hits.iter().any(|m| m.subtype == "Sensitive Data Source"));
    }

    #[test]
    fn pii_in_logs_fires() {
        let hits = eval("logger.info(\"user email: \" + email)\n");
        assert!(hits.iter().any(|m| m.subtype == "PII In Logs"));
        assert!(hits
            .iter()
            .find(|m| m.subtype == "PII In Logs")
            .unwrap()
            .severity
            == Severity::High);
    }

    #[test]
    fn plain_log_without_pii_is_clean() {
        assert!(eval("logger.info(\"request handled\")\n").is_empty());
    }

    #[test]
    fn stack_trace_emitters_fire() {
        assert_eq!(eval("e.printStackTrace();\n").len(), 1);
        assert_eq!(eval("traceback.print_exc()\n").len(), 1);
        assert_eq!(eval("console.log(err.stack)\n").len(), 1);
    }

    #[test]
    fn retention_without_companion_fires() {
        let hits = eval("retain records for 90 days\n");
        assert!(hits.iter().any(|m| m.subtype == "Retention Without Expiry"));
    }

    #[test]
    fn retention_with_ttl_anywhere_is_clean() {
        let content = "retain records for 90 days\nset ttl = 90d\n";
        assert!(eval(content)
            .iter()
            .all(|m| m.subtype != "Retention Without Expiry"));
    }

    #[test]
    fn insert_with_pii_columns_requires_dsar() {
        let content = "INSERT INTO users (email, name) VALUES (?, ?)\n";
        assert!(eval(content)
            .iter()
            .any(|m| m.subtype == "Missing DSAR Registration"));

        let registered = format!("{content}register_dsar(user_id)\n");
        assert!(eval(&registered)
            .iter()
            .all(|m| m.subtype != "Missing DSAR Registration"));
    }

    #[test]
    fn masking_and_hashing_are_positive() {
        let hits = eval("store(mask_email(user.email))\nhash_password(pw)\n");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|m| m.is_positive));
    }
}
