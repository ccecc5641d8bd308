//! R7: context-aware advanced privacy patterns, each with its own
//! suppression marker or companion-token condition.

use std::path::Path;

use privguard_types::{Category, Regulation, Severity};

use crate::patterns::{compile, evaluate, CompiledPattern, ExcerptStyle, MarkerWindow, PatternSpec};
use crate::{Rule, RuleMatch};

static ADVANCED_SPECS: &[PatternSpec] = &[
    PatternSpec {
        subtype: "Unscoped PII Field",
        pattern: r"(?i)\b(?:email|ssn|phone|address|date_of_birth|dob)\s*:\s*(?:String|ID|Int|Float)\b",
        marker: Some(r"@scope"),
        requires_absent: &[],
        severity: Severity::Medium,
        description: "API schema exposes a PII field without an access scope",
        fix_hint: "Annotate the field with @scope to gate access",
        regulations: &[(Regulation::Gdpr, "Art. 25")],
        is_positive: false,
    },
    PatternSpec {
        subtype: "Tracking Without Opt-Out",
        pattern: r"(?i)\b(?:gtag\(|ga\(|fbq\(|analytics\.track|adsbygoogle|trackingpixel)",
        marker: Some(r#"consent="opt_out""#),
        requires_absent: &[],
        severity: Severity::Medium,
        description: "Ad or analytics load without an opt-out consent gate",
        fix_hint: "Gate the tracker behind consent=\"opt_out\"",
        regulations: &[(Regulation::Gdpr, "Art. 21(2)"), (Regulation::Ccpa, "§1798.120")],
        is_positive: false,
    },
    PatternSpec::simple(
        "Non-EEA Storage For EU Data",
        r#"(?i)\beu[_a-z]*(?:data|user)\w*\b.*["'](?:us|ap|sa|ca)-[a-z]+-\d["']|["'](?:us|ap|sa|ca)-[a-z]+-\d["'].*\beu[_a-z]*(?:data|user)\w*\b"#,
        Severity::High,
        "EU data pinned to a non-EEA storage region",
        "Keep EU personal data in EEA regions or document the transfer basis",
        &[(Regulation::Gdpr, "Art. 44")],
    ),
    PatternSpec {
        subtype: "Unpseudonymized PII Join",
        pattern: r"(?i)\bJOIN\b.*\b(?:users|customers|patients|accounts)\b.*\bON\b.*\b(?:email|ssn|phone)\b",
        marker: Some(r"(?i)pseudonymize|hash|tokenize"),
        requires_absent: &[],
        severity: Severity::Medium,
        description: "Large PII-table join on raw identifiers",
        fix_hint: "Join on pseudonymized or tokenized keys",
        regulations: &[(Regulation::Gdpr, "Art. 32(1)(a)")],
        is_positive: false,
    },
    PatternSpec {
        subtype: "Training Without Minimization",
        pattern: r"(?i)\b(?:model\.fit|\.train\(|train(?:ing)?_data)\b.*\b(?:user|pii|personal|customer)",
        marker: None,
        requires_absent: &["minimization"],
        severity: Severity::Medium,
        description: "Model training over personal data with no minimization note",
        fix_hint: "Document data minimization for the training set",
        regulations: &[(Regulation::Gdpr, "Art. 5(1)(c)")],
        is_positive: false,
    },
    PatternSpec {
        subtype: "API Version Without Privacy Contract",
        pattern: r#"(?i)\bapi[_/]?v(?:ersion)?\s*[:=]\s*["']?\d+"#,
        marker: None,
        requires_absent: &["privacy_version", "privacy_contract"],
        severity: Severity::Low,
        description: "API version bumped without a privacy contract version",
        fix_hint: "Version the privacy contract alongside the API",
        regulations: &[(Regulation::Gdpr, "Art. 24")],
        is_positive: false,
    },
    PatternSpec {
        subtype: "Unannotated New Column",
        pattern: r"(?i)\bADD\s+COLUMN\s+\w+",
        marker: Some(r"@required\b|@referenced\b|@used\b"),
        requires_absent: &[],
        severity: Severity::Low,
        description: "New column added without a necessity annotation",
        fix_hint: "Annotate new columns with @required, @referenced, or @used",
        regulations: &[(Regulation::Gdpr, "Art. 5(1)(c)")],
        is_positive: false,
    },
];

pub struct AdvancedPrivacyRule {
    patterns: Vec<CompiledPattern>,
}

impl AdvancedPrivacyRule {
    pub fn new() -> Self {
        Self {
            patterns: compile(ADVANCED_SPECS),
        }
    }
}

impl Default for AdvancedPrivacyRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for AdvancedPrivacyRule {
    fn id(&self) -> &'static str {
        "R7"
    }

    fn description(&self) -> &'static str {
        "Advanced privacy patterns"
    }

    fn category(&self) -> Category {
        Category::Advanced
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
        AdvancedPrivacyRule::new().evaluate(content, Path::new("t.graphql"))
    }

    #[test]
    fn unscoped_graphql_pii_field_fires() {
        let hits = eval("type User {\n  email: String\n}\n");
        assert!(hits.iter().any(|m| m.subtype == "Unscoped PII Field"));
    }

    #[test]
    fn scope_marker_suppresses_field() {
        let content = "type User {\n  # @scope(read:profile)\n  email: String\n}\n";
        assert!(eval(content).is_empty());
    }

    #[test]
    fn tracking_without_opt_out_fires() {
        let hits = eval("gtag('config', 'UA-1');\n");
        assert_eq!(hits.len(), 1);

        let gated = "// consent=\"opt_out\"\ngtag('config', 'UA-1');\n";
        assert!(eval(gated).is_empty());
    }

    #[test]
    fn eu_data_in_us_region_fires() {
        let hits = eval("store(eu_user_data, region=\"us-east-1\")\n");
        assert!(hits.iter().any(|m| m.subtype == "Non-EEA Storage For EU Data"));

        assert!(eval("store(eu_user_data, region=\"eu-west-1\")\n").is_empty());
    }

    #[test]
    fn raw_join_fires_and_tokenized_join_does_not() {
        let hits = eval("SELECT * FROM orders JOIN users ON orders.email = users.email\n");
        assert!(hits.iter().any(|m| m.subtype == "Unpseudonymized PII Join"));

        let tokenized =
            "SELECT * FROM orders JOIN users ON orders.email_tokenized = tokenize(users.email)\n";
        assert!(eval(tokenized).is_empty());
    }

    #[test]
    fn training_needs_minimization_token() {
        let hits = eval("model.fit(user_features)\n");
        assert!(hits.iter().any(|m| m.subtype == "Training Without Minimization"));

        let documented = "// data minimization: only aggregates\nmodel.fit(user_features)\n";
        assert!(eval(documented)
            .iter()
            .all(|m| m.subtype != "Training Without Minimization"));
    }

    #[test]
    fn api_version_without_privacy_contract_fires() {
        let hits = eval("api_version = 3\n");
        assert!(hits
            .iter()
            .any(|m| m.subtype == "API Version Without Privacy Contract"));

        let paired = "api_version = 3\nprivacy_version = 2\n";
        assert!(eval(paired).is_empty());
    }

    #[test]
    fn new_column_annotation_suppresses() {
        assert_eq!(eval("ALTER TABLE t ADD COLUMN nickname TEXT;\n").len(), 1);
        let annotated = "-- @required for invoicing\nALTER TABLE t ADD COLUMN vat_id TEXT;\n";
        assert!(eval(annotated).is_empty());
    }
}
