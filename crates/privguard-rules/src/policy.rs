//! R3: privacy-policy hazards (right to erasure, do-not-sell, collect-all).

use std::path::Path;

use privguard_types::{Category, Regulation, Severity};

use crate::patterns::{compile, evaluate, CompiledPattern, ExcerptStyle, MarkerWindow, PatternSpec};
use crate::{Rule, RuleMatch};

static POLICY_SPECS: &[PatternSpec] = &[
    PatternSpec::simple(
        "Hardcoded User Deletion",
        r"(?i)\bDELETE\s+FROM\s+users?\b\s+WHERE\s+id\s*=\s*\d+",
        Severity::High,
        "User row deleted by hardcoded id, bypassing the erasure workflow",
        "Route deletions through the right-to-erasure workflow",
        &[(Regulation::Gdpr, "Art. 17"), (Regulation::Ccpa, "§1798.105")],
    ),
    PatternSpec::simple(
        "Do-Not-Sell Violation",
        r"(?i)\bsell_user_data\s*[:=]\s*true\b",
        Severity::High,
        "User data sale enabled in code",
        "Honor do-not-sell preferences; gate sale on recorded consent",
        &[(Regulation::Ccpa, "§1798.120")],
    ),
    PatternSpec::simple(
        "Collect-All Data",
        r"(?i)\b(?:collect_all_data|store_everything)\b|collect all data|store everything",
        Severity::Medium,
        "Blanket data collection declared",
        "Collect only the fields the stated purpose requires",
        &[(Regulation::Gdpr, "Art. 5(1)(c)")],
    ),
];

pub struct PrivacyPolicyRule {
    patterns: Vec<CompiledPattern>,
}

impl PrivacyPolicyRule {
    pub fn new() -> Self {
        Self {
            patterns: compile(POLICY_SPECS),
        }
    }
}

impl Default for PrivacyPolicyRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for PrivacyPolicyRule {
    fn id(&self) -> &'static str {
        "R3"
    }

    fn description(&self) -> &'static str {
        "Privacy policy hazards"
    }

    fn category(&self) -> Category {
        Category::Consent
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
        PrivacyPolicyRule::new().evaluate(content, Path::new("t.sql"))
    }

    #[test]
    fn hardcoded_deletion_fires() {
        let hits = eval("DELETE FROM users WHERE id=42;\n");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].subtype, "Hardcoded User Deletion");
        assert!(hits[0]
            .regulations
            .iter()
            .any(|r| r.article == "Art. 17"));
    }

    #[test]
    fn parameterized_deletion_does_not_fire() {
        assert!(eval("DELETE FROM users WHERE id = ?;\n").is_empty());
        assert!(eval("DELETE FROM users WHERE id = :user_id;\n").is_empty());
    }

    #[test]
    fn do_not_sell_fires_on_true_only() {
        assert_eq!(eval("sell_user_data = true\n").len(), 1);
        assert!(eval("sell_user_data = false\n").is_empty());
    }

    #[test]
    fn collect_all_literals_fire() {
        assert_eq!(eval("mode = collect_all_data\n").len(), 1);
        assert_eq!(eval("// we store everything here\n").len(), 1);
    }
}
