//! R8 (AI-guidance) and R9 (developer-guidance) rules.
//!
//! R8 hits each carry a specific law reference. R9 hits classify each
//! object-creation or storage pattern with an impact tag (HIGH, MEDIUM, LOW)
//! and a suggestion; the tag is carried verbatim on the match, separate from
//! the severity used for scoring.

use std::path::Path;

use privguard_types::{Category, Impact, Regulation, RegulationRef, Severity};
use regex::Regex;

use crate::patterns::{compile, evaluate, CompiledPattern, ExcerptStyle, MarkerWindow, PatternSpec};
use crate::{Rule, RuleMatch};

static AI_GUIDANCE_SPECS: &[PatternSpec] = &[
    PatternSpec::simple(
        "Hardcoded Credentials",
        r#"(?i)\b(?:password|passwd|pwd|db_pass)\s*[:=]\s*["'][^"']{4,}["']"#,
        Severity::High,
        "Credentials embedded in source",
        "Move credentials to a secret manager",
        &[(Regulation::Gdpr, "Art. 32(1)")],
    ),
    PatternSpec::simple(
        "Excessive Data Collection",
        r"(?i)\bSELECT\s+\*\s+FROM\s+(?:users|customers|patients|accounts)\b",
        Severity::Medium,
        "Wildcard select over a personal-data table",
        "Select only the columns the use case requires",
        &[(Regulation::Gdpr, "Art. 5(1)(c)")],
    ),
    PatternSpec::simple(
        "PII In Output",
        r"(?i)\b(?:print|println|echo|puts|printf)\s*\(.*\b(?:ssn|password|credit_card|email)\b",
        Severity::High,
        "PII printed to program output",
        "Remove PII from console and debug output",
        &[(Regulation::Gdpr, "Art. 5(1)(f)")],
    ),
    PatternSpec::simple(
        "Third-Party Data Share",
        r"(?i)\b(?:send_to_partner|share_with_partner|third_party_api|partner_endpoint)\b",
        Severity::Medium,
        "Personal data shared with a third party in code",
        "Disclose third-party sharing and honor opt-outs",
        &[(Regulation::Ccpa, "§1798.115")],
    ),
    PatternSpec::simple(
        "Permanent Deletion Disabled",
        r"(?i)\b(?:soft_delete_only|never_delete|deletion_disabled)\s*[:=]\s*true\b",
        Severity::High,
        "Permanent deletion switched off",
        "Support full erasure on request",
        &[(Regulation::Gdpr, "Art. 17(1)")],
    ),
    PatternSpec::simple(
        "Disabled Opt-Out Mechanism",
        r"(?i)\bopt_out_mechanism\s*[:=]\s*(?:false|disabled)\b",
        Severity::High,
        "Opt-out mechanism disabled",
        "Keep the opt-out path functional",
        &[(Regulation::Ccpa, "§1798.120")],
    ),
    PatternSpec::simple(
        "Backup-All Policy",
        r#"(?i)\bbackup_all\b|\bbackup\s*\(\s*["']\*["']"#,
        Severity::Medium,
        "Blanket backup retains everything indefinitely",
        "Scope backups and apply retention limits",
        &[(Regulation::Gdpr, "Art. 5(1)(e)")],
    ),
];

pub struct AiGuidanceRule {
    patterns: Vec<CompiledPattern>,
}

impl AiGuidanceRule {
    pub fn new() -> Self {
        Self {
            patterns: compile(AI_GUIDANCE_SPECS),
        }
    }
}

impl Default for AiGuidanceRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for AiGuidanceRule {
    fn id(&self) -> &'static str {
        "R8"
    }

    fn description(&self) -> &'static str {
        "AI-guided compliance checks"
    }

    fn category(&self) -> Category {
        Category::AiGuidance
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

/// One developer-guidance pattern: an object-creation or storage shape with
/// its impact tag and suggestion.
struct GuidanceSpec {
    subtype: &'static str,
    pattern: &'static str,
    impact: Impact,
    description: &'static str,
    suggestion: &'static str,
    regulations: &'static [(Regulation, &'static str)],
}

/// The tag also drives the severity used for scoring (HIGH impact scores as
/// a HIGH violation, and so on); the tag itself travels on the match.
fn impact_severity(impact: Impact) -> Severity {
    match impact {
        Impact::High => Severity::High,
        Impact::Medium => Severity::Medium,
        Impact::Low => Severity::Low,
    }
}

static DEV_GUIDANCE_SPECS: &[GuidanceSpec] = &[
    GuidanceSpec {
        subtype: "PII Object Construction",
        pattern: r"(?i)\bnew\s+(?:User|Customer|Person|Patient|Account)\w*\s*\(.*\b(?:ssn|email|date_of_birth|dob|phone)\b",
        impact: Impact::High,
        description: "Domain object constructed with raw PII",
        suggestion: "Pass minimized, typed identifiers into constructors instead of raw PII",
        regulations: &[(Regulation::Gdpr, "Art. 25(2)")],
    },
    GuidanceSpec {
        subtype: "PII Struct Initialization",
        pattern: r"(?i)\b(?:User|Customer|Profile|Patient)\w*\s*\{.*\b(?:ssn|email|phone|date_of_birth|dob)\b",
        impact: Impact::Medium,
        description: "Struct literal carries PII fields",
        suggestion: "Document the purpose of each PII field kept on the struct",
        regulations: &[(Regulation::Gdpr, "Art. 25(2)")],
    },
    GuidanceSpec {
        subtype: "PII Browser Storage",
        pattern: r"(?i)\b(?:localStorage|sessionStorage)\.setItem\s*\(.*\b(?:email|ssn|token|phone|date_of_birth|dob)\b",
        impact: Impact::High,
        description: "PII written to browser storage",
        suggestion: "Keep PII server-side; browser storage is readable by any script",
        regulations: &[(Regulation::Gdpr, "Art. 32(1)")],
    },
    GuidanceSpec {
        subtype: "PII Cache Write",
        pattern: r"(?i)\b(?:cache|redis|memcached?)\w*\.\w*set\w*\s*\(.*\b(?:email|ssn|user|phone)\b",
        impact: Impact::Medium,
        description: "PII written to a shared cache",
        suggestion: "Cache opaque ids and hydrate PII behind access control",
        regulations: &[(Regulation::Gdpr, "Art. 32(1)")],
    },
    GuidanceSpec {
        subtype: "PII Session Write",
        pattern: r#"(?i)\bsession\[["'](?:email|ssn|date_of_birth|dob|phone)"#,
        impact: Impact::Low,
        description: "PII keyed into the session",
        suggestion: "Store a user id in the session and resolve PII on demand",
        regulations: &[(Regulation::Gdpr, "Art. 25(2)")],
    },
];

pub struct DeveloperGuidanceRule {
    patterns: Vec<(Regex, &'static GuidanceSpec)>,
}

impl DeveloperGuidanceRule {
    pub fn new() -> Self {
        let patterns = DEV_GUIDANCE_SPECS
            .iter()
            .map(|spec| {
                let regex = Regex::new(spec.pattern)
                    .unwrap_or_else(|err| panic!("bad pattern for {}: {err}", spec.subtype));
                (regex, spec)
            })
            .collect();
        Self { patterns }
    }
}

impl Default for DeveloperGuidanceRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for DeveloperGuidanceRule {
    fn id(&self) -> &'static str {
        "R9"
    }

    fn description(&self) -> &'static str {
        "Developer guidance for PII handling"
    }

    fn category(&self) -> Category {
        Category::DevGuidance
    }

    fn evaluate(&self, content: &str, _path: &Path) -> Vec<RuleMatch> {
        let mut matches = Vec::new();
        for (pattern_index, (regex, spec)) in self.patterns.iter().enumerate() {
            for (idx, line) in content.split('\n').enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                matches.push(RuleMatch {
                    line: (idx + 1) as u32,
                    pattern_index,
                    subtype: spec.subtype.to_string(),
                    severity: impact_severity(spec.impact),
                    impact: Some(spec.impact),
                    description: spec.description.to_string(),
                    fix_hint: spec.suggestion.to_string(),
                    regulations: spec
                        .regulations
                        .iter()
                        .map(|(reg, article)| RegulationRef::new(*reg, *article))
                        .collect(),
                    excerpt: line.trim().to_string(),
                    is_positive: false,
                });
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_r8(content: &str) -> Vec<RuleMatch> {
        AiGuidanceRule::new().evaluate(content, Path::new("t.py"))
    }

    fn eval_r9(content: &str) -> Vec<RuleMatch> {
        DeveloperGuidanceRule::new().evaluate(content, Path::new("t.js"))
    }

    #[test]
    fn every_ai_guidance_hit_carries_a_law() {
        let content = concat!(
            "password = \"hunter22\"\n",
            "SELECT * FROM users\n",
            "print(user.ssn)\n",
            "send_to_partner(payload)\n",
            "never_delete = true\n",
            "opt_out_mechanism = disabled\n",
            "backup_all\n",
        );
        let hits = eval_r8(content);
        assert_eq!(hits.len(), 7);
        assert!(hits.iter().all(|m| !m.regulations.is_empty()));
    }

    #[test]
    fn law_references_are_specific() {
        let hits = eval_r8("never_delete = true\n");
        assert_eq!(hits[0].regulations[0].article, "Art. 17(1)");

        let hits = eval_r8("send_to_partner(x)\n");
        assert_eq!(hits[0].regulations[0].article, "§1798.115");
    }

    #[test]
    fn dev_guidance_classifies_impact() {
        let high = eval_r9("const u = new User(name, ssn);\n");
        assert_eq!(high[0].impact, Some(Impact::High));

        let medium = eval_r9("let p = Profile { email: addr };\n");
        assert!(medium.iter().any(|m| m.impact == Some(Impact::Medium)));

        let low = eval_r9("session[\"email\"] = addr\n");
        assert!(low.iter().any(|m| m.impact == Some(Impact::Low)));
    }

    #[test]
    fn impact_tag_drives_scoring_severity() {
        let high = eval_r9("const u = new User(name, ssn);\n");
        assert_eq!(high[0].severity, Severity::High);

        let low = eval_r9("session[\"email\"] = addr\n");
        assert!(low.iter().any(|m| m.severity == Severity::Low));
    }

    #[test]
    fn dev_guidance_attaches_suggestions() {
        let hits = eval_r9("localStorage.setItem(\"email\", user.email)\n");
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|m| !m.fix_hint.is_empty()));
    }

    #[test]
    fn other_guidance_hits_carry_no_impact_tag() {
        let hits = eval_r8("password = \"hunter22\"\n");
        assert!(hits.iter().all(|m| m.impact.is_none()));
    }

    #[test]
    fn plain_object_creation_is_clean() {
        assert!(eval_r9("const u = new User(id);\n").is_empty());
    }
}
