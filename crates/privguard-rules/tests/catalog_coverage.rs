//! One canonical trigger and, where defined, one suppression per rule.
//! Keeps the whole catalog honest: every rule must fire on its own
//! documented shape and stay silent when its marker is present.

use std::path::Path;

use privguard_rules::{Catalog, RuleMatch};
use privguard_types::{Category, Severity};

fn eval(rule_id: &str, content: &str) -> Vec<RuleMatch> {
    let catalog = Catalog::builtin();
    catalog
        .rules()
        .iter()
        .find(|r| r.id() == rule_id)
        .unwrap_or_else(|| panic!("no rule {rule_id}"))
        .evaluate(content, Path::new("sample.js"))
}

struct Case {
    rule_id: &'static str,
    trigger: &'static str,
    suppressed: Option<&'static str>,
    min_severity: Severity,
}

const CASES: &[Case] = &[
    Case {
        rule_id: "R1",
        trigger: "let contact = \"ops@example.com\";\n",
        suppressed: None,
        min_severity: Severity::Medium,
    },
    Case {
        rule_id: "R2",
        trigger: "let ssn = \"123-45-6789\";\n",
        suppressed: None,
        min_severity: Severity::Critical,
    },
    Case {
        rule_id: "R3",
        trigger: "DELETE FROM users WHERE id=7;\n",
        suppressed: None,
        min_severity: Severity::High,
    },
    Case {
        rule_id: "R4",
        trigger: "const data_capture = \"email\";\n",
        suppressed: Some("// @consent_required\nconst data_capture = \"email\";\n"),
        min_severity: Severity::High,
    },
    Case {
        rule_id: "R5",
        trigger: "CREATE TABLE t (ssn TEXT);\n",
        suppressed: Some("-- @encrypted\nCREATE TABLE t (ssn TEXT);\n"),
        min_severity: Severity::High,
    },
    Case {
        rule_id: "R6",
        trigger: "logger.info(user.email)\n",
        suppressed: None,
        min_severity: Severity::High,
    },
    Case {
        rule_id: "R7",
        trigger: "email: String\n",
        suppressed: Some("# @scope(profile)\nemail: String\n"),
        min_severity: Severity::Medium,
    },
    Case {
        rule_id: "R8",
        trigger: "SELECT * FROM customers\n",
        suppressed: None,
        min_severity: Severity::Medium,
    },
    Case {
        rule_id: "R9",
        trigger: "u = new User(name, ssn)\n",
        suppressed: None,
        min_severity: Severity::High,
    },
];

#[test]
fn every_rule_fires_on_its_canonical_trigger() {
    for case in CASES {
        let hits = eval(case.rule_id, case.trigger);
        assert!(
            !hits.is_empty(),
            "{} did not fire on its trigger",
            case.rule_id
        );
        assert!(
            hits.iter().any(|m| m.severity >= case.min_severity),
            "{} fired below its expected severity",
            case.rule_id
        );
    }
}

#[test]
fn every_documented_marker_suppresses() {
    for case in CASES {
        let Some(suppressed) = case.suppressed else {
            continue;
        };
        let hits = eval(case.rule_id, suppressed);
        assert!(
            hits.is_empty(),
            "{} ignored its suppression marker",
            case.rule_id
        );
    }
}

#[test]
fn categories_match_rule_families() {
    let catalog = Catalog::builtin();
    let by_id = |id: &str| {
        catalog
            .rules()
            .iter()
            .find(|r| r.id() == id)
            .unwrap()
            .category()
    };
    assert_eq!(by_id("R1"), Category::Pii);
    assert_eq!(by_id("R2"), Category::Pii);
    assert_eq!(by_id("R3"), Category::Consent);
    assert_eq!(by_id("R4"), Category::Consent);
    assert_eq!(by_id("R5"), Category::Security);
    assert_eq!(by_id("R6"), Category::DataFlow);
    assert_eq!(by_id("R7"), Category::Advanced);
    assert_eq!(by_id("R8"), Category::AiGuidance);
    assert_eq!(by_id("R9"), Category::DevGuidance);
}

#[test]
fn fix_hints_accompany_every_violation() {
    for case in CASES {
        for hit in eval(case.rule_id, case.trigger) {
            if !hit.is_positive {
                assert!(
                    !hit.fix_hint.is_empty(),
                    "{} emitted a violation without a fix hint",
                    case.rule_id
                );
            }
        }
    }
}

#[test]
fn regulations_accompany_pii_and_security_hits() {
    for rule_id in ["R1", "R2", "R3", "R5"] {
        let case = CASES.iter().find(|c| c.rule_id == rule_id).unwrap();
        for hit in eval(rule_id, case.trigger) {
            assert!(
                !hit.regulations.is_empty(),
                "{rule_id} emitted a hit without a regulation reference"
            );
        }
    }
}
