//! S4: the fix-suggest stage. Produces one concrete remediation per
//! countable finding from a built-in table keyed on rule id and language;
//! the AI collaborator, when present, upgrades `after`/`steps` with
//! language- and context-aware replacements.

use std::collections::BTreeMap;

use privguard_ai::extract::extract_json_array;
use privguard_types::{
    AiUsage, EnhanceOutput, ErrorCategory, Finding, FixEffort, FixReport, FixSuggestion, Language,
    Severity, StageError, StageId,
};
use serde::Deserialize;
use serde_json::json;

use crate::framework::{Stage, StageContext};

/// Findings per collaborator call, matching the enhance stage's batching.
const BATCH_SIZE: usize = 20;

pub struct FixSuggestStage;

/// The deterministic fallback table. Keyed on `rule_id` + language; every
/// rule has a generic row so the output is total.
fn template_for(finding: &Finding) -> (String, Vec<String>, Vec<String>, FixEffort) {
    let excerpt = finding.match_excerpt.as_str();
    match finding.rule_id.as_str() {
        "R1" => {
            let after = match finding.language {
                Language::Java => "String contact = System.getenv(\"CONTACT_EMAIL\");".to_string(),
                Language::Python => "contact = os.environ[\"CONTACT_EMAIL\"]".to_string(),
                Language::JavaScript | Language::TypeScript => {
                    "const contact = process.env.CONTACT_EMAIL;".to_string()
                }
                Language::Go => "contact := os.Getenv(\"CONTACT_EMAIL\")".to_string(),
                Language::Rust => {
                    "let contact = std::env::var(\"CONTACT_EMAIL\")?;".to_string()
                }
                _ => "read the address from configuration".to_string(),
            };
            (
                after,
                vec![
                    "Move the address into configuration or the environment".to_string(),
                    "Replace the literal with the configuration lookup".to_string(),
                    "Add the key to the deployment manifest".to_string(),
                ],
                vec!["Store the address in the secret manager".to_string()],
                FixEffort::Trivial,
            )
        }
        "R2" => (
            "load the value from the secret manager at runtime".to_string(),
            vec![
                "Remove the literal from source and history".to_string(),
                "Rotate the exposed value if it is a live credential".to_string(),
                "Fetch the value from the secret manager or environment".to_string(),
            ],
            vec!["Tokenize the value via the owning service".to_string()],
            FixEffort::Medium,
        ),
        "R3" => (
            "route the operation through the privacy workflow".to_string(),
            vec![
                "Replace the hardcoded operation with the erasure/consent workflow".to_string(),
                "Record the request in the audit log".to_string(),
            ],
            vec![],
            FixEffort::Medium,
        ),
        "R4" => (
            format!("@consent_required\n{excerpt}"),
            vec![
                "Confirm a lawful basis for the capture".to_string(),
                "Annotate the capture with @consent_required or data_purpose=".to_string(),
            ],
            vec!["Gate the capture behind a recorded consent check".to_string()],
            FixEffort::Small,
        ),
        "R5" => {
            if excerpt.contains("http://") {
                (
                    excerpt.replace("http://", "https://"),
                    vec![
                        "Switch the endpoint to HTTPS".to_string(),
                        "Verify the certificate chain in the client".to_string(),
                    ],
                    vec![],
                    FixEffort::Trivial,
                )
            } else if excerpt.to_ascii_lowercase().contains("false") {
                (
                    excerpt
                        .replace("false", "true")
                        .replace("False", "True"),
                    vec!["Re-enable transport security".to_string()],
                    vec![],
                    FixEffort::Trivial,
                )
            } else {
                (
                    format!("@encrypted\n{excerpt}"),
                    vec![
                        "Encrypt the sensitive columns at rest".to_string(),
                        "Mark the handling with @encrypted".to_string(),
                    ],
                    vec!["Use a column-level encryption library".to_string()],
                    FixEffort::Large,
                )
            }
        }
        "R6" => (
            "redact sensitive fields before they leave the data path".to_string(),
            vec![
                "Mask or drop PII at the logging and error boundaries".to_string(),
                "Attach a retention policy with an explicit expiry".to_string(),
            ],
            vec!["Centralize redaction in the logging layer".to_string()],
            FixEffort::Small,
        ),
        "R7" => (
            "add the missing privacy annotation".to_string(),
            vec![
                "Apply the pattern-specific marker (@scope, consent gate, pseudonymized join)"
                    .to_string(),
                "Record the design decision in the privacy review".to_string(),
            ],
            vec![],
            FixEffort::Small,
        ),
        "R8" => (
            "apply the referenced regulation's control".to_string(),
            vec![
                "Read the cited article or section".to_string(),
                "Implement the control it requires".to_string(),
            ],
            vec![],
            FixEffort::Medium,
        ),
        "R9" => (
            finding.fix_hint.clone(),
            vec!["Apply the suggestion at the construction or storage site".to_string()],
            vec![],
            FixEffort::Small,
        ),
        _ => (
            "review the finding and apply the documented control".to_string(),
            vec!["Review the finding with the privacy owner".to_string()],
            vec![],
            FixEffort::Small,
        ),
    }
}

#[derive(Debug, Deserialize)]
struct FixReply {
    finding_id: String,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

fn ai_prompt(batch: &[&FixSuggestion]) -> String {
    let items: Vec<_> = batch
        .iter()
        .map(|s| {
            json!({
                "finding_id": s.finding_id,
                "language": s.language,
                "before": s.before,
                "draft_after": s.after,
            })
        })
        .collect();
    format!(
        "You are a remediation assistant. For each finding, produce a \
         concrete language-aware replacement and implementation steps. Reply \
         with a JSON array of objects {{\"finding_id\", \"after\", \
         \"steps\": [..], \"alternatives\": [..], \"confidence\"}}.\n{}",
        serde_json::to_string_pretty(&items).unwrap_or_default()
    )
}

impl Stage for FixSuggestStage {
    type Input = EnhanceOutput;
    type Output = FixReport;

    fn id(&self) -> StageId {
        StageId::FixSuggest
    }

    fn input_summary(&self, input: &EnhanceOutput) -> String {
        format!("{} findings", input.findings.len())
    }

    fn fallback(&self, _input: &EnhanceOutput) -> FixReport {
        FixReport::default()
    }

    fn compute(
        &self,
        ctx: &StageContext<'_>,
        input: &EnhanceOutput,
        errors: &mut Vec<StageError>,
        ai: &mut AiUsage,
    ) -> anyhow::Result<FixReport> {
        // One suggestion per countable finding, in finding order.
        let mut suggestions: Vec<FixSuggestion> = input
            .findings
            .iter()
            .filter(|f| f.is_countable())
            .map(|finding| {
                let (after, steps, alternatives, effort) = template_for(finding);
                FixSuggestion {
                    finding_id: finding.finding_id.clone(),
                    rule_id: finding.rule_id.clone(),
                    file_path: finding.file_path.clone(),
                    line: finding.line,
                    language: finding.language,
                    before: finding.match_excerpt.clone(),
                    after,
                    steps,
                    alternatives,
                    effort,
                    priority: finding.severity,
                    ai_enhanced: false,
                    ai_confidence: 0.0,
                }
            })
            .collect();

        if let Some(client) = ctx.ai {
            let ids: Vec<String> = suggestions.iter().map(|s| s.finding_id.clone()).collect();
            for chunk in ids.chunks(BATCH_SIZE) {
                let batch: Vec<&FixSuggestion> = suggestions
                    .iter()
                    .filter(|s| chunk.contains(&s.finding_id))
                    .collect();
                let Some(reply) = client.analyze(&ai_prompt(&batch), None) else {
                    errors.push(StageError::new(
                        ErrorCategory::AiUnavailable,
                        "AI fix enhancement unavailable for batch; using templates",
                    ));
                    continue;
                };
                let Some(value) = extract_json_array(&reply) else {
                    errors.push(StageError::new(
                        ErrorCategory::AiUnavailable,
                        "unparsable AI fix reply",
                    ));
                    continue;
                };
                let Ok(fixes) = serde_json::from_value::<Vec<FixReply>>(value) else {
                    errors.push(StageError::new(
                        ErrorCategory::AiUnavailable,
                        "AI fix reply did not match the expected shape",
                    ));
                    continue;
                };
                for fix in fixes {
                    let Some(suggestion) = suggestions
                        .iter_mut()
                        .find(|s| s.finding_id == fix.finding_id)
                    else {
                        continue;
                    };
                    if let Some(after) = fix.after.filter(|a| !a.is_empty()) {
                        suggestion.after = after;
                    }
                    if !fix.steps.is_empty() {
                        suggestion.steps = fix.steps;
                    }
                    if !fix.alternatives.is_empty() {
                        suggestion.alternatives = fix.alternatives;
                    }
                    suggestion.ai_enhanced = true;
                    suggestion.ai_confidence = fix.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
                    ai.used = true;
                }
            }
            if ai.used {
                ai.model = Some(client.model_id().to_string());
                let enhanced: Vec<f64> = suggestions
                    .iter()
                    .filter(|s| s.ai_enhanced)
                    .map(|s| s.ai_confidence)
                    .collect();
                if !enhanced.is_empty() {
                    ai.confidence = enhanced.iter().sum::<f64>() / enhanced.len() as f64;
                }
            }
        }

        let mut by_file: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut by_priority: BTreeMap<Severity, Vec<String>> = BTreeMap::new();
        for suggestion in &suggestions {
            by_file
                .entry(suggestion.file_path.clone())
                .or_default()
                .push(suggestion.finding_id.clone());
            by_priority
                .entry(suggestion.priority)
                .or_default()
                .push(suggestion.finding_id.clone());
        }

        Ok(FixReport {
            total: suggestions.len(),
            suggestions,
            by_file,
            by_priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{run_stage, StageContext};
    use privguard_store::MemoryStore;
    use privguard_types::{finding_identity, Category};

    fn finding(rule_id: &str, language: Language, excerpt: &str, severity: Severity) -> Finding {
        Finding {
            finding_id: finding_identity("a.java", 1, rule_id, excerpt),
            file_path: "a.java".into(),
            line: 1,
            language,
            rule_id: rule_id.into(),
            rule_description: "desc".into(),
            category: Category::Pii,
            severity,
            match_excerpt: excerpt.into(),
            description: "desc".into(),
            fix_hint: "apply the suggestion".into(),
            impact: None,
            regulation_refs: vec![],
            is_positive: false,
            suppressed: false,
            suppressed_reason: None,
            truncated: false,
            ai_enhanced: false,
            ai_confidence: 0.0,
            ai_model: None,
        }
    }

    fn run(findings: Vec<Finding>) -> FixReport {
        let store = MemoryStore::new();
        let ctx = StageContext::new("c1", None, &store);
        let input = EnhanceOutput {
            findings,
            discovered: 0,
        };
        run_stage(&FixSuggestStage, &ctx, &input).output
    }

    #[test]
    fn every_countable_finding_gets_a_suggestion() {
        let report = run(vec![
            finding("R1", Language::Java, "String e = \"a@b.co\";", Severity::Medium),
            finding("R5", Language::JavaScript, "fetch('http://x.com')", Severity::High),
        ]);
        assert_eq!(report.total, 2);
        assert_eq!(report.suggestions.len(), 2);
    }

    #[test]
    fn suppressed_and_positive_findings_are_skipped() {
        let mut positive = finding("R6", Language::JavaScript, "mask(email)", Severity::Low);
        positive.is_positive = true;
        let mut suppressed = finding("R1", Language::Java, "x", Severity::Medium);
        suppressed.suppressed = true;
        let report = run(vec![positive, suppressed]);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn http_fix_is_context_aware() {
        let report = run(vec![finding(
            "R5",
            Language::JavaScript,
            "fetch('http://api.example.com/u')",
            Severity::High,
        )]);
        let fix = &report.suggestions[0];
        assert_eq!(fix.before, "fetch('http://api.example.com/u')");
        assert_eq!(fix.after, "fetch('https://api.example.com/u')");
        assert_eq!(fix.effort, FixEffort::Trivial);
    }

    #[test]
    fn email_fix_is_language_aware() {
        let java = run(vec![finding(
            "R1",
            Language::Java,
            "String e = \"a@b.co\";",
            Severity::Medium,
        )]);
        assert!(java.suggestions[0].after.contains("System.getenv"));

        let python = run(vec![finding(
            "R1",
            Language::Python,
            "e = \"a@b.co\"",
            Severity::Medium,
        )]);
        assert!(python.suggestions[0].after.contains("os.environ"));
    }

    #[test]
    fn groups_cover_every_suggestion() {
        let report = run(vec![
            finding("R1", Language::Java, "String e = \"a@b.co\";", Severity::Medium),
            finding("R2", Language::Java, "ssn = \"123-45-6789\"", Severity::Critical),
        ]);
        let in_files: usize = report.by_file.values().map(Vec::len).sum();
        let in_priorities: usize = report.by_priority.values().map(Vec::len).sum();
        assert_eq!(in_files, report.total);
        assert_eq!(in_priorities, report.total);
        assert!(report.by_priority.contains_key(&Severity::Critical));
    }

    #[test]
    fn steps_are_never_empty() {
        let report = run(vec![
            finding("R3", Language::Java, "DELETE FROM users WHERE id=1", Severity::High),
            finding("R9", Language::JavaScript, "localStorage.setItem('email', e)", Severity::Medium),
        ]);
        assert!(report.suggestions.iter().all(|s| !s.steps.is_empty()));
    }
}
