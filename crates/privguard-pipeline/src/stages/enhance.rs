//! S2: the AI-enhance stage. Batches findings to the collaborator for
//! enriched descriptions, business impact, regulation additions, and
//! confidence; may append newly discovered findings. Never removes or
//! re-keys an existing finding. When the collaborator is unavailable the
//! findings pass through unchanged.

use privguard_ai::extract::extract_json_object;
use privguard_types::{
    finding_identity, truncate_excerpt, AiUsage, Category, EnhanceOutput, ErrorCategory, Finding,
    Language, RegulationRef, ScanOutput, Severity, StageError, StageId,
};
use serde::Deserialize;
use serde_json::json;

use crate::framework::{Stage, StageContext};

/// Findings per collaborator call.
const BATCH_SIZE: usize = 20;

#[derive(Debug, Deserialize)]
struct EnhancementReply {
    #[serde(default)]
    enhanced: Vec<EnhancedEntry>,
    #[serde(default)]
    new_findings: Vec<DiscoveredEntry>,
}

#[derive(Debug, Deserialize)]
struct EnhancedEntry {
    finding_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    business_impact: Option<String>,
    #[serde(default)]
    regulations: Vec<ReplyRegulation>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ReplyRegulation {
    regulation: String,
    #[serde(default)]
    article: String,
}

#[derive(Debug, Deserialize)]
struct DiscoveredEntry {
    file_path: String,
    line: u32,
    description: String,
    #[serde(default)]
    excerpt: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    fix: String,
}

pub struct AiEnhanceStage;

impl AiEnhanceStage {
    fn batch_prompt(findings: &[&Finding]) -> String {
        let summary: Vec<_> = findings
            .iter()
            .map(|f| {
                json!({
                    "finding_id": f.finding_id,
                    "rule_id": f.rule_id,
                    "file_path": f.file_path,
                    "line": f.line,
                    "description": f.description,
                    "excerpt": f.match_excerpt,
                })
            })
            .collect();
        format!(
            "You are a privacy compliance analyst. For each finding below, \
             provide an enriched description, a business-impact note, any \
             additional regulation references, and a confidence in [0,1]. \
             You may also report findings the rules missed. Reply with a \
             JSON object: {{\"enhanced\": [{{\"finding_id\", \"description\", \
             \"business_impact\", \"regulations\": [{{\"regulation\", \
             \"article\"}}], \"confidence\"}}], \"new_findings\": \
             [{{\"file_path\", \"line\", \"description\", \"excerpt\", \
             \"severity\", \"fix\"}}]}}.\n\nFindings:\n{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        )
    }

    /// Merge one reply into the finding list. Only enrichment fields move;
    /// identity fields are frozen.
    fn merge_reply(
        findings: &mut [Finding],
        reply: EnhancementReply,
        model_id: &str,
        confidences: &mut Vec<f64>,
    ) -> Vec<Finding> {
        for entry in reply.enhanced {
            let Some(finding) = findings.iter_mut().find(|f| f.finding_id == entry.finding_id)
            else {
                continue;
            };
            if let Some(description) = entry.description.filter(|d| !d.is_empty()) {
                finding.description = description;
            }
            if let Some(impact) = entry.business_impact.filter(|i| !i.is_empty()) {
                finding.description = format!("{} Business impact: {impact}", finding.description);
            }
            for reg in entry.regulations {
                if let Some(reference) = parse_reply_regulation(&reg) {
                    // regulation_refs is append-only; never drop or reorder.
                    if !finding.regulation_refs.contains(&reference) {
                        finding.regulation_refs.push(reference);
                    }
                }
            }
            let confidence = entry.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
            finding.ai_enhanced = true;
            finding.ai_confidence = confidence;
            finding.ai_model = Some(model_id.to_string());
            confidences.push(confidence);
        }

        let mut discovered = Vec::new();
        for entry in reply.new_findings {
            if entry.line == 0 || entry.description.is_empty() {
                continue;
            }
            let excerpt = truncate_excerpt(&entry.excerpt);
            let language = privguard_scan::language_for_path(std::path::Path::new(&entry.file_path))
                .unwrap_or(Language::JavaScript);
            discovered.push(Finding {
                finding_id: finding_identity(&entry.file_path, entry.line, "AI_DISCOVERED", &excerpt),
                file_path: entry.file_path,
                line: entry.line,
                language,
                rule_id: "AI_DISCOVERED".to_string(),
                rule_description: "Discovered by AI analysis".to_string(),
                category: Category::AiGuidance,
                severity: parse_severity(entry.severity.as_deref()),
                match_excerpt: excerpt,
                description: entry.description,
                fix_hint: entry.fix,
                impact: None,
                regulation_refs: Vec::new(),
                is_positive: false,
                suppressed: false,
                suppressed_reason: None,
                truncated: false,
                ai_enhanced: true,
                ai_confidence: 0.5,
                ai_model: Some(model_id.to_string()),
            });
        }
        discovered
    }
}

fn parse_severity(raw: Option<&str>) -> Severity {
    match raw.map(str::to_ascii_uppercase).as_deref() {
        Some("CRITICAL") => Severity::Critical,
        Some("HIGH") => Severity::High,
        Some("LOW") => Severity::Low,
        _ => Severity::Medium,
    }
}

fn parse_reply_regulation(reg: &ReplyRegulation) -> Option<RegulationRef> {
    let regulation = match reg.regulation.to_ascii_uppercase().as_str() {
        "GDPR" => privguard_types::Regulation::Gdpr,
        "CCPA" => privguard_types::Regulation::Ccpa,
        "HIPAA" => privguard_types::Regulation::Hipaa,
        "PCI-DSS" | "PCI" => privguard_types::Regulation::PciDss,
        "" => return None,
        _ => privguard_types::Regulation::General,
    };
    Some(RegulationRef::new(regulation, reg.article.clone()))
}

impl Stage for AiEnhanceStage {
    type Input = ScanOutput;
    type Output = EnhanceOutput;

    fn id(&self) -> StageId {
        StageId::AiEnhance
    }

    fn input_summary(&self, input: &ScanOutput) -> String {
        format!("{} findings", input.findings.len())
    }

    fn fallback(&self, input: &ScanOutput) -> EnhanceOutput {
        EnhanceOutput {
            findings: input.findings.clone(),
            discovered: 0,
        }
    }

    fn compute(
        &self,
        ctx: &StageContext<'_>,
        input: &ScanOutput,
        errors: &mut Vec<StageError>,
        ai: &mut AiUsage,
    ) -> anyhow::Result<EnhanceOutput> {
        let mut findings = input.findings.clone();

        let Some(client) = ctx.ai else {
            // AI disabled: deterministic pass-through.
            return Ok(EnhanceOutput {
                findings,
                discovered: 0,
            });
        };

        let batch_ids: Vec<Vec<String>> = findings
            .iter()
            .filter(|f| f.is_countable())
            .map(|f| f.finding_id.clone())
            .collect::<Vec<_>>()
            .chunks(BATCH_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();

        let mut confidences = Vec::new();
        let mut discovered: Vec<Finding> = Vec::new();
        let mut any_success = false;

        for ids in batch_ids {
            let batch: Vec<&Finding> = findings
                .iter()
                .filter(|f| ids.contains(&f.finding_id))
                .collect();
            let prompt = Self::batch_prompt(&batch);
            let Some(reply_text) = client.analyze(&prompt, None) else {
                errors.push(StageError::new(
                    ErrorCategory::AiUnavailable,
                    "AI enhancement unavailable for batch; findings passed through",
                ));
                continue;
            };
            let Some(value) = extract_json_object(&reply_text) else {
                errors.push(StageError::new(
                    ErrorCategory::AiUnavailable,
                    "unparsable AI enhancement reply",
                ));
                continue;
            };
            let Ok(reply) = serde_json::from_value::<EnhancementReply>(value) else {
                errors.push(StageError::new(
                    ErrorCategory::AiUnavailable,
                    "AI enhancement reply did not match the expected shape",
                ));
                continue;
            };
            any_success = true;
            discovered.extend(Self::merge_reply(
                &mut findings,
                reply,
                client.model_id(),
                &mut confidences,
            ));
        }

        // Deterministic merge order for appended findings.
        discovered.sort_by(|a, b| a.finding_id.cmp(&b.finding_id));
        let discovered_count = discovered.len();
        findings.extend(discovered);

        if any_success {
            ai.used = true;
            ai.model = Some(client.model_id().to_string());
            ai.confidence = if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            };
        }

        Ok(EnhanceOutput {
            findings,
            discovered: discovered_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::run_stage;
    use privguard_store::MemoryStore;
    use privguard_types::Regulation;

    fn base_finding(id_seed: &str) -> Finding {
        let excerpt = format!("let {id_seed} = 1;");
        Finding {
            finding_id: finding_identity("a.js", 1, "R1", &excerpt),
            file_path: "a.js".into(),
            line: 1,
            language: Language::JavaScript,
            rule_id: "R1".into(),
            rule_description: "Hardcoded email address".into(),
            category: Category::Pii,
            severity: Severity::Medium,
            match_excerpt: excerpt,
            description: "original".into(),
            fix_hint: "fix".into(),
            impact: None,
            regulation_refs: vec![RegulationRef::new(Regulation::Gdpr, "Art. 5")],
            is_positive: false,
            suppressed: false,
            suppressed_reason: None,
            truncated: false,
            ai_enhanced: false,
            ai_confidence: 0.0,
            ai_model: None,
        }
    }

    fn scan_output(findings: Vec<Finding>) -> ScanOutput {
        ScanOutput {
            findings,
            ..ScanOutput::default()
        }
    }

    #[test]
    fn without_ai_findings_pass_through_unchanged() {
        let store = MemoryStore::new();
        let ctx = StageContext::new("c1", None, &store);
        let input = scan_output(vec![base_finding("a"), base_finding("b")]);
        let result = run_stage(&AiEnhanceStage, &ctx, &input);

        assert!(!result.ai.used);
        assert_eq!(result.output.findings, input.findings);
        assert_eq!(result.output.discovered, 0);
        assert!(result.output.findings.iter().all(|f| !f.ai_enhanced));
    }

    #[test]
    fn merge_preserves_identity_and_appends_regulations() {
        let mut findings = vec![base_finding("a")];
        let original_id = findings[0].finding_id.clone();
        let reply = EnhancementReply {
            enhanced: vec![EnhancedEntry {
                finding_id: original_id.clone(),
                description: Some("Enriched description".into()),
                business_impact: Some("churn risk".into()),
                regulations: vec![ReplyRegulation {
                    regulation: "CCPA".into(),
                    article: "§1798.100".into(),
                }],
                confidence: Some(0.8),
            }],
            new_findings: vec![],
        };
        let mut confidences = Vec::new();
        let discovered =
            AiEnhanceStage::merge_reply(&mut findings, reply, "model-x", &mut confidences);

        assert!(discovered.is_empty());
        let f = &findings[0];
        assert_eq!(f.finding_id, original_id);
        assert_eq!(f.rule_id, "R1");
        assert_eq!(f.line, 1);
        assert!(f.description.starts_with("Enriched description"));
        assert!(f.description.contains("churn risk"));
        // Original regulation still present, new one appended.
        assert_eq!(f.regulation_refs.len(), 2);
        assert_eq!(f.regulation_refs[0].regulation, Regulation::Gdpr);
        assert!(f.ai_enhanced);
        assert_eq!(f.ai_confidence, 0.8);
    }

    #[test]
    fn discovered_findings_get_fresh_ids_and_the_ai_rule_id() {
        let mut findings = vec![base_finding("a")];
        let reply = EnhancementReply {
            enhanced: vec![],
            new_findings: vec![DiscoveredEntry {
                file_path: "a.js".into(),
                line: 7,
                description: "Shadow profile assembly".into(),
                excerpt: "buildShadowProfile(user)".into(),
                severity: Some("HIGH".into()),
                fix: "Gate on consent".into(),
            }],
        };
        let mut confidences = Vec::new();
        let discovered =
            AiEnhanceStage::merge_reply(&mut findings, reply, "model-x", &mut confidences);

        assert_eq!(discovered.len(), 1);
        let d = &discovered[0];
        assert_eq!(d.rule_id, "AI_DISCOVERED");
        assert_eq!(d.severity, Severity::High);
        assert!(d.ai_enhanced);
        assert_ne!(d.finding_id, findings[0].finding_id);
    }

    #[test]
    fn unknown_finding_ids_in_reply_are_ignored() {
        let mut findings = vec![base_finding("a")];
        let before = findings.clone();
        let reply = EnhancementReply {
            enhanced: vec![EnhancedEntry {
                finding_id: "no-such-id".into(),
                description: Some("x".into()),
                business_impact: None,
                regulations: vec![],
                confidence: None,
            }],
            new_findings: vec![],
        };
        let mut confidences = Vec::new();
        AiEnhanceStage::merge_reply(&mut findings, reply, "m", &mut confidences);
        assert_eq!(findings, before);
    }
}
