//! S3: the compliance stage. Groups findings by regulation, computes the
//! contract compliance score, rolls up risk, and emits prioritized
//! recommendations. The AI collaborator may rewrite recommendation text but
//! can never change the score or the regulation grouping.

use std::collections::BTreeMap;

use privguard_ai::extract::extract_json_array;
use privguard_types::{
    compliance_score, highest_severity, status_for_score, AiUsage, Category, ComplianceAnalysis,
    EnhanceOutput, Finding, Recommendation, Regulation, RegulationEntry, RiskAssessment,
    RiskLevel, Severity, StageError, StageId,
};
use serde_json::json;

use crate::framework::{Stage, StageContext};

pub struct ComplianceStage;

/// Hardcoded regulation map keyed on `rule_id` + `category`, merged with
/// whatever references the finding already carries.
fn mapped_regulations(finding: &Finding) -> Vec<Regulation> {
    let mut regs: Vec<Regulation> = finding
        .regulation_refs
        .iter()
        .map(|r| r.regulation)
        .collect();

    let extra: &[Regulation] = match (finding.rule_id.as_str(), finding.category) {
        ("R2", _) => &[Regulation::Gdpr, Regulation::Ccpa],
        ("R3", _) => &[Regulation::Gdpr, Regulation::Ccpa],
        ("R5", _) => &[Regulation::Gdpr],
        (_, Category::Pii) => &[Regulation::Gdpr, Regulation::Ccpa],
        (_, Category::Consent) => &[Regulation::Gdpr],
        (_, Category::Security) => &[Regulation::Gdpr, Regulation::PciDss],
        (_, Category::DataFlow) => &[Regulation::Gdpr],
        _ => &[],
    };
    regs.extend_from_slice(extra);
    regs.sort();
    regs.dedup();
    if regs.is_empty() {
        regs.push(Regulation::General);
    }
    regs
}

fn risk_assessment(findings: &[Finding]) -> RiskAssessment {
    let highest = highest_severity(findings);
    let level = highest.map(RiskLevel::from).unwrap_or(RiskLevel::Low);
    let critical_or_high = findings
        .iter()
        .filter(|f| f.is_countable() && f.severity >= Severity::High)
        .count() as u64;
    let medium = findings
        .iter()
        .filter(|f| f.is_countable() && f.severity == Severity::Medium)
        .count() as u64;

    RiskAssessment {
        business_risk: level,
        legal_risk: level,
        reputation_risk: level,
        financial_impact: format!("${} estimated", critical_or_high * 5000 + medium * 1000),
    }
}

fn recommendations(findings: &[Finding]) -> Vec<Recommendation> {
    let countable: Vec<&Finding> = findings.iter().filter(|f| f.is_countable()).collect();
    let critical = countable
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();
    let high = countable
        .iter()
        .filter(|f| f.severity == Severity::High)
        .count();
    let medium = countable
        .iter()
        .filter(|f| f.severity == Severity::Medium)
        .count();

    let mut out = Vec::new();
    if critical + high > 0 {
        out.push(Recommendation {
            priority: if critical > 0 {
                Severity::Critical
            } else {
                Severity::High
            },
            action: format!(
                "Fix {} high-severity violations immediately",
                critical + high
            ),
            timeline: "Within 24 hours".to_string(),
            impact: "Critical for compliance and risk mitigation".to_string(),
        });
    }
    if medium > 0 {
        out.push(Recommendation {
            priority: Severity::Medium,
            action: format!("Address {medium} medium-severity violations"),
            timeline: "Within 1 week".to_string(),
            impact: "Important for maintaining compliance".to_string(),
        });
    }
    out.push(Recommendation {
        priority: Severity::Medium,
        action: "Implement automated privacy scanning in the CI pipeline".to_string(),
        timeline: "Within 2 weeks".to_string(),
        impact: "Prevents future violations".to_string(),
    });

    // Priority-sorted, highest first; stable within a priority.
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

/// Let the collaborator rewrite recommendation wording. Counts and
/// priorities are pinned: the reply is ignored unless it is a string array
/// of exactly the same length.
fn rewrite_recommendations(
    client: &privguard_ai::AiClient,
    recs: &mut [Recommendation],
    ai: &mut AiUsage,
) {
    let prompt = format!(
        "Rewrite each remediation action below for an engineering audience. \
         Reply with a JSON array of strings, one per action, same order.\n{}",
        serde_json::to_string_pretty(&json!(recs
            .iter()
            .map(|r| r.action.clone())
            .collect::<Vec<_>>()))
        .unwrap_or_default()
    );
    let Some(reply) = client.analyze(&prompt, None) else {
        return;
    };
    let Some(value) = extract_json_array(&reply) else {
        return;
    };
    let Some(texts) = value.as_array() else {
        return;
    };
    if texts.len() != recs.len() {
        return;
    }
    for (rec, text) in recs.iter_mut().zip(texts) {
        if let Some(text) = text.as_str().filter(|t| !t.is_empty()) {
            rec.action = text.to_string();
        }
    }
    ai.used = true;
    ai.model = Some(client.model_id().to_string());
}

impl Stage for ComplianceStage {
    type Input = EnhanceOutput;
    type Output = ComplianceAnalysis;

    fn id(&self) -> StageId {
        StageId::Compliance
    }

    fn input_summary(&self, input: &EnhanceOutput) -> String {
        format!("{} findings", input.findings.len())
    }

    fn fallback(&self, input: &EnhanceOutput) -> ComplianceAnalysis {
        let severities: Vec<Severity> = input
            .findings
            .iter()
            .filter(|f| f.is_countable())
            .map(|f| f.severity)
            .collect();
        let score = compliance_score(severities.iter().copied());
        ComplianceAnalysis {
            total_violations: severities.len(),
            compliance_score: score,
            status: Some(status_for_score(score)),
            message: "Compliance analysis degraded; scores computed from raw findings".to_string(),
            ..ComplianceAnalysis::default()
        }
    }

    fn compute(
        &self,
        ctx: &StageContext<'_>,
        input: &EnhanceOutput,
        _errors: &mut Vec<StageError>,
        ai: &mut AiUsage,
    ) -> anyhow::Result<ComplianceAnalysis> {
        let findings = &input.findings;
        let countable: Vec<&Finding> = findings.iter().filter(|f| f.is_countable()).collect();

        let mut violations_by_regulation: BTreeMap<String, Vec<RegulationEntry>> = BTreeMap::new();
        for finding in &countable {
            for regulation in mapped_regulations(finding) {
                violations_by_regulation
                    .entry(regulation.as_str().to_string())
                    .or_default()
                    .push(RegulationEntry {
                        finding_id: finding.finding_id.clone(),
                        rule_id: finding.rule_id.clone(),
                        severity: finding.severity,
                        file_path: finding.file_path.clone(),
                        line: finding.line,
                        description: finding.description.clone(),
                    });
            }
        }

        let score = compliance_score(countable.iter().map(|f| f.severity));
        let status = status_for_score(score);
        let message = if countable.is_empty() {
            "No privacy violations detected".to_string()
        } else {
            format!(
                "Found {} privacy violations requiring attention",
                countable.len()
            )
        };

        let mut recs = recommendations(findings);
        if let Some(client) = ctx.ai {
            // Text only; score and grouping are already fixed above.
            rewrite_recommendations(client, &mut recs, ai);
        }

        Ok(ComplianceAnalysis {
            total_violations: countable.len(),
            compliance_score: score,
            status: Some(status),
            message,
            violations_by_regulation,
            risk_assessment: Some(risk_assessment(findings)),
            recommendations: recs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{run_stage, StageContext};
    use privguard_store::MemoryStore;
    use privguard_types::{finding_identity, Language, RegulationRef};

    fn finding(rule_id: &str, category: Category, severity: Severity, line: u32) -> Finding {
        let excerpt = format!("line {line}");
        Finding {
            finding_id: finding_identity("a.js", line, rule_id, &excerpt),
            file_path: "a.js".into(),
            line,
            language: Language::JavaScript,
            rule_id: rule_id.into(),
            rule_description: "desc".into(),
            category,
            severity,
            match_excerpt: excerpt,
            description: "desc".into(),
            fix_hint: String::new(),
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

    fn run(findings: Vec<Finding>) -> ComplianceAnalysis {
        let store = MemoryStore::new();
        let ctx = StageContext::new("c1", None, &store);
        let input = EnhanceOutput {
            findings,
            discovered: 0,
        };
        run_stage(&ComplianceStage, &ctx, &input).output
    }

    #[test]
    fn empty_run_scores_100_and_compliant() {
        let analysis = run(vec![]);
        assert_eq!(analysis.compliance_score, 100);
        assert_eq!(
            analysis.status,
            Some(privguard_types::ComplianceStatus::Compliant)
        );
        assert_eq!(analysis.total_violations, 0);
    }

    #[test]
    fn score_follows_contract_weights() {
        // One HIGH: 100 - 5/10*100 = 50.
        let analysis = run(vec![finding("R5", Category::Security, Severity::High, 1)]);
        assert_eq!(analysis.compliance_score, 50);
        assert_eq!(
            analysis.status,
            Some(privguard_types::ComplianceStatus::NonCompliant)
        );
    }

    #[test]
    fn grouping_merges_finding_refs_with_rule_map() {
        let analysis = run(vec![finding("R2", Category::Pii, Severity::Critical, 1)]);
        // Finding carries GDPR; the R2 map adds CCPA.
        assert!(analysis.violations_by_regulation.contains_key("GDPR"));
        assert!(analysis.violations_by_regulation.contains_key("CCPA"));
    }

    #[test]
    fn positive_findings_are_not_grouped_or_counted() {
        let mut positive = finding("R6", Category::DataFlow, Severity::Low, 2);
        positive.is_positive = true;
        let analysis = run(vec![positive]);
        assert_eq!(analysis.total_violations, 0);
        assert_eq!(analysis.compliance_score, 100);
        assert!(analysis.violations_by_regulation.is_empty());
    }

    #[test]
    fn risk_is_keyed_on_highest_severity() {
        let analysis = run(vec![
            finding("R1", Category::Pii, Severity::Medium, 1),
            finding("R2", Category::Pii, Severity::Critical, 2),
        ]);
        let risk = analysis.risk_assessment.unwrap();
        assert_eq!(risk.business_risk, RiskLevel::Critical);
        assert_eq!(risk.legal_risk, RiskLevel::Critical);
        // One critical ($5000) + one medium ($1000).
        assert_eq!(risk.financial_impact, "$6000 estimated");
    }

    #[test]
    fn recommendations_are_priority_sorted() {
        let analysis = run(vec![
            finding("R1", Category::Pii, Severity::Medium, 1),
            finding("R2", Category::Pii, Severity::Critical, 2),
        ]);
        let priorities: Vec<Severity> = analysis
            .recommendations
            .iter()
            .map(|r| r.priority)
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
        assert!(analysis.recommendations[0]
            .action
            .contains("high-severity violations immediately"));
    }
}
