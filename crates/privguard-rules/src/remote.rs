//! R10: the remote-AI rule. Chunks file content, asks the remote analyzer
//! for additional findings, and maps its JSON reply into rule matches. Any
//! failure (transport, parse, shape) yields an empty list so the rest of
//! the catalog is unaffected.

use std::path::Path;
use std::sync::Arc;

use privguard_types::{Category, Regulation, RegulationRef, Severity};
use serde::Deserialize;

use crate::{Rule, RuleMatch};

/// Lines per analysis chunk.
const CHUNK_LINES: usize = 50;

/// The seam between the catalog and the AI collaborator. Implementations
/// must not panic; unavailability is expressed as `None`.
pub trait RemoteAnalyzer: Send + Sync {
    fn analyze(&self, prompt: &str) -> Option<String>;
}

/// One finding as returned by the remote analyzer.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFinding {
    /// 1-based line within the analyzed chunk.
    pub line: u32,
    pub subtype: String,
    pub description: String,
    #[serde(default)]
    pub fix: String,
    #[serde(default)]
    pub law: String,
    #[serde(default)]
    pub severity: Option<String>,
}

pub struct RemoteAiRule {
    analyzer: Arc<dyn RemoteAnalyzer>,
}

impl RemoteAiRule {
    pub fn new(analyzer: Arc<dyn RemoteAnalyzer>) -> Self {
        Self { analyzer }
    }

    fn prompt_for(path: &Path, chunk: &str) -> String {
        format!(
            "You are a privacy compliance analyst. Review the source excerpt \
             below for privacy or data-protection problems the standard rules \
             might miss. Respond with a JSON array only; each element must \
             have: line (1-based within the excerpt), subtype, description, \
             fix, law, severity (CRITICAL|HIGH|MEDIUM|LOW).\n\nFile: {}\n\n{}",
            path.display(),
            chunk
        )
    }
}

impl Rule for RemoteAiRule {
    fn id(&self) -> &'static str {
        "R10"
    }

    fn description(&self) -> &'static str {
        "Remote AI analysis"
    }

    fn category(&self) -> Category {
        Category::AiGuidance
    }

    fn evaluate(&self, content: &str, path: &Path) -> Vec<RuleMatch> {
        let lines: Vec<&str> = content.split('\n').collect();
        let mut matches = Vec::new();

        for (chunk_index, chunk) in lines.chunks(CHUNK_LINES).enumerate() {
            let offset = (chunk_index * CHUNK_LINES) as u32;
            let text = chunk.join("\n");
            let Some(reply) = self.analyzer.analyze(&Self::prompt_for(path, &text)) else {
                // Unavailable analyzer: no remote findings, no error.
                return Vec::new();
            };
            let Some(found) = parse_remote_reply(&reply) else {
                tracing::warn!(path = %path.display(), "unparsable remote analysis reply");
                continue;
            };
            for (pattern_index, finding) in found.into_iter().enumerate() {
                if finding.line == 0 {
                    continue;
                }
                let line = offset + finding.line;
                let source_line = lines
                    .get((line - 1) as usize)
                    .map(|l| l.trim())
                    .unwrap_or_default();
                let mut regulations = Vec::new();
                if let Some(reg) = parse_law(&finding.law) {
                    regulations.push(reg);
                }
                matches.push(RuleMatch {
                    line,
                    pattern_index,
                    subtype: finding.subtype,
                    severity: parse_severity(finding.severity.as_deref()),
                    impact: None,
                    description: finding.description,
                    fix_hint: finding.fix,
                    regulations,
                    excerpt: source_line.to_string(),
                    is_positive: false,
                });
            }
        }

        matches
    }
}

/// Extract the leading JSON array from a possibly markdown-wrapped reply.
fn parse_remote_reply(reply: &str) -> Option<Vec<RemoteFinding>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

fn parse_severity(raw: Option<&str>) -> Severity {
    match raw.map(str::to_ascii_uppercase).as_deref() {
        Some("CRITICAL") => Severity::Critical,
        Some("HIGH") => Severity::High,
        Some("LOW") => Severity::Low,
        _ => Severity::Medium,
    }
}

/// Map a law string like `"GDPR Art. 17"` or `"CCPA §1798.120"` onto a
/// regulation reference; unrecognized strings become a GENERAL reference.
fn parse_law(law: &str) -> Option<RegulationRef> {
    let trimmed = law.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_ascii_uppercase();
    let (regulation, rest) = if let Some(rest) = upper.strip_prefix("GDPR") {
        (Regulation::Gdpr, rest)
    } else if let Some(rest) = upper.strip_prefix("CCPA") {
        (Regulation::Ccpa, rest)
    } else if let Some(rest) = upper.strip_prefix("HIPAA") {
        (Regulation::Hipaa, rest)
    } else if let Some(rest) = upper.strip_prefix("PCI-DSS") {
        (Regulation::PciDss, rest)
    } else {
        return Some(RegulationRef::new(Regulation::General, trimmed));
    };
    let offset = trimmed.len() - rest.len();
    let article = trimmed[offset..].trim();
    Some(RegulationRef::new(
        regulation,
        if article.is_empty() { trimmed } else { article },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedAnalyzer(Option<String>);

    impl RemoteAnalyzer for CannedAnalyzer {
        fn analyze(&self, _prompt: &str) -> Option<String> {
            self.0.clone()
        }
    }

    fn content() -> String {
        "let a = 1;\nshadow_profile(user);\nlet b = 2;\n".to_string()
    }

    #[test]
    fn unavailable_analyzer_yields_empty() {
        let rule = RemoteAiRule::new(Arc::new(CannedAnalyzer(None)));
        assert!(rule.evaluate(&content(), Path::new("t.js")).is_empty());
    }

    #[test]
    fn markdown_wrapped_array_is_parsed() {
        let reply = "Here is my analysis:\n```json\n[{\"line\":2,\"subtype\":\"Shadow Profiling\",\"description\":\"Builds a profile without consent\",\"fix\":\"Gate on consent\",\"law\":\"GDPR Art. 22\",\"severity\":\"HIGH\"}]\n```";
        let rule = RemoteAiRule::new(Arc::new(CannedAnalyzer(Some(reply.to_string()))));
        let hits = rule.evaluate(&content(), Path::new("t.js"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 2);
        assert_eq!(hits[0].subtype, "Shadow Profiling");
        assert_eq!(hits[0].severity, Severity::High);
        assert_eq!(hits[0].excerpt, "shadow_profile(user);");
        assert_eq!(
            hits[0].regulations[0],
            RegulationRef::new(Regulation::Gdpr, "Art. 22")
        );
    }

    #[test]
    fn garbage_reply_yields_no_matches() {
        let rule = RemoteAiRule::new(Arc::new(CannedAnalyzer(Some("not json at all".into()))));
        assert!(rule.evaluate(&content(), Path::new("t.js")).is_empty());
    }

    #[test]
    fn law_parsing_variants() {
        assert_eq!(
            parse_law("CCPA §1798.120"),
            Some(RegulationRef::new(Regulation::Ccpa, "§1798.120"))
        );
        assert_eq!(
            parse_law("ePrivacy Directive"),
            Some(RegulationRef::new(Regulation::General, "ePrivacy Directive"))
        );
        assert_eq!(parse_law("  "), None);
    }

    #[test]
    fn severity_defaults_to_medium() {
        assert_eq!(parse_severity(None), Severity::Medium);
        assert_eq!(parse_severity(Some("weird")), Severity::Medium);
        assert_eq!(parse_severity(Some("critical")), Severity::Critical);
    }
}
