//! # privguard-rules
//!
//! The rule catalog: ten pattern-based privacy rules evaluated over file
//! content. A rule is a pure function `evaluate(content, path) ->
//! Vec<RuleMatch>`; it performs no I/O and never suspends. All regexes are
//! compiled once when the catalog is built and shared across concurrent
//! runs.
//!
//! Ordering contract: rules run in catalog order, patterns in declaration
//! order, and the engine sorts final violations by
//! `(file_path, line, rule position, pattern_index)`.

mod advanced;
mod consent;
mod dataflow;
mod encryption;
mod guidance;
mod patterns;
mod pii;
mod policy;
mod remote;

use std::path::Path;
use std::sync::Arc;

use privguard_types::{Category, Impact, RegulationRef, RuleInfo, RuleStats, Severity};

pub use remote::{RemoteAnalyzer, RemoteFinding};

/// A single raw hit produced by a rule before it becomes a `Finding`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    /// 1-based line the pattern first matched on.
    pub line: u32,
    /// Position of the pattern within its rule's declaration order.
    pub pattern_index: usize,
    pub subtype: String,
    pub severity: Severity,
    /// Developer-guidance impact classification, carried by the guidance
    /// rule's hits only.
    pub impact: Option<Impact>,
    pub description: String,
    pub fix_hint: String,
    pub regulations: Vec<RegulationRef>,
    /// The offending line snippet (subtype-prefixed for the comprehensive
    /// PII rule, whose sub-pattern identity travels in the excerpt).
    pub excerpt: String,
    /// Good-practice marker hit; tracked, never counted as a violation.
    pub is_positive: bool,
}

/// A deterministic privacy rule.
pub trait Rule: Send + Sync {
    fn id(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn category(&self) -> Category;
    /// Evaluate file content. Must be pure: no I/O, no clock, no globals.
    fn evaluate(&self, content: &str, path: &Path) -> Vec<RuleMatch>;
}

/// The compiled rule catalog. Built once, shared across runs.
pub struct Catalog {
    rules: Vec<Arc<dyn Rule>>,
}

impl Catalog {
    /// The nine built-in rules (R1..R9) in contract order.
    pub fn builtin() -> Self {
        let rules: Vec<Arc<dyn Rule>> = vec![
            Arc::new(pii::EmailRule::new()),
            Arc::new(pii::ComprehensivePiiRule::new()),
            Arc::new(policy::PrivacyPolicyRule::new()),
            Arc::new(consent::ConsentRule::new()),
            Arc::new(encryption::EncryptionRule::new()),
            Arc::new(dataflow::DataFlowRule::new()),
            Arc::new(advanced::AdvancedPrivacyRule::new()),
            Arc::new(guidance::AiGuidanceRule::new()),
            Arc::new(guidance::DeveloperGuidanceRule::new()),
        ];
        Self { rules }
    }

    /// Append the remote-AI rule (R10) backed by the given analyzer.
    pub fn with_remote(mut self, analyzer: Arc<dyn RemoteAnalyzer>) -> Self {
        self.rules.push(Arc::new(remote::RemoteAiRule::new(analyzer)));
        self
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// Catalog position of a rule id, used as the `rule_id` ordering key so
    /// R10 sorts after R9.
    pub fn position(&self, rule_id: &str) -> usize {
        self.rules
            .iter()
            .position(|r| r.id() == rule_id)
            .unwrap_or(usize::MAX)
    }

    pub fn stats(&self) -> RuleStats {
        RuleStats {
            count: self.rules.len(),
            rule_descriptions: self
                .rules
                .iter()
                .map(|r| RuleInfo {
                    rule_id: r.id().to_string(),
                    description: r.description().to_string(),
                })
                .collect(),
        }
    }
}
