//! # privguard-ai
//!
//! The AI collaborator adapter. One operation: `analyze(prompt, context) ->
//! Option<String>`. Every failure mode (missing configuration, transport,
//! auth, quota, token budget) collapses to `None`; callers pattern-match
//! and run their deterministic fallback. The adapter never raises.
//!
//! Response *parsing* belongs to callers; the [`extract`] helpers pull the
//! leading JSON value out of markdown-wrapped replies.

pub mod cache;
pub mod extract;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use privguard_config::AiSettings;
use privguard_rules::RemoteAnalyzer;
use serde::Serialize;
use serde_json::Value;

pub use cache::ResponseCache;

/// Per-call bookkeeping, kept for metrics emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMetric {
    /// False when the call was refused before any transport (no endpoint,
    /// budget exhausted).
    pub attempted: bool,
    pub succeeded: bool,
    pub latency_ms: u64,
    pub model_id: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    model_id: &'a str,
    max_tokens: u32,
    temperature: f64,
    prompt: &'a str,
}

/// Blocking client for the hosted model service.
pub struct AiClient {
    settings: AiSettings,
    http: Option<reqwest::blocking::Client>,
    metrics: Mutex<Vec<CallMetric>>,
    /// Estimated tokens spent across the pipeline run.
    budget_spent: AtomicU64,
    /// Optional shared reply cache; off unless explicitly attached.
    cache: Option<Arc<ResponseCache>>,
}

impl AiClient {
    pub fn new(settings: AiSettings) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|err| {
                tracing::warn!(error = %err, "failed to build HTTP client; AI disabled");
                err
            })
            .ok();
        Self {
            settings,
            http,
            metrics: Mutex::new(Vec::new()),
            budget_spent: AtomicU64::new(0),
            cache: None,
        }
    }

    /// Attach a shared response cache. Sharing across correlations is the
    /// caller's explicit choice; entries are content-addressed and
    /// append-only, so sharing cannot leak divergent replies.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn model_id(&self) -> &str {
        &self.settings.model_id
    }

    /// Ask the collaborator for an analysis. `context` is appended to the
    /// prompt as pretty JSON when present.
    ///
    /// Returns the raw reply text, or `None` on any failure.
    pub fn analyze(&self, prompt: &str, context: Option<&Value>) -> Option<String> {
        let enhanced = match context {
            Some(ctx) => format!(
                "{prompt}\n\nContext:\n{}",
                serde_json::to_string_pretty(ctx).unwrap_or_default()
            ),
            None => prompt.to_string(),
        };

        if let Some(cache) = &self.cache {
            let key = ResponseCache::key_for(&enhanced);
            if let Some(reply) = cache.get(&key) {
                self.record(CallMetric {
                    attempted: false,
                    succeeded: true,
                    latency_ms: 0,
                    model_id: self.settings.model_id.clone(),
                });
                return Some(reply);
            }
        }

        let Some(endpoint) = self.settings.endpoint.clone() else {
            tracing::debug!("no AI endpoint configured");
            self.record(CallMetric {
                attempted: false,
                succeeded: false,
                latency_ms: 0,
                model_id: self.settings.model_id.clone(),
            });
            return None;
        };
        let Some(http) = &self.http else {
            return None;
        };

        // Rough token estimate; the budget is a guardrail, not an invoice.
        let estimate = (enhanced.len() as u64 / 4).max(1) + u64::from(self.settings.max_tokens);
        let spent = self.budget_spent.fetch_add(estimate, Ordering::SeqCst);
        if spent + estimate > self.settings.token_budget {
            tracing::warn!(spent, estimate, budget = self.settings.token_budget,
                "AI token budget exhausted; falling back");
            self.record(CallMetric {
                attempted: false,
                succeeded: false,
                latency_ms: 0,
                model_id: self.settings.model_id.clone(),
            });
            return None;
        }

        let body = AnalyzeRequest {
            model_id: &self.settings.model_id,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            prompt: &enhanced,
        };

        let started = Instant::now();
        let mut reply = None;
        for attempt in 0..3 {
            if attempt > 0 {
                std::thread::sleep(backoff_delay(attempt));
            }
            let mut request = http.post(&endpoint).json(&body);
            if let Some(key) = &self.settings.api_key {
                request = request.bearer_auth(key);
            }
            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        reply = response.json::<Value>().ok().and_then(extract_reply_text);
                        break;
                    }
                    if status.is_server_error() {
                        tracing::warn!(%status, attempt, "AI server error");
                        continue;
                    }
                    // Auth/quota/client errors are not retried.
                    tracing::warn!(%status, "AI call rejected");
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt, "AI transport error");
                }
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let succeeded = reply.is_some();
        if let (Some(cache), Some(text)) = (&self.cache, &reply) {
            cache.insert(ResponseCache::key_for(&enhanced), text.clone());
        }
        if !succeeded {
            tracing::warn!(latency_ms, "AI analysis unavailable; using deterministic fallback");
        }
        self.record(CallMetric {
            attempted: true,
            succeeded,
            latency_ms,
            model_id: self.settings.model_id.clone(),
        });
        reply
    }

    fn record(&self, metric: CallMetric) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.push(metric);
        }
    }

    /// Snapshot of all per-call metrics so far.
    pub fn metrics(&self) -> Vec<CallMetric> {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn calls_made(&self) -> u64 {
        self.metrics().iter().filter(|m| m.attempted).count() as u64
    }

    pub fn failures(&self) -> u64 {
        self.metrics()
            .iter()
            .filter(|m| m.attempted && !m.succeeded)
            .count() as u64
    }
}

impl RemoteAnalyzer for AiClient {
    fn analyze(&self, prompt: &str) -> Option<String> {
        AiClient::analyze(self, prompt, None)
    }
}

/// Pull the reply text out of the service response. Accepts the flat
/// `{"text": ...}` shape, the message-content list shape, and the legacy
/// `{"completion": ...}` shape.
fn extract_reply_text(value: Value) -> Option<String> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    if let Some(content) = value.get("content").and_then(Value::as_array) {
        let joined: String = content
            .iter()
            .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .collect();
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    value
        .get("completion")
        .and_then(Value::as_str)
        .map(String::from)
}

/// Exponential backoff: base 200 ms doubling, capped at 2 s, jitter ±20%.
/// Jitter derives from the clock's subsecond nanos; good enough to spread
/// retries without a randomness dependency.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 200u64.saturating_mul(1 << (attempt - 1)).min(2_000);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    // Map nanos onto [-20%, +20%] of the base.
    let jitter = (nanos % (base_ms * 2 / 5 + 1)) as i64 - (base_ms / 5) as i64;
    Duration::from_millis(base_ms.saturating_add_signed(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_settings() -> AiSettings {
        AiSettings {
            endpoint: None,
            ..AiSettings::default()
        }
    }

    #[test]
    fn analyze_without_endpoint_returns_none_and_records() {
        let client = AiClient::new(offline_settings());
        assert_eq!(client.analyze("hello", None), None);
        let metrics = client.metrics();
        assert_eq!(metrics.len(), 1);
        assert!(!metrics[0].attempted);
        assert!(!metrics[0].succeeded);
        assert_eq!(client.calls_made(), 0);
    }

    #[test]
    fn remote_analyzer_impl_is_fallback_safe() {
        let client = AiClient::new(offline_settings());
        let analyzer: &dyn RemoteAnalyzer = &client;
        assert_eq!(analyzer.analyze("prompt"), None);
    }

    #[test]
    fn budget_exhaustion_short_circuits() {
        let settings = AiSettings {
            endpoint: Some("http://127.0.0.1:9".into()),
            token_budget: 1,
            ..AiSettings::default()
        };
        let client = AiClient::new(settings);
        assert_eq!(client.analyze("a long prompt that exceeds one token", None), None);
        assert!(!client.metrics()[0].attempted);
    }

    #[test]
    fn reply_text_extraction_shapes() {
        let flat: Value = serde_json::json!({"text": "hi"});
        assert_eq!(extract_reply_text(flat).as_deref(), Some("hi"));

        let message: Value = serde_json::json!({
            "content": [
                {"type": "text", "text": "part one "},
                {"type": "tool", "id": "x"},
                {"type": "text", "text": "part two"}
            ]
        });
        assert_eq!(
            extract_reply_text(message).as_deref(),
            Some("part one part two")
        );

        let legacy: Value = serde_json::json!({"completion": "done"});
        assert_eq!(extract_reply_text(legacy).as_deref(), Some("done"));

        let empty: Value = serde_json::json!({"other": 1});
        assert_eq!(extract_reply_text(empty), None);
    }

    #[test]
    fn cached_replies_short_circuit_transport() {
        let cache = Arc::new(ResponseCache::new());
        cache.insert(ResponseCache::key_for("prompt"), "cached reply".into());

        let client = AiClient::new(offline_settings()).with_cache(Arc::clone(&cache));
        assert_eq!(
            client.analyze("prompt", None).as_deref(),
            Some("cached reply")
        );
        let metrics = client.metrics();
        assert!(!metrics[0].attempted);
        assert!(metrics[0].succeeded);
    }

    #[test]
    fn backoff_delays_are_bounded() {
        for attempt in 1..=3 {
            let delay = backoff_delay(attempt);
            let base = 200u64 * (1 << (attempt - 1));
            let base = base.min(2_000);
            assert!(delay.as_millis() as u64 >= base - base / 5);
            assert!(delay.as_millis() as u64 <= base + base / 5);
        }
    }
}
