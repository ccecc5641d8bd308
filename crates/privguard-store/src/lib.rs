//! # privguard-store
//!
//! The result-store seam: durable per-stage results keyed on
//! `stage_result/{correlation_id}/{stage_id}` and report blobs behind an
//! opaque locator. Puts are idempotent on the composite key; overwriting
//! with identical content is a no-op. Persistence failures are the caller's
//! to record; they never abort a pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for pipeline artifacts.
pub trait ResultStore: Send + Sync {
    /// Persist one stage's result. At-least-once; idempotent on
    /// `(correlation_id, stage_id)`.
    fn put_stage_result(
        &self,
        correlation_id: &str,
        stage_id: &str,
        payload: &Value,
    ) -> Result<(), StoreError>;

    /// Persist a report blob; returns an opaque locator.
    fn put_report(
        &self,
        correlation_id: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError>;
}

/// Filesystem-backed store. Stage results live under
/// `<root>/stage_result/<correlation_id>/<stage_id>.json`, reports under
/// `<root>/reports/`.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_if_changed(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Ok(existing) = std::fs::read(path) {
            if existing == bytes {
                // Identical content: observationally a no-op.
                return Ok(());
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename keeps readers from seeing torn payloads.
        let tmp = path.with_extension("tmp");
        with_retries(|| {
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        })
    }
}

impl ResultStore for FsStore {
    fn put_stage_result(
        &self,
        correlation_id: &str,
        stage_id: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let path = self
            .root
            .join("stage_result")
            .join(sanitize(correlation_id))
            .join(format!("{}.json", sanitize(stage_id)));
        let bytes = serde_json::to_vec_pretty(payload)?;
        self.write_if_changed(&path, &bytes)?;
        tracing::debug!(correlation_id, stage_id, path = %path.display(), "stage result persisted");
        Ok(())
    }

    fn put_report(
        &self,
        correlation_id: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let extension = match content_type {
            "application/pdf" => "pdf",
            _ => "json",
        };
        let path = self
            .root
            .join("reports")
            .join(format!("{}.{extension}", sanitize(correlation_id)));
        self.write_if_changed(&path, payload)?;
        Ok(path.display().to_string())
    }
}

/// In-memory store for tests and `--store`-less runs. Counts writes so
/// idempotence is observable.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    stage_results: BTreeMap<(String, String), Value>,
    reports: BTreeMap<String, (Vec<u8>, String)>,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_result(&self, correlation_id: &str, stage_id: &str) -> Option<Value> {
        self.inner
            .lock()
            .ok()?
            .stage_results
            .get(&(correlation_id.to_string(), stage_id.to_string()))
            .cloned()
    }

    pub fn report(&self, correlation_id: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .ok()?
            .reports
            .get(correlation_id)
            .map(|(bytes, _)| bytes.clone())
    }

    /// Number of mutating writes performed (no-op overwrites excluded).
    pub fn write_count(&self) -> u64 {
        self.inner.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    pub fn stage_result_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.stage_results.len())
            .unwrap_or(0)
    }
}

impl ResultStore for MemoryStore {
    fn put_stage_result(
        &self,
        correlation_id: &str,
        stage_id: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned lock".into()))?;
        let key = (correlation_id.to_string(), stage_id.to_string());
        if inner.stage_results.get(&key) == Some(payload) {
            return Ok(());
        }
        inner.stage_results.insert(key, payload.clone());
        inner.writes += 1;
        Ok(())
    }

    fn put_report(
        &self,
        correlation_id: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned lock".into()))?;
        inner.reports.insert(
            correlation_id.to_string(),
            (payload.to_vec(), content_type.to_string()),
        );
        inner.writes += 1;
        Ok(format!("memory://reports/{correlation_id}"))
    }
}

/// A store that always fails. Exercises the fail-open paths in stage tests.
pub struct FailStore;

impl ResultStore for FailStore {
    fn put_stage_result(&self, _: &str, _: &str, _: &Value) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("result store unreachable".into()))
    }

    fn put_report(&self, _: &str, _: &[u8], _: &str) -> Result<String, StoreError> {
        Err(StoreError::Unavailable("result store unreachable".into()))
    }
}

/// Retry an idempotent operation up to three times with exponential backoff
/// (base 200 ms, cap 2 s, jitter ±20%).
fn with_retries<F>(mut op: F) -> Result<(), StoreError>
where
    F: FnMut() -> Result<(), StoreError>,
{
    let mut last = None;
    for attempt in 0..3u32 {
        if attempt > 0 {
            std::thread::sleep(backoff_delay(attempt));
        }
        match op() {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "store write failed");
                last = Some(err);
            }
        }
    }
    Err(last.unwrap_or_else(|| StoreError::Unavailable("retries exhausted".into())))
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 200u64.saturating_mul(1 << (attempt - 1)).min(2_000);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let jitter = (nanos % (base_ms * 2 / 5 + 1)) as i64 - (base_ms / 5) as i64;
    Duration::from_millis(base_ms.saturating_add_signed(jitter))
}

/// Keep keys path-safe without changing their identity semantics.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
