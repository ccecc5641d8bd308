//! The common stage skeleton: validate → compute → fallback → persist →
//! emit metrics. `run_stage` is the only way a stage executes, so every
//! stage inherits the fail-open contract: it always produces a
//! `StageResult`, whatever went wrong inside.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use privguard_ai::AiClient;
use privguard_store::ResultStore;
use privguard_types::{AiUsage, ErrorCategory, StageError, StageId, StageResult, SCHEMA_VERSION};
use serde::Serialize;

/// Everything a stage may touch besides its input. One per pipeline run;
/// nothing here is shared across correlations.
pub struct StageContext<'a> {
    pub correlation_id: String,
    /// `None` when AI is disabled for the run; stages then take their
    /// deterministic fallback path.
    pub ai: Option<&'a AiClient>,
    pub store: &'a dyn ResultStore,
}

impl<'a> StageContext<'a> {
    pub fn new(
        correlation_id: impl Into<String>,
        ai: Option<&'a AiClient>,
        store: &'a dyn ResultStore,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ai,
            store,
        }
    }
}

/// One pipeline stage. `compute` may fail; `fallback` may not, since it must
/// return a shape-conformant output for any input.
pub trait Stage {
    type Input: Serialize;
    type Output: Serialize + Clone;

    fn id(&self) -> StageId;

    /// One-line description of the input for the stage result envelope.
    fn input_summary(&self, input: &Self::Input) -> String;

    /// Schema validation. A failure becomes the stage's only error and the
    /// fallback output is returned.
    fn validate(&self, _input: &Self::Input) -> Result<(), StageError> {
        Ok(())
    }

    /// The minimal pass-through output used when validation or compute
    /// fails.
    fn fallback(&self, input: &Self::Input) -> Self::Output;

    /// The stage body. Recoverable problems are pushed onto `errors`; AI
    /// involvement is recorded on `ai`.
    fn compute(
        &self,
        ctx: &StageContext<'_>,
        input: &Self::Input,
        errors: &mut Vec<StageError>,
        ai: &mut AiUsage,
    ) -> anyhow::Result<Self::Output>;
}

pub(crate) fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn serialized_size<T: Serialize>(value: &T) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

/// Execute a stage. Always returns a `StageResult`; persistence runs after
/// the output exists and its failure is recorded, never raised.
pub fn run_stage<S: Stage>(
    stage: &S,
    ctx: &StageContext<'_>,
    input: &S::Input,
) -> StageResult<S::Output> {
    let started = Instant::now();
    let stage_id = stage.id();
    let input_size = serialized_size(input);
    tracing::info!(
        stage = %stage_id,
        correlation_id = %ctx.correlation_id,
        input_size,
        "stage started"
    );

    let mut errors: Vec<StageError> = Vec::new();
    let mut ai = AiUsage::default();

    let output = match stage.validate(input) {
        Err(schema_error) => {
            tracing::warn!(
                stage = %stage_id,
                correlation_id = %ctx.correlation_id,
                error = %schema_error.message,
                "stage input failed validation"
            );
            errors.push(schema_error);
            stage.fallback(input)
        }
        Ok(()) => match stage.compute(ctx, input, &mut errors, &mut ai) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    stage = %stage_id,
                    correlation_id = %ctx.correlation_id,
                    error = %err,
                    "stage compute failed; using fallback output"
                );
                errors.push(StageError::new(ErrorCategory::StagePartial, err.to_string()));
                stage.fallback(input)
            }
        },
    };

    let mut result = StageResult {
        schema_version: SCHEMA_VERSION,
        correlation_id: ctx.correlation_id.clone(),
        stage_id,
        produced_at_ms: now_ms(),
        input_summary: stage.input_summary(input),
        output,
        ai,
        errors,
    };

    // Persist after computing, best-effort.
    match serde_json::to_value(&result) {
        Ok(payload) => {
            if let Err(err) =
                ctx.store
                    .put_stage_result(&ctx.correlation_id, stage_id.as_str(), &payload)
            {
                result.errors.push(StageError::new(
                    ErrorCategory::IoTransient,
                    format!("stage result persistence failed: {err}"),
                ));
            }
        }
        Err(err) => {
            result.errors.push(StageError::new(
                ErrorCategory::IoTransient,
                format!("stage result serialization failed: {err}"),
            ));
        }
    }

    let output_size = serialized_size(&result.output);
    tracing::info!(
        stage = %stage_id,
        correlation_id = %ctx.correlation_id,
        duration_ms = started.elapsed().as_millis() as u64,
        input_size,
        output_size,
        ai_used = result.ai.used,
        ai_confidence = result.ai.confidence,
        errors = result.errors.len(),
        "stage finished"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use privguard_store::{FailStore, MemoryStore};

    struct Doubler;

    impl Stage for Doubler {
        type Input = u32;
        type Output = u32;

        fn id(&self) -> StageId {
            StageId::Scan
        }

        fn input_summary(&self, input: &u32) -> String {
            format!("n={input}")
        }

        fn validate(&self, input: &u32) -> Result<(), StageError> {
            if *input == 0 {
                return Err(StageError::new(ErrorCategory::InputInvalid, "zero input"));
            }
            Ok(())
        }

        fn fallback(&self, input: &u32) -> u32 {
            *input
        }

        fn compute(
            &self,
            _ctx: &StageContext<'_>,
            input: &u32,
            _errors: &mut Vec<StageError>,
            _ai: &mut AiUsage,
        ) -> anyhow::Result<u32> {
            if *input == 13 {
                anyhow::bail!("unlucky");
            }
            Ok(input * 2)
        }
    }

    #[test]
    fn successful_stage_persists_its_result() {
        let store = MemoryStore::new();
        let ctx = StageContext::new("c1", None, &store);
        let result = run_stage(&Doubler, &ctx, &21);
        assert_eq!(result.output, 42);
        assert!(result.errors.is_empty());
        assert!(store.stage_result("c1", "scan").is_some());
    }

    #[test]
    fn validation_failure_returns_fallback_with_error() {
        let store = MemoryStore::new();
        let ctx = StageContext::new("c1", None, &store);
        let result = run_stage(&Doubler, &ctx, &0);
        assert_eq!(result.output, 0);
        assert_eq!(result.errors[0].category, ErrorCategory::InputInvalid);
    }

    #[test]
    fn compute_failure_returns_fallback_with_stage_partial() {
        let store = MemoryStore::new();
        let ctx = StageContext::new("c1", None, &store);
        let result = run_stage(&Doubler, &ctx, &13);
        assert_eq!(result.output, 13);
        assert_eq!(result.errors[0].category, ErrorCategory::StagePartial);
    }

    #[test]
    fn unreachable_store_is_recorded_not_raised() {
        let ctx = StageContext::new("c1", None, &FailStore);
        let result = run_stage(&Doubler, &ctx, &21);
        assert_eq!(result.output, 42);
        assert!(result
            .errors
            .iter()
            .any(|e| e.category == ErrorCategory::IoTransient));
    }
}
