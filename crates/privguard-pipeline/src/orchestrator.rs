//! The pipeline orchestrator: invokes the five stages strictly in order,
//! propagates the correlation id, enforces the global deadline, and always
//! returns a structurally complete report. Degradation is visible in
//! `executive_summary.status` and `metadata.degraded_reasons`, never as an
//! error to the caller.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use privguard_ai::AiClient;
use privguard_config::Settings;
use privguard_engine::Engine;
use privguard_store::ResultStore;
use privguard_types::{
    ErrorCategory, PipelineMetrics, Report, ScanRequest, StageError, StageId,
};

use crate::framework::{run_stage, StageContext};
use crate::stages::{
    compose_report, AiEnhanceStage, ComplianceStage, FixSuggestStage, ReportInputs, ReportStage,
    ScanStage,
};

/// Everything a pipeline run produces.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: Report,
    pub locator: Option<String>,
    pub metrics: PipelineMetrics,
    /// Errors recorded by each stage, keyed by stage.
    pub stage_errors: Vec<(StageId, Vec<StageError>)>,
}

pub struct Orchestrator {
    /// Engine with the remote-AI rule attached (when configured).
    engine_remote: Arc<Engine>,
    /// Engine with the built-in rules only, for `ai_enabled=false` runs.
    engine_plain: Arc<Engine>,
    ai: Option<Arc<AiClient>>,
    store: Arc<dyn ResultStore>,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(settings: Settings, store: Arc<dyn ResultStore>) -> Self {
        let mut engine_plain = Engine::new(settings.scan.workers);
        engine_plain.set_ignored_extra(settings.scan.ignored_extra.clone());
        engine_plain.set_ai_enabled(false);

        let mut engine_remote = Engine::new(settings.scan.workers);
        engine_remote.set_ignored_extra(settings.scan.ignored_extra.clone());
        if settings.ai.enabled {
            engine_remote.set_ai_config(settings.ai.clone());
        } else {
            engine_remote.set_ai_enabled(false);
        }

        let ai = settings
            .ai
            .enabled
            .then(|| Arc::new(AiClient::new(settings.ai.clone())));

        Self {
            engine_remote: Arc::new(engine_remote),
            engine_plain: Arc::new(engine_plain),
            ai,
            store,
            settings,
        }
    }

    /// Run the full pipeline. Never fails; callers read
    /// `report.executive_summary.status` and per-stage errors.
    pub fn run(&self, request: ScanRequest) -> PipelineOutcome {
        let started = Instant::now();
        let deadline = started + self.settings.deadline();
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        tracing::info!(correlation_id = %correlation_id, "pipeline started");

        // Per-run AI effectiveness: both the settings switch and the
        // request option must allow it.
        let ai_effective = self.settings.ai.enabled && request.options.ai_enabled;
        let ai_client = ai_effective.then_some(()).and(self.ai.as_deref());
        let engine = if ai_effective {
            Arc::clone(&self.engine_remote)
        } else {
            Arc::clone(&self.engine_plain)
        };

        let ctx = StageContext::new(correlation_id.clone(), ai_client, self.store.as_ref());

        let mut metrics = PipelineMetrics::default();
        let mut stage_errors: Vec<(StageId, Vec<StageError>)> = Vec::new();
        let mut degraded: BTreeSet<ErrorCategory> = BTreeSet::new();
        let mut completed: Vec<StageId> = Vec::new();
        let mut inputs = ReportInputs {
            project_path: request
                .project_path
                .as_ref()
                .map(|p| p.display().to_string()),
            ..ReportInputs::default()
        };

        let input_invalid = request.validate_source().is_err();
        if input_invalid {
            degraded.insert(ErrorCategory::InputInvalid);
            stage_errors.push((
                StageId::Scan,
                vec![request.validate_source().unwrap_err()],
            ));
        }

        let mut deadline_tripped = false;

        if !input_invalid {
            // S1 Scan.
            if Instant::now() >= deadline {
                deadline_tripped = true;
            } else {
                let stage_started = Instant::now();
                let result = run_stage(&ScanStage::new(Arc::clone(&engine)), &ctx, &request);
                metrics
                    .stage_duration_ms
                    .insert(StageId::Scan, stage_started.elapsed().as_millis());
                degraded.extend(result.errors.iter().map(|e| e.category));
                stage_errors.push((StageId::Scan, result.errors));
                inputs.scan = result.output;
                completed.push(StageId::Scan);
            }

            // S2 AI-Enhance.
            if !deadline_tripped && completed.contains(&StageId::Scan) {
                if Instant::now() >= deadline {
                    deadline_tripped = true;
                } else {
                    let stage_started = Instant::now();
                    let result = run_stage(&AiEnhanceStage, &ctx, &inputs.scan);
                    metrics
                        .stage_duration_ms
                        .insert(StageId::AiEnhance, stage_started.elapsed().as_millis());
                    degraded.extend(result.errors.iter().map(|e| e.category));
                    inputs.ai_used |= result.ai.used;
                    stage_errors.push((StageId::AiEnhance, result.errors));
                    inputs.enhanced = result.output;
                    completed.push(StageId::AiEnhance);
                }
            }

            // S3 Compliance.
            if !deadline_tripped && completed.contains(&StageId::AiEnhance) {
                if Instant::now() >= deadline {
                    deadline_tripped = true;
                } else {
                    let stage_started = Instant::now();
                    let result = run_stage(&ComplianceStage, &ctx, &inputs.enhanced);
                    metrics
                        .stage_duration_ms
                        .insert(StageId::Compliance, stage_started.elapsed().as_millis());
                    degraded.extend(result.errors.iter().map(|e| e.category));
                    inputs.ai_used |= result.ai.used;
                    stage_errors.push((StageId::Compliance, result.errors));
                    inputs.compliance = result.output;
                    completed.push(StageId::Compliance);
                }
            }

            // S4 Fix-Suggest.
            if !deadline_tripped && completed.contains(&StageId::Compliance) {
                if Instant::now() >= deadline {
                    deadline_tripped = true;
                } else {
                    let stage_started = Instant::now();
                    let result = run_stage(&FixSuggestStage, &ctx, &inputs.enhanced);
                    metrics
                        .stage_duration_ms
                        .insert(StageId::FixSuggest, stage_started.elapsed().as_millis());
                    degraded.extend(result.errors.iter().map(|e| e.category));
                    inputs.ai_used |= result.ai.used;
                    stage_errors.push((StageId::FixSuggest, result.errors));
                    inputs.fixes = result.output;
                    completed.push(StageId::FixSuggest);
                }
            }
        }

        // If the enhance stage never ran, the scan findings still belong in
        // the report.
        if !completed.contains(&StageId::AiEnhance) && completed.contains(&StageId::Scan) {
            inputs.enhanced = privguard_types::EnhanceOutput {
                findings: inputs.scan.findings.clone(),
                discovered: 0,
            };
        }

        if deadline_tripped {
            degraded.insert(ErrorCategory::DeadlineExceeded);
            tracing::warn!(
                correlation_id = %correlation_id,
                completed = completed.len(),
                "global deadline exceeded; emitting partial report"
            );
        }

        inputs.degraded_reasons = degraded.iter().copied().collect();
        inputs.completed_stages = completed.clone();

        // S5 Report always runs: even a degraded run ends in a report. The
        // deadline does not cancel it, only the stages before it.
        let stage_started = Instant::now();
        let result = run_stage(&ReportStage, &ctx, &inputs);
        metrics
            .stage_duration_ms
            .insert(StageId::Report, stage_started.elapsed().as_millis());
        let report_errors = result.errors.clone();
        let (mut report, locator) = (result.output.report, result.output.locator);
        if report_errors
            .iter()
            .any(|e| e.category == ErrorCategory::StagePartial)
        {
            // Fallback path lost the correlation id; restore it.
            report = compose_report(&correlation_id, &inputs);
        }
        stage_errors.push((StageId::Report, report_errors));

        metrics.total_duration_ms = started.elapsed().as_millis();
        if let Some(client) = &self.ai {
            metrics.ai_calls = client.calls_made();
            metrics.ai_failures = client.failures();
        }

        tracing::info!(
            correlation_id = %correlation_id,
            status = %report.executive_summary.status,
            total_violations = report.metadata.total_violations,
            duration_ms = metrics.total_duration_ms as u64,
            ai_calls = metrics.ai_calls,
            ai_failures = metrics.ai_failures,
            "pipeline finished"
        );

        PipelineOutcome {
            report,
            locator,
            metrics,
            stage_errors,
        }
    }
}
