//! Human-readable terminal output for scan and pipeline runs, plus a
//! Markdown rendering of the final report.

use std::fmt::Write as _;

use privguard_types::{PipelineMetrics, Report};

pub fn print_scan_footer(findings: usize, files_scanned: usize, warnings: &[String]) {
    if findings == 0 {
        println!("No privacy violations detected ({files_scanned} files scanned)");
    } else {
        println!("{findings} violations across {files_scanned} files");
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

pub fn print_report_summary(report: &Report, locator: Option<&str>, metrics: &PipelineMetrics) {
    let summary = &report.executive_summary;
    println!("# Privacy Scan Report");
    println!();
    println!("status            {}", summary.status);
    println!("compliance score  {}/100", summary.compliance_score);
    println!("risk level        {}", summary.risk_level.as_str());
    println!("violations        {}", summary.total_violations);
    println!("high severity     {}", summary.high_severity_count);
    if summary.positive_practices > 0 {
        println!("positive practices {}", summary.positive_practices);
    }
    println!();
    println!("{}", summary.message);

    if !report.compliance_analysis.violations_by_regulation.is_empty() {
        println!();
        println!("## Violations by regulation");
        for (regulation, entries) in &report.compliance_analysis.violations_by_regulation {
            println!("  {:<8} {}", regulation, entries.len());
        }
    }

    if !report.action_items.is_empty() {
        println!();
        println!("## Action items");
        for item in &report.action_items {
            println!("  - {item}");
        }
    }

    if !report.metadata.degraded_reasons.is_empty() {
        println!();
        println!("## Degradations");
        for reason in &report.metadata.degraded_reasons {
            println!("  - {reason}");
        }
    }

    println!();
    println!(
        "completed {} stages in {} ms ({} AI calls, {} failed)",
        report.metadata.completed_stages.len(),
        metrics.total_duration_ms,
        metrics.ai_calls,
        metrics.ai_failures
    );
    if let Some(locator) = locator {
        println!("report persisted at {locator}");
    }
}

/// Render the report as a Markdown document.
pub fn render_markdown(report: &Report) -> String {
    let summary = &report.executive_summary;
    let mut out = String::new();

    let _ = writeln!(out, "# Privacy Scan Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "Generated: {}", report.metadata.generated_at);
    let _ = writeln!(out, "Correlation: `{}`", report.metadata.correlation_id);
    if let Some(path) = &report.metadata.project_path {
        let _ = writeln!(out, "Project: `{path}`");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| Status | {} |", summary.status);
    let _ = writeln!(out, "| Compliance score | {}/100 |", summary.compliance_score);
    let _ = writeln!(out, "| Risk level | {} |", summary.risk_level.as_str());
    let _ = writeln!(out, "| Violations | {} |", summary.total_violations);
    let _ = writeln!(out, "| High severity | {} |", summary.high_severity_count);
    let _ = writeln!(out, "| Positive practices | {} |", summary.positive_practices);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", summary.message);

    if !report.detailed_findings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Findings");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Rule | Severity | Location | Description |");
        let _ = writeln!(out, "|---|---|---|---|");
        for finding in &report.detailed_findings {
            if !finding.is_countable() {
                continue;
            }
            let _ = writeln!(
                out,
                "| {} | {} | `{}:{}` | {} |",
                finding.rule_id,
                finding.severity,
                finding.file_path,
                finding.line,
                finding.description.replace('|', "\\|"),
            );
        }
    }

    if !report.fix_recommendations.suggestions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Suggested fixes");
        for fix in &report.fix_recommendations.suggestions {
            let _ = writeln!(out);
            let _ = writeln!(out, "### `{}:{}` ({})", fix.file_path, fix.line, fix.rule_id);
            let _ = writeln!(out);
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "{}", fix.before);
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "becomes");
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "{}", fix.after);
            let _ = writeln!(out, "```");
            for step in &fix.steps {
                let _ = writeln!(out, "1. {step}");
            }
        }
    }

    if !report.action_items.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Action items");
        let _ = writeln!(out);
        for item in &report.action_items {
            let _ = writeln!(out, "- {item}");
        }
    }

    out
}
