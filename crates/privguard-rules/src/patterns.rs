//! Shared line-pattern machinery: declarative pattern specs, one-time
//! compilation, and the one-line suppression window.

use privguard_types::{Regulation, RegulationRef, Severity};
use regex::Regex;

use crate::RuleMatch;

/// Where a suppression marker may appear relative to the flagged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerWindow {
    /// Line L or L-1. The contract window; not configurable.
    Previous,
    /// Line L or the nearest preceding non-blank line (consent rule).
    PreviousNonBlank,
}

/// How the excerpt is rendered into the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExcerptStyle {
    /// The trimmed offending line.
    Line,
    /// `"<subtype>: <line>"`; sub-pattern identity travels in the excerpt.
    SubtypePrefixed,
}

/// A declarative pattern. Tables of these are the bulk of the catalog.
pub(crate) struct PatternSpec {
    pub subtype: &'static str,
    pub pattern: &'static str,
    /// Suppression marker regex; `None` means the pattern cannot be
    /// suppressed.
    pub marker: Option<&'static str>,
    /// File-level companion tokens: the pattern fires only when none of
    /// these occur anywhere in the file.
    pub requires_absent: &'static [&'static str],
    pub severity: Severity,
    pub description: &'static str,
    pub fix_hint: &'static str,
    pub regulations: &'static [(Regulation, &'static str)],
    pub is_positive: bool,
}

impl PatternSpec {
    /// Non-positive pattern with no marker and no file conditions.
    pub(crate) const fn simple(
        subtype: &'static str,
        pattern: &'static str,
        severity: Severity,
        description: &'static str,
        fix_hint: &'static str,
        regulations: &'static [(Regulation, &'static str)],
    ) -> Self {
        Self {
            subtype,
            pattern,
            marker: None,
            requires_absent: &[],
            severity,
            description,
            fix_hint,
            regulations,
            is_positive: false,
        }
    }
}

pub(crate) struct CompiledPattern {
    pub subtype: &'static str,
    pub regex: Regex,
    pub marker: Option<Regex>,
    pub requires_absent: &'static [&'static str],
    pub severity: Severity,
    pub description: &'static str,
    pub fix_hint: &'static str,
    pub regulations: &'static [(Regulation, &'static str)],
    pub is_positive: bool,
}

/// Compile a spec table. Pattern strings are compile-time constants, so a
/// failure here is a programming error caught by the catalog tests.
pub(crate) fn compile(specs: &'static [PatternSpec]) -> Vec<CompiledPattern> {
    specs
        .iter()
        .map(|spec| CompiledPattern {
            subtype: spec.subtype,
            regex: Regex::new(spec.pattern)
                .unwrap_or_else(|err| panic!("bad pattern for {}: {err}", spec.subtype)),
            marker: spec.marker.map(|m| {
                Regex::new(m).unwrap_or_else(|err| panic!("bad marker for {}: {err}", spec.subtype))
            }),
            requires_absent: spec.requires_absent,
            severity: spec.severity,
            description: spec.description,
            fix_hint: spec.fix_hint,
            regulations: spec.regulations,
            is_positive: spec.is_positive,
        })
        .collect()
}

/// True when `marker` appears inside the suppression window for line index
/// `idx` (0-based).
fn marker_in_window(marker: &Regex, lines: &[&str], idx: usize, window: MarkerWindow) -> bool {
    if marker.is_match(lines[idx]) {
        return true;
    }
    match window {
        MarkerWindow::Previous => idx > 0 && marker.is_match(lines[idx - 1]),
        MarkerWindow::PreviousNonBlank => lines[..idx]
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|l| marker.is_match(l)),
    }
}

/// Evaluate a compiled pattern table against file content.
///
/// Lines are split on `\n` (the scanner already normalized `\r\n`) and
/// numbered from 1. Patterns run in declaration order; lines in file order.
pub(crate) fn evaluate(
    patterns: &[CompiledPattern],
    content: &str,
    window: MarkerWindow,
    style: ExcerptStyle,
) -> Vec<RuleMatch> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut matches = Vec::new();

    for (pattern_index, pattern) in patterns.iter().enumerate() {
        if !pattern.requires_absent.is_empty()
            && pattern.requires_absent.iter().any(|tok| content.contains(tok))
        {
            continue;
        }
        for (idx, line) in lines.iter().enumerate() {
            if !pattern.regex.is_match(line) {
                continue;
            }
            if let Some(marker) = &pattern.marker {
                if marker_in_window(marker, &lines, idx, window) {
                    continue;
                }
            }
            let trimmed = line.trim();
            let excerpt = match style {
                ExcerptStyle::Line => trimmed.to_string(),
                ExcerptStyle::SubtypePrefixed => format!("{}: {}", pattern.subtype, trimmed),
            };
            matches.push(RuleMatch {
                line: (idx + 1) as u32,
                pattern_index,
                subtype: pattern.subtype.to_string(),
                severity: pattern.severity,
                impact: None,
                description: pattern.description.to_string(),
                fix_hint: pattern.fix_hint.to_string(),
                regulations: pattern
                    .regulations
                    .iter()
                    .map(|(reg, article)| RegulationRef::new(*reg, *article))
                    .collect(),
                excerpt,
                is_positive: pattern.is_positive,
            });
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    static SPECS: &[PatternSpec] = &[
        PatternSpec {
            subtype: "Test Capture",
            pattern: r"(?i)\bdata_capture\b",
            marker: Some(r"@consent_required"),
            requires_absent: &[],
            severity: Severity::High,
            description: "capture without consent",
            fix_hint: "add a consent marker",
            regulations: &[(Regulation::Gdpr, "Art. 6")],
            is_positive: false,
        },
        PatternSpec {
            subtype: "Needs Companion",
            pattern: r"(?i)\bretain_forever\b",
            marker: None,
            requires_absent: &["delete_after"],
            severity: Severity::Medium,
            description: "retention with no expiry",
            fix_hint: "declare a ttl",
            regulations: &[],
            is_positive: false,
        },
    ];

    #[test]
    fn marker_on_same_line_suppresses() {
        let patterns = compile(SPECS);
        let hits = evaluate(
            &patterns,
            "data_capture = true // @consent_required\n",
            MarkerWindow::Previous,
            ExcerptStyle::Line,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn marker_on_previous_line_suppresses() {
        let patterns = compile(SPECS);
        let hits = evaluate(
            &patterns,
            "// @consent_required\ndata_capture = true\n",
            MarkerWindow::Previous,
            ExcerptStyle::Line,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn marker_two_lines_up_does_not_suppress() {
        let patterns = compile(SPECS);
        let hits = evaluate(
            &patterns,
            "// @consent_required\nlet other = 1;\ndata_capture = true\n",
            MarkerWindow::Previous,
            ExcerptStyle::Line,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 3);
    }

    #[test]
    fn non_blank_window_skips_blank_lines() {
        let patterns = compile(SPECS);
        let content = "// @consent_required\n\n\ndata_capture = true\n";
        let strict = evaluate(&patterns, content, MarkerWindow::Previous, ExcerptStyle::Line);
        assert_eq!(strict.len(), 1);
        let lenient = evaluate(
            &patterns,
            content,
            MarkerWindow::PreviousNonBlank,
            ExcerptStyle::Line,
        );
        assert!(lenient.is_empty());
    }

    #[test]
    fn companion_token_anywhere_in_file_suppresses() {
        let patterns = compile(SPECS);
        let hits = evaluate(
            &patterns,
            "retain_forever = true\n// cleanup: delete_after 30d\n",
            MarkerWindow::Previous,
            ExcerptStyle::Line,
        );
        assert!(hits.is_empty());

        let hits = evaluate(
            &patterns,
            "retain_forever = true\n",
            MarkerWindow::Previous,
            ExcerptStyle::Line,
        );
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn subtype_prefixed_excerpt() {
        let patterns = compile(SPECS);
        let hits = evaluate(
            &patterns,
            "data_capture = 1\n",
            MarkerWindow::Previous,
            ExcerptStyle::SubtypePrefixed,
        );
        assert_eq!(hits[0].excerpt, "Test Capture: data_capture = 1");
    }

    #[test]
    fn lines_are_one_based() {
        let patterns = compile(SPECS);
        let hits = evaluate(
            &patterns,
            "first\nsecond data_capture\n",
            MarkerWindow::Previous,
            ExcerptStyle::Line,
        );
        assert_eq!(hits[0].line, 2);
    }
}
