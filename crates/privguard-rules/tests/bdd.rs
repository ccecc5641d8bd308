use std::path::Path;

use privguard_rules::Catalog;

fn eval_all(content: &str) -> Vec<(String, u32, String)> {
    let catalog = Catalog::builtin();
    let mut hits = Vec::new();
    for rule in catalog.rules() {
        for m in rule.evaluate(content, Path::new("fixture.java")) {
            hits.push((rule.id().to_string(), m.line, m.subtype.clone()));
        }
    }
    hits
}

#[test]
fn given_hardcoded_email_when_scanned_then_r1_fires_on_line_one() {
    let content = "public class T { String e = \"test@example.com\"; }";
    let hits = eval_all(content);
    assert!(hits.iter().any(|(rule, line, _)| rule == "R1" && *line == 1));
}

#[test]
fn given_consent_marker_when_capture_follows_then_r4_is_silent() {
    let content = "@consent_required\nconst data_capture = \"email\";\n";
    let hits = eval_all(content);
    assert!(hits.iter().all(|(rule, _, _)| rule != "R4"));
}

#[test]
fn given_http_url_when_scanned_then_r5_reports_insecure_protocol_and_r1_is_silent() {
    let content = "fetch('http://api.example.com/u')";
    let hits = eval_all(content);
    assert!(hits
        .iter()
        .any(|(rule, _, subtype)| rule == "R5" && subtype == "Insecure HTTP Protocol"));
    assert!(hits.iter().all(|(rule, _, _)| rule != "R1"));
}

#[test]
fn given_ssn_card_and_key_when_scanned_then_r2_emits_three_distinct_pairs() {
    let content = concat!(
        "String ssn = \"123-45-6789\";\n",
        "String card = \"4111-1111-1111-1111\";\n",
        "String api_key = \"AbCdEfGhIjKlMnOpQrStUvWxYz12\";\n",
    );
    let r2: std::collections::BTreeSet<(u32, String)> = eval_all(content)
        .into_iter()
        .filter(|(rule, _, _)| rule == "R2")
        .map(|(_, line, subtype)| (line, subtype))
        .collect();
    assert!(r2.len() >= 3);
    let lines: std::collections::BTreeSet<u32> = r2.iter().map(|(l, _)| *l).collect();
    assert_eq!(lines, [1u32, 2, 3].into_iter().collect());
}

#[test]
fn given_clean_code_when_scanned_then_catalog_is_silent() {
    let content = concat!(
        "pub fn add(a: u32, b: u32) -> u32 {\n",
        "    a + b\n",
        "}\n",
    );
    assert!(eval_all(content).is_empty());
}

#[test]
fn given_empty_content_when_scanned_then_catalog_is_silent() {
    assert!(eval_all("").is_empty());
}
