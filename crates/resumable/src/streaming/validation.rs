use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

/// Checks that every placeholder anchor in `document` appears once and is
/// settled by at most one completion or error instruction, and that no
/// instruction targets an unknown anchor.
pub fn validate_document(document: &str) -> Result<(), String> {
    let anchor_regex = Regex::new(r#"<template id="B:(\d+)">"#).map_err(|e| e.to_string())?;
    let settle_regex =
        Regex::new(r#"<script>\$R([CX])\("B:(\d+)""#).map_err(|e| e.to_string())?;

    let mut anchors = FxHashSet::default();
    let mut problems = Vec::new();

    for captures in anchor_regex.captures_iter(document) {
        let segment = captures[1].to_string();
        if !anchors.insert(segment.clone()) {
            problems.push(format!("placeholder B:{segment} emitted more than once"));
        }
    }

    let mut settled: FxHashMap<String, usize> = FxHashMap::default();
    for captures in settle_regex.captures_iter(document) {
        let segment = captures[2].to_string();
        if !anchors.contains(&segment) {
            problems.push(format!("$R{} targets unknown placeholder B:{segment}", &captures[1]));
        }
        *settled.entry(segment).or_insert(0) += 1;
    }

    let mut repeated: Vec<_> = settled.into_iter().filter(|(_, count)| *count > 1).collect();
    repeated.sort();
    for (segment, count) in repeated {
        problems.push(format!("placeholder B:{segment} settled {count} times"));
    }

    if !problems.is_empty() {
        let error_msg = format!("Invalid streamed document: {}", problems.join("; "));
        tracing::error!("{}", error_msg);
        return Err(error_msg);
    }

    Ok(())
}
