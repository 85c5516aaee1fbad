//! Argument scoring: evidence-derived confidence and impact-area tagging.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::state::Evidence;
use crate::agents::Payload;

/// Confidence of an argument with no evidence attached
pub const BASE_CONFIDENCE: f64 = 0.3;

/// Impact areas recognised in argument content, with their keyword patterns
static IMPACT_AREAS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("strategy", r"(?i)\b(strateg\w*|positioning|differentiat\w*|objective\w*|goal\w*)\b"),
        ("audience", r"(?i)\b(audience\w*|customer\w*|persona\w*|segment\w*|demographic\w*|buyer\w*)\b"),
        ("brand", r"(?i)\b(brand\w*|tone|voice|messaging|identity|reputation)\b"),
        ("budget", r"(?i)\b(budget\w*|cost\w*|spend\w*|roi|pricing|price\w*|revenue)\b"),
        ("channel", r"(?i)\b(channel\w*|social|email|seo|sem|paid|organic|platform\w*|distribution)\b"),
        ("content", r"(?i)\b(content|copy|blog\w*|video\w*|article\w*|post\w*|headline\w*|creative\w*)\b"),
        ("timeline", r"(?i)\b(timeline\w*|deadline\w*|schedul\w*|launch\w*|quarter\w*|q[1-4]|week\w*|month\w*)\b"),
        ("competition", r"(?i)\b(competit\w*|rival\w*|market share|incumbent\w*)\b"),
        ("compliance", r"(?i)\b(complian\w*|legal|regulat\w*|gdpr|privacy|disclosure\w*)\b"),
    ]
    .into_iter()
    .map(|(area, pattern)| {
        (
            area,
            Regex::new(pattern).expect("impact area regex should compile"),
        )
    })
    .collect()
});

/// Names of every recognised impact area, in tagging order
pub fn impact_area_names() -> Vec<&'static str> {
    IMPACT_AREAS.iter().map(|(area, _)| *area).collect()
}

/// How specific a piece of evidence is, in `[0.4, 1.0]`.
///
/// A named source adds 0.2; structured content adds up to 0.4.
pub fn evidence_specificity(evidence: &Evidence) -> f64 {
    let sourced = if evidence.source.trim().is_empty() {
        0.0
    } else {
        0.2
    };
    let structure = structure_size(&evidence.content).min(4) as f64 / 4.0;
    0.4 + sourced + 0.4 * structure
}

fn structure_size(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::String(s) if s.trim().is_empty() => 0,
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

/// Confidence of an argument given its evidence.
///
/// `1 − 0.7 · Π(1 − 0.5 · wᵢ)` with `wᵢ = specificityᵢ · confidenceᵢ`:
/// 0.3 without evidence, non-decreasing in every added item, below 1.
pub fn argument_confidence(evidence: &[Evidence]) -> f64 {
    let doubt: f64 = evidence
        .iter()
        .map(|e| 1.0 - 0.5 * evidence_specificity(e) * e.confidence.clamp(0.0, 1.0))
        .product();
    (1.0 - (1.0 - BASE_CONFIDENCE) * doubt).clamp(0.0, 1.0)
}

/// Impact areas mentioned anywhere in the textual content.
pub fn tag_impact_areas(content: &Payload) -> Vec<String> {
    let mut text = String::new();
    for (key, value) in content {
        text.push_str(key);
        text.push(' ');
        collect_text(value, &mut text);
    }

    IMPACT_AREAS
        .iter()
        .filter(|(_, re)| re.is_match(&text))
        .map(|(area, _)| area.to_string())
        .collect()
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        Value::Array(items) => items.iter().for_each(|v| collect_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_text(v, out)),
        _ => {}
    }
}
