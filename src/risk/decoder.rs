//! Tolerant decoding of heuristic replies.
//!
//! The scoring service answers in free text that is expected to embed a
//! JSON object. Anything that cannot be read degrades to a conservative
//! fallback verdict instead of an error.

use crate::error::{Result, ScanError};
use crate::types::Recommendation;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

pub const FALLBACK_BASE_SCORE: u8 = 50;
pub const FALLBACK_RED_FLAG: &str = "Unable to parse detailed analysis";

/// Verdict read from the heuristic service, before rule deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicVerdict {
    /// Clamped into 0..=100
    pub base_score: u8,
    pub analysis: String,
    pub red_flags: Vec<String>,
    pub recommendation: Option<Recommendation>,
}

impl HeuristicVerdict {
    pub fn fallback(raw: &str) -> Self {
        Self {
            base_score: FALLBACK_BASE_SCORE,
            analysis: raw.to_string(),
            red_flags: vec![FALLBACK_RED_FLAG.to_string()],
            recommendation: Some(Recommendation::Caution),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    risk_score: Option<Value>,
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    red_flags: Vec<Value>,
    #[serde(default)]
    recommendation: Option<String>,
}

/// Decode the first usable verdict object embedded in `raw`.
pub fn decode_verdict(raw: &str) -> Result<HeuristicVerdict> {
    let object = extract_object(raw)
        .ok_or_else(|| ScanError::ParseFailure("no JSON object in heuristic reply".to_string()))?;
    let verdict: RawVerdict = serde_json::from_value(Value::Object(object))?;

    let base_score = match verdict.risk_score {
        None | Some(Value::Null) => FALLBACK_BASE_SCORE,
        Some(value) => score_of(&value).ok_or_else(|| {
            ScanError::ParseFailure(format!("riskScore is not numeric: {}", value))
        })?,
    };

    Ok(HeuristicVerdict {
        base_score,
        analysis: verdict.analysis.unwrap_or_default(),
        red_flags: verdict
            .red_flags
            .into_iter()
            .filter_map(|flag| match flag {
                Value::String(text) if !text.trim().is_empty() => Some(text),
                _ => None,
            })
            .collect(),
        recommendation: verdict.recommendation.as_deref().and_then(Recommendation::parse_label),
    })
}

/// [`decode_verdict`], degrading to [`HeuristicVerdict::fallback`].
pub fn decode_or_fallback(raw: &str) -> HeuristicVerdict {
    decode_verdict(raw).unwrap_or_else(|err| {
        warn!("Falling back to default verdict: {}", err);
        HeuristicVerdict::fallback(raw)
    })
}

/// Greedy slice from the first `{` to the last `}` first, then each
/// balanced object in turn.
fn extract_object(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&raw[start..=end]) {
            return Some(map);
        }
    }

    raw.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(offset, _)| {
            serde_json::Deserializer::from_str(&raw[offset..])
                .into_iter::<Value>()
                .next()
                .and_then(|parsed| parsed.ok())
        })
        .find_map(|value| match value {
            Value::Object(map) if map.contains_key("riskScore") => Some(map),
            _ => None,
        })
}

fn score_of(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score.is_finite().then(|| score.round().clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_reply() {
        let verdict = decode_verdict(concat!(
            r#"{"riskScore": 62, "analysis": "odd split", "#,
            r#""redFlags": ["a", "b"], "recommendation": "CAUTION"}"#,
        ))
        .unwrap();

        assert_eq!(verdict.base_score, 62);
        assert_eq!(verdict.analysis, "odd split");
        assert_eq!(verdict.red_flags, vec!["a", "b"]);
        assert_eq!(verdict.recommendation, Some(Recommendation::Caution));
    }

    #[test]
    fn test_json_wrapped_in_prose() {
        let raw = "Here is my assessment:\n```json\n\
                   {\"riskScore\": \"40\", \"analysis\": \"ok\"}\n```\nThanks.";

        let verdict = decode_verdict(raw).unwrap();
        assert_eq!(verdict.base_score, 40);
        assert!(verdict.red_flags.is_empty());
        assert_eq!(verdict.recommendation, None);
    }

    #[test]
    fn test_balanced_scan_when_greedy_slice_fails() {
        let raw = r#"Note {not json} then {"riskScore": 15, "analysis": "fine"} and {trailing"#;

        let verdict = decode_verdict(raw).unwrap();
        assert_eq!(verdict.base_score, 15);
        assert_eq!(verdict.analysis, "fine");
    }

    #[test]
    fn test_scores_are_clamped() {
        assert_eq!(decode_verdict(r#"{"riskScore": 180}"#).unwrap().base_score, 100);
        assert_eq!(decode_verdict(r#"{"riskScore": -20}"#).unwrap().base_score, 0);
        assert_eq!(decode_verdict(r#"{"riskScore": 33.6}"#).unwrap().base_score, 34);
    }

    #[test]
    fn test_missing_score_defaults_to_fifty() {
        assert_eq!(decode_verdict(r#"{"analysis": "x"}"#).unwrap().base_score, FALLBACK_BASE_SCORE);
    }

    #[test]
    fn test_unreadable_reply_falls_back() {
        let raw = "I cannot provide a score for this token.";

        assert!(decode_verdict(raw).is_err());
        let verdict = decode_or_fallback(raw);
        assert_eq!(verdict.base_score, 50);
        assert_eq!(verdict.analysis, raw);
        assert_eq!(verdict.red_flags, vec![FALLBACK_RED_FLAG]);
        assert_eq!(verdict.recommendation, Some(Recommendation::Caution));
    }

    #[test]
    fn test_non_numeric_score_falls_back() {
        let verdict = decode_or_fallback(r#"{"riskScore": "high"}"#);
        assert_eq!(verdict.red_flags, vec![FALLBACK_RED_FLAG]);
    }
}
