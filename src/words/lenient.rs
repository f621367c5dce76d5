//! Forgiving field decoders for model replies and older corpus files.
//! Each one accepts any JSON value and falls back to the field's default
//! instead of failing the whole record.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{Level, DEFAULT_TREND};

pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

pub fn level<'de, D: Deserializer<'de>>(d: D) -> Result<Level, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Level::parse(&s).unwrap_or_default(),
        _ => Level::default(),
    })
}

/// 1..=10. Numbers are rounded and clamped; strings like "8" or "8/10" use
/// their leading integer.
pub fn trend<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let raw = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i64),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<i64>().ok()
        }
        _ => None,
    };
    Ok(raw.map(|n| n.clamp(1, 10) as u8).unwrap_or(DEFAULT_TREND))
}

/// At least 1. Accepts numbers (rounded) and numeric strings.
pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let raw = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().map(f64::round),
        Value::String(s) => s.trim().parse::<f64>().ok().map(f64::round),
        _ => None,
    };
    Ok(raw
        .filter(|n| n.is_finite())
        .map(|n| n.clamp(1.0, u32::MAX as f64) as u32)
        .unwrap_or(1))
}

/// Numbers and numeric strings; anything else is 0.0.
pub fn score<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let raw = match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw.filter(|n| n.is_finite()).unwrap_or(0.0))
}

pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}

pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    })
}

pub fn string_set<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
    string_list(d).map(|v| v.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Fields {
        #[serde(default = "super::super::default_trend", deserialize_with = "super::trend")]
        trend: u8,
        #[serde(default, deserialize_with = "super::flag")]
        flag: bool,
        #[serde(default, deserialize_with = "super::string_list")]
        list: Vec<String>,
        #[serde(default = "super::super::default_count", deserialize_with = "super::count")]
        count: u32,
        #[serde(default, deserialize_with = "super::score")]
        score: f64,
    }

    fn fields(json: &str) -> Fields {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn trend_clamps_and_reads_strings() {
        assert_eq!(fields(r#"{"trend": 42}"#).trend, 10);
        assert_eq!(fields(r#"{"trend": 0}"#).trend, 1);
        assert_eq!(fields(r#"{"trend": "7/10"}"#).trend, 7);
        assert_eq!(fields(r#"{"trend": 6.6}"#).trend, 7);
        assert_eq!(fields(r#"{"trend": "n/a"}"#).trend, 5);
    }

    #[test]
    fn flag_and_list_shapes() {
        let f = fields(r#"{"flag": "True", "list": "fintech, , health"}"#);
        assert!(f.flag);
        assert_eq!(f.list, vec!["fintech", "health"]);

        let f = fields(r#"{"flag": null, "list": ["a", 3, ""]}"#);
        assert!(!f.flag);
        assert_eq!(f.list, vec!["a"]);
    }

    #[test]
    fn counts_are_at_least_one() {
        assert_eq!(fields(r#"{"count": "3"}"#).count, 3);
        assert_eq!(fields(r#"{"count": 2.6}"#).count, 3);
        assert_eq!(fields(r#"{"count": 0}"#).count, 1);
        assert_eq!(fields(r#"{"count": -4}"#).count, 1);
        assert_eq!(fields(r#"{"count": "many"}"#).count, 1);
        assert_eq!(fields(r#"{"count": null}"#).count, 1);
        assert_eq!(fields("{}").count, 1);
    }

    #[test]
    fn scores_read_numeric_strings() {
        assert_eq!(fields(r#"{"score": "97.5"}"#).score, 97.5);
        assert_eq!(fields(r#"{"score": 12}"#).score, 12.0);
        assert_eq!(fields(r#"{"score": "high"}"#).score, 0.0);
        assert_eq!(fields(r#"{"score": [1]}"#).score, 0.0);
    }
}
