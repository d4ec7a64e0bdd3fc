//! Tolerant decoding of the KOSIS vacancy feed.
//!
//! The row list may be a bare array or nested under one of several keys,
//! and each field has a known set of fallback names. Anything that does not
//! yield a region and a numeric vacancy is dropped.

use super::LookupError;
use crate::models::RegionVacancyRow;
use serde_json::Value;
use tracing::{debug, warn};

const LIST_KEYS: [&str; 5] = ["list", "LIST", "StatData", "statData", "data"];

const REGION_KEYS: [&str; 2] = ["C1_NM", "OBJ_NM"];
const VACANCY_KEYS: [&str; 1] = ["DT"];
const PERIOD_KEYS: [&str; 2] = ["PRD_DE", "NM"];
const GROUP_KEYS: [&str; 2] = ["ITM_NM", "TBL_NM"];
const DEFAULT_GROUP: &str = "상권별";

// ── Field helpers ─────────────────────────────────────────────────────────────

/// Parse a number that may arrive as JSON number or as text like "1,234.5%".
pub fn parse_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.trim().replace([',', '%'], "");
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

/// First non-empty value among `keys`, trimmed. Numbers are stringified.
fn text_field(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        let s = match row.get(*k)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if s.is_empty() { None } else { Some(s) }
    })
}

fn number_field(row: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| row.get(*k).and_then(parse_number))
}

// ── Shapes ────────────────────────────────────────────────────────────────────

/// Locate the row list inside whatever container the feed returned.
pub fn row_list(raw: &Value) -> &[Value] {
    match raw {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => LIST_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

pub fn decode_row(row: &Value) -> Option<RegionVacancyRow> {
    let region = text_field(row, &REGION_KEYS)?;
    let vacancy = number_field(row, &VACANCY_KEYS)?;
    Some(RegionVacancyRow {
        region,
        vacancy,
        period: text_field(row, &PERIOD_KEYS).unwrap_or_default(),
        group: text_field(row, &GROUP_KEYS).unwrap_or_else(|| DEFAULT_GROUP.to_string()),
    })
}

/// KOSIS reports failures as `{"err": "..", "errMsg": ".."}` with HTTP 200.
fn api_error(raw: &Value) -> Option<LookupError> {
    let obj = raw.as_object()?;
    if LIST_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return None;
    }
    let code = obj.get("err").or_else(|| obj.get("ERR"))?;
    let message = obj
        .get("errMsg")
        .or_else(|| obj.get("ERR_MSG"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(LookupError::Api {
        code: match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
        message: message.to_string(),
    })
}

pub fn normalize_rows(raw: &Value) -> Result<Vec<RegionVacancyRow>, LookupError> {
    if let Some(err) = api_error(raw) {
        return Err(err);
    }

    let list = row_list(raw);
    let rows: Vec<RegionVacancyRow> = list.iter().filter_map(decode_row).collect();

    if rows.len() < list.len() {
        debug!("Dropped {} undecodable feed rows", list.len() - rows.len());
    }
    if rows.is_empty() {
        warn!("Feed responded but contained no usable rows");
    }
    Ok(rows)
}

pub fn normalize_body(body: &str) -> Result<Vec<RegionVacancyRow>, LookupError> {
    let raw: Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))?;
    normalize_rows(&raw)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> Value {
        json!({"C1_NM": "강남대로", "DT": "8.5", "PRD_DE": "2025Q2", "ITM_NM": "공실률"})
    }

    #[test]
    fn accepts_every_container_shape() {
        let shapes = [
            json!([sample_row()]),
            json!({"list": [sample_row()]}),
            json!({"LIST": [sample_row()]}),
            json!({"StatData": [sample_row()]}),
            json!({"statData": [sample_row()]}),
            json!({"data": [sample_row()]}),
        ];
        for shape in shapes {
            let rows = normalize_rows(&shape).unwrap();
            assert_eq!(rows.len(), 1, "shape {}", shape);
            assert_eq!(rows[0].region, "강남대로");
        }

        assert!(normalize_rows(&json!({"other": []})).unwrap().is_empty());
        assert!(normalize_rows(&json!("text")).unwrap().is_empty());
    }

    #[test]
    fn field_fallbacks() {
        let row = json!({"C1_NM": "  ", "OBJ_NM": "서초구", "DT": 7, "NM": "2024-09", "TBL_NM": "표"});
        let decoded = decode_row(&row).unwrap();
        assert_eq!(decoded.region, "서초구");
        assert_eq!(decoded.vacancy, 7.0);
        assert_eq!(decoded.period, "2024-09");
        assert_eq!(decoded.group, "표");

        let bare = json!({"C1_NM": "종로", "DT": "1,2.5%"});
        let decoded = decode_row(&bare).unwrap();
        assert_eq!(decoded.vacancy, 12.5);
        assert_eq!(decoded.period, "");
        assert_eq!(decoded.group, "상권별");
    }

    #[test]
    fn rows_without_region_or_value_are_dropped() {
        let raw = json!([
            {"DT": "3.0"},
            {"C1_NM": "명동", "DT": "-"},
            {"C1_NM": "명동", "DT": ""},
            {"C1_NM": "명동", "DT": "4.4"},
        ]);
        let rows = normalize_rows(&raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vacancy, 4.4);
    }

    #[test]
    fn api_error_object_is_surfaced() {
        let raw = json!({"err": "20", "errMsg": "필수요청변수값이 누락되었습니다."});
        match normalize_rows(&raw) {
            Err(LookupError::Api { code, message }) => {
                assert_eq!(code, "20");
                assert!(message.contains("누락"));
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(normalize_body("<html>"), Err(LookupError::Decode(_))));
        assert_eq!(normalize_body("\u{feff}[]").unwrap().len(), 0);
    }
}
