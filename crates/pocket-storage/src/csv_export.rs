//! 행동 로그 CSV 직렬화.
//!
//! 모든 필드는 쌍따옴표로 감싸고 내부 쌍따옴표는 두 번 쓴다.
//! `data.url`은 URL 열로 분리하고 나머지 `data`는 JSON으로 Details 열에 넣는다.

use pocket_core::models::log_entry::LogEntry;
use serde_json::Value;

/// CSV 헤더
pub const CSV_HEADERS: [&str; 6] = ["Local Time", "Timestamp", "Category", "Action", "URL", "Details"];

/// 로그 목록을 CSV 문자열로 변환 (timestamp 오름차순, 같은 값은 입력 순서 유지)
pub fn logs_to_csv(entries: &[LogEntry]) -> String {
    let mut sorted: Vec<&LogEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);

    let mut lines = Vec::with_capacity(sorted.len() + 1);
    lines.push(CSV_HEADERS.join(","));

    for entry in sorted {
        let mut details = entry.data.clone();
        let url = match details.remove("url") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let details = Value::Object(details).to_string();
        let timestamp = entry.timestamp.to_string();

        let row = [
            entry.local_time.as_str(),
            timestamp.as_str(),
            entry.category.as_str(),
            entry.action.as_str(),
            url.as_str(),
            details.as_str(),
        ]
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",");
        lines.push(row);
    }

    lines.join("\n")
}

/// 필드를 쌍따옴표로 감싸고 내부 쌍따옴표를 이스케이프
pub fn escape_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use pocket_core::models::log_entry::LogCategory;
    use serde_json::{json, Map};

    fn entry(secs: u32, data: Value) -> LogEntry {
        let now = Local.with_ymd_and_hms(2025, 1, 1, 18, 11, secs).unwrap();
        let data: Map<String, Value> = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        LogEntry::at(now, LogCategory::Ui, "click", data)
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(escape_field(r#"He said "hi""#), r#""He said ""hi""""#);
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field(""), "\"\"");
    }

    #[test]
    fn url_is_split_from_details() {
        let csv = logs_to_csv(&[
            entry(1, json!({"url": "http://a"})),
            entry(2, json!({"note": "a \"quote\""})),
        ]);
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Local Time,Timestamp,Category,Action,URL,Details");

        assert!(lines[1].starts_with("\"2025-01-01 18:11:01\","));
        assert!(lines[1].ends_with(r#""http://a","{}""#));

        // JSON 안의 \" 도 같은 규칙으로 쌍따옴표만 두 번 쓴다
        assert!(lines[2].ends_with(r#""","{""note"":""a \""quote\""""}""#));
    }

    #[test]
    fn rows_sorted_by_timestamp() {
        let csv = logs_to_csv(&[
            entry(30, json!({"n": 3})),
            entry(10, json!({"n": 1})),
            entry(20, json!({"n": 2})),
        ]);
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert!(rows[0].contains("18:11:10"));
        assert!(rows[1].contains("18:11:20"));
        assert!(rows[2].contains("18:11:30"));
    }

    #[test]
    fn non_string_url_is_json_encoded() {
        let csv = logs_to_csv(&[entry(1, json!({"url": 42, "x": true}))]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.ends_with(r#""42","{""x"":true}""#));
    }

    #[test]
    fn category_and_timestamp_columns() {
        let e = entry(5, json!({}));
        let csv = logs_to_csv(std::slice::from_ref(&e));
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains(&format!("\"{}\",\"UI\",\"click\"", e.timestamp)));
    }

    #[test]
    fn empty_log_is_header_only() {
        assert_eq!(logs_to_csv(&[]), "Local Time,Timestamp,Category,Action,URL,Details");
    }
}
