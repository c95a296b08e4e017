//! 행동 로그 항목 모델.
//!
//! UI 상호작용, 페이지 방문, 네트워크 요청, 시스템 이벤트를 기록한다.
//! 진단용 `tracing` 로그와는 별개의 도메인 데이터다.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 로그 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogCategory {
    /// UI 상호작용
    Ui,
    /// 페이지 방문
    Navigation,
    /// 네트워크 요청
    Network,
    /// 시스템
    System,
}

impl LogCategory {
    /// CSV 등에 쓰이는 표기
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Ui => "UI",
            LogCategory::Navigation => "NAVIGATION",
            LogCategory::Network => "NETWORK",
            LogCategory::System => "SYSTEM",
        }
    }
}

/// 로컬 시각 표기 형식 (예: 2025-01-01 18:11:47)
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 행동 로그 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// 사람이 읽는 로컬 시각
    pub local_time: String,
    /// 유닉스 초 (내보내기 정렬 기준)
    pub timestamp: i64,
    pub category: LogCategory,
    /// 행동 식별자 (예: `context_menu_save_btn_clicked`)
    pub action: String,
    /// 부가 필드 (`url` 포함 가능)
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl LogEntry {
    /// 현재 시각으로 로그 항목 생성
    pub fn new(category: LogCategory, action: impl Into<String>, data: Map<String, Value>) -> Self {
        Self::at(Local::now(), category, action, data)
    }

    /// 지정 시각으로 로그 항목 생성
    pub fn at(
        now: DateTime<Local>,
        category: LogCategory,
        action: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            local_time: now.format(LOCAL_TIME_FORMAT).to_string(),
            timestamp: now.timestamp(),
            category,
            action: action.into(),
            data,
        }
    }

    /// `data.url` (문자열이 아니면 None)
    pub fn url(&self) -> Option<&str> {
        self.data.get("url").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn at_formats_local_time_and_seconds() {
        let now = Local.with_ymd_and_hms(2025, 1, 1, 18, 11, 47).unwrap();
        let entry = LogEntry::at(now, LogCategory::Ui, "click", Map::new());
        assert_eq!(entry.local_time, "2025-01-01 18:11:47");
        assert_eq!(entry.timestamp, now.timestamp());
    }

    #[test]
    fn url_accessor() {
        let mut data = Map::new();
        data.insert("url".into(), json!("http://a"));
        let entry = LogEntry::new(LogCategory::Navigation, "visit", data);
        assert_eq!(entry.url(), Some("http://a"));

        let mut data = Map::new();
        data.insert("url".into(), json!(42));
        let entry = LogEntry::new(LogCategory::Navigation, "visit", data);
        assert_eq!(entry.url(), None);
    }

    #[test]
    fn category_as_str_matches_serde() {
        for category in [
            LogCategory::Ui,
            LogCategory::Navigation,
            LogCategory::Network,
            LogCategory::System,
        ] {
            let value = serde_json::to_value(category).unwrap();
            assert_eq!(value, json!(category.as_str()));
        }
    }
}
