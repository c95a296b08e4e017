//! 메시지 채널 계약.
//!
//! DOM 캡처 레이어가 보내는 요청(`action` 태그)과
//! `status` 필드를 가진 응답을 정의한다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::log_entry::LogCategory;
use crate::models::record::RecordInput;

/// 요청 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// 레코드 저장
    SaveData { data: RecordInput },
    /// 저장된 레코드 전체 조회 (시각화 계층이 소비)
    RequestCurrentData,
    /// 위치로 레코드 삭제 (`cascade`면 참조 블롭도 삭제)
    DeleteRecord {
        index: usize,
        #[serde(default)]
        cascade: bool,
    },
    /// 레코드 전체 삭제
    ClearRecords,
    /// 이미지 저장 (base64)
    SaveImage { data: String },
    /// 이미지 조회
    GetImage { id: String },
    /// 이미지 삭제
    DeleteImage { id: String },
    /// 의도 트리 저장 (불투명 JSON 문서)
    SaveIntentTree {
        #[serde(rename = "intentTree")]
        intent_tree: Value,
    },
    /// 의도 트리 조회
    GetIntentTree,
    /// 행동 로그 기록
    Log {
        category: LogCategory,
        #[serde(rename = "logAction")]
        log_action: String,
        #[serde(default)]
        data: Map<String, Value>,
    },
    /// 행동 로그 전체 조회
    GetLogs,
    /// 행동 로그 CSV 내보내기
    ExportLogs,
    /// 행동 로그 삭제
    ClearLogs,
    /// 참조되지 않는 블롭 회수
    SweepOrphans,
}

/// 응답 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    /// 성공: 추가 필드는 평탄화된다
    Success {
        #[serde(flatten)]
        body: Map<String, Value>,
    },
    /// 실패: 사용자에게 표시할 메시지
    Error { message: String },
}

impl Response {
    /// 본문 없는 성공
    pub fn success() -> Self {
        Response::Success { body: Map::new() }
    }

    /// 필드 하나를 가진 성공
    pub fn success_with(key: &str, value: Value) -> Self {
        let mut body = Map::new();
        body.insert(key.to_string(), value);
        Response::Success { body }
    }

    /// 여러 필드를 가진 성공 (객체가 아니면 `result` 필드에 담는다)
    pub fn success_body(value: Value) -> Self {
        match value {
            Value::Object(body) => Response::Success { body },
            other => Self::success_with("result", other),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}
