//! 캡처 레코드 모델.
//!
//! 텍스트 클립과 스크린샷 참조를 하나의 태그드 enum으로 표현한다.
//! 저장 형식(`type` + `content` 문자열)은 [`RecordWire`]를 거쳐
//! 역직렬화 시점에 검증된다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// 레코드 종류 (저장 형식의 `type` 필드)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// 선택한 텍스트
    Text,
    /// 스크린샷 (블롭 참조)
    Image,
}

/// 스크린샷 위의 주석 도형 (선택 영역 기준 상대 좌표)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    /// 도형 종류, 색상 등 나머지 속성
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 스크린샷 선택 영역 크기
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

/// 레코드 본문
#[derive(Debug, Clone, PartialEq)]
pub enum RecordContent {
    /// 텍스트 클립
    Text { text: String },
    /// 스크린샷: Blob Store에 먼저 저장된 블롭 ID를 참조
    Image {
        blob_id: String,
        annotations: Vec<Annotation>,
        bounds: Option<Bounds>,
    },
}

impl RecordContent {
    /// 레코드 종류
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordContent::Text { .. } => RecordKind::Text,
            RecordContent::Image { .. } => RecordKind::Image,
        }
    }

    /// 이미지 레코드가 참조하는 블롭 ID
    pub fn blob_id(&self) -> Option<&str> {
        match self {
            RecordContent::Image { blob_id, .. } => Some(blob_id),
            RecordContent::Text { .. } => None,
        }
    }

    fn from_wire(
        kind: RecordKind,
        content: String,
        annotations: Vec<Annotation>,
        bounds: Option<Bounds>,
    ) -> Result<Self, CoreError> {
        match kind {
            RecordKind::Text => {
                if !annotations.is_empty() || bounds.is_some() {
                    return Err(CoreError::Validation {
                        field: "annotations".to_string(),
                        message: "텍스트 레코드는 주석/영역을 가질 수 없음".to_string(),
                    });
                }
                Ok(RecordContent::Text { text: content })
            }
            RecordKind::Image => {
                if content.trim().is_empty() {
                    return Err(CoreError::Validation {
                        field: "content".to_string(),
                        message: "이미지 레코드에는 블롭 ID가 필요함".to_string(),
                    });
                }
                Ok(RecordContent::Image {
                    blob_id: content,
                    annotations,
                    bounds,
                })
            }
        }
    }

    fn into_wire(self) -> (RecordKind, String, Vec<Annotation>, Option<Bounds>) {
        match self {
            RecordContent::Text { text } => (RecordKind::Text, text, Vec::new(), None),
            RecordContent::Image {
                blob_id,
                annotations,
                bounds,
            } => (RecordKind::Image, blob_id, annotations, bounds),
        }
    }
}

/// 저장된 캡처 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordWire", into = "RecordWire")]
pub struct Record {
    /// 생성 시 부여되는 고유 ID (불변)
    pub id: String,
    /// 본문 (텍스트 또는 블롭 참조)
    pub content: RecordContent,
    /// 사용자 코멘트
    pub comment: Option<String>,
    /// 선택 영역을 둘러싼 문단
    pub paragraph: Option<String>,
    /// 캡처한 페이지 URL
    pub url: String,
    /// 생성 시각 (ISO-8601)
    pub timestamp: String,
    /// 지도 등에서 얻은 부가 위치 정보
    pub extra_location_context: Option<Map<String, Value>>,
}

impl Record {
    /// 입력과 ID로 레코드 생성
    pub fn from_input(id: String, input: RecordInput, timestamp: String) -> Self {
        Self {
            id,
            content: input.content,
            comment: input.comment,
            paragraph: input.paragraph,
            url: input.url,
            timestamp: input.timestamp.unwrap_or(timestamp),
            extra_location_context: input.extra_location_context,
        }
    }

    /// 직렬화된 JSON 크기 (bytes): 레코드 쿼터 판정 기준
    pub fn serialized_len(&self) -> Result<usize, CoreError> {
        Ok(serde_json::to_vec(self)?.len())
    }
}

/// 저장 요청 입력 (ID는 Record Store가 부여)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordInputWire", into = "RecordInputWire")]
pub struct RecordInput {
    pub content: RecordContent,
    pub comment: Option<String>,
    pub paragraph: Option<String>,
    pub url: String,
    /// 생산자가 기록한 캡처 시각 (없으면 저장 시각)
    pub timestamp: Option<String>,
    pub extra_location_context: Option<Map<String, Value>>,
}

impl RecordInput {
    /// 텍스트 클립 입력
    pub fn text(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content: RecordContent::Text { text: text.into() },
            comment: None,
            paragraph: None,
            url: url.into(),
            timestamp: None,
            extra_location_context: None,
        }
    }

    /// 스크린샷 입력: 블롭을 먼저 저장하고 받은 ID를 넘긴다
    pub fn image(blob_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content: RecordContent::Image {
                blob_id: blob_id.into(),
                annotations: Vec::new(),
                bounds: None,
            },
            comment: None,
            paragraph: None,
            url: url.into(),
            timestamp: None,
            extra_location_context: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_paragraph(mut self, paragraph: impl Into<String>) -> Self {
        self.paragraph = Some(paragraph.into());
        self
    }
}

/// 저장 형식 (레코드)
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    id: String,
    #[serde(rename = "type")]
    kind: RecordKind,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    paragraph: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra_location_context: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bounds: Option<Bounds>,
}

impl TryFrom<RecordWire> for Record {
    type Error = CoreError;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        let content =
            RecordContent::from_wire(wire.kind, wire.content, wire.annotations, wire.bounds)?;
        Ok(Self {
            id: wire.id,
            content,
            comment: wire.comment,
            paragraph: wire.paragraph,
            url: wire.url,
            timestamp: wire.timestamp,
            extra_location_context: wire.extra_location_context,
        })
    }
}

impl From<Record> for RecordWire {
    fn from(record: Record) -> Self {
        let (kind, content, annotations, bounds) = record.content.into_wire();
        Self {
            id: record.id,
            kind,
            content,
            comment: record.comment,
            paragraph: record.paragraph,
            url: record.url,
            timestamp: record.timestamp,
            extra_location_context: record.extra_location_context,
            annotations,
            bounds,
        }
    }
}

/// 저장 형식 (입력)
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInputWire {
    #[serde(rename = "type")]
    kind: RecordKind,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    paragraph: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra_location_context: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bounds: Option<Bounds>,
}

impl TryFrom<RecordInputWire> for RecordInput {
    type Error = CoreError;

    fn try_from(wire: RecordInputWire) -> Result<Self, Self::Error> {
        let content =
            RecordContent::from_wire(wire.kind, wire.content, wire.annotations, wire.bounds)?;
        Ok(Self {
            content,
            comment: wire.comment,
            paragraph: wire.paragraph,
            url: wire.url,
            timestamp: wire.timestamp,
            extra_location_context: wire.extra_location_context,
        })
    }
}

impl From<RecordInput> for RecordInputWire {
    fn from(input: RecordInput) -> Self {
        let (kind, content, annotations, bounds) = input.content.into_wire();
        Self {
            kind,
            content,
            comment: input.comment,
            paragraph: input.paragraph,
            url: input.url,
            timestamp: input.timestamp,
            extra_location_context: input.extra_location_context,
            annotations,
            bounds,
        }
    }
}
