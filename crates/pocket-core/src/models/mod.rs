//! MagicPocket 도메인 모델.
//!
//! 캡처 레코드, 행동 로그 항목, 메시지 채널 계약을 정의한다.
//! 모든 모델은 `serde` Serialize/Deserialize를 구현하며
//! 저장 형식은 확장 프로그램이 쓰던 camelCase JSON을 유지한다.

pub mod log_entry;
pub mod message;
pub mod record;
