//! # pocket-storage
//!
//! 로컬 저장소 어댑터와 캡처 저장소 컴포넌트.
//!
//! ## 모듈
//! - `sqlite`: 키-값 영역(`SqliteKvStore`)과 객체 저장소(`SqliteObjectStore`) 어댑터
//! - `memory`: 인메모리 키-값 어댑터
//! - `migration`: 스키마 마이그레이션
//! - `record_store`: 캡처 레코드 CRUD (단일 작성자 + 버전 토큰)
//! - `blob_store`: 이미지 블롭 저장소 (초기화 1회, 대기 공유)
//! - `log_sink`: 행동 로그 큐와 보존 개수 제한 저장
//! - `csv_export`: 행동 로그 CSV 직렬화
//! - `reconcile`: 참조되지 않는 블롭 회수
//! - `retry`: 일시적 실패 재시도 (exponential backoff)

pub mod blob_store;
pub mod csv_export;
pub mod log_sink;
pub mod memory;
pub mod migration;
pub mod reconcile;
pub mod record_store;
pub mod retry;
pub mod sqlite;
