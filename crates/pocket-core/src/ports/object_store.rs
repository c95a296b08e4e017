//! 로컬 객체 저장소 포트.
//!
//! 스크린샷 같은 큰 바이너리를 ID로 보관한다.
//! 구현: `pocket-storage` crate (rusqlite)

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;

/// 저장된 객체 요약 (본문 제외)
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub id: String,
    /// 본문 크기 (bytes)
    pub size: u64,
    /// 저장 시각 (알 수 없으면 None)
    pub created_at: Option<DateTime<Utc>>,
}

/// 열린 객체 저장소 핸들
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 삽입 전용 쓰기: 같은 ID가 있으면 `CoreError::IdCollision`
    async fn add(&self, id: &str, data: &[u8]) -> Result<(), CoreError>;

    /// 조회 (없으면 None, 에러 아님)
    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CoreError>;

    /// 삭제 (없는 ID도 성공)
    async fn delete(&self, id: &str) -> Result<(), CoreError>;

    /// 저장된 모든 객체 요약
    async fn list(&self) -> Result<Vec<ObjectInfo>, CoreError>;

    /// 전체 삭제
    async fn clear(&self) -> Result<(), CoreError>;

    /// 핸들 닫기: 이후 호출은 실패한다
    async fn close(&self) -> Result<(), CoreError>;
}

/// 객체 저장소 열기 (Blob Store 생성자에 주입)
#[async_trait]
pub trait ObjectStoreOpener: Send + Sync {
    /// 실패 시 `CoreError::Initialization`
    async fn open(&self) -> Result<Arc<dyn ObjectStore>, CoreError>;
}
