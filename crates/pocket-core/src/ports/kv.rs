//! 키-값 저장소 포트.
//!
//! 값 전체 단위의 get/set만 제공하는 저장 영역을 추상화한다.
//! 원자적 append는 없으므로 호출자는 read-modify-write를 수행하며,
//! 버전 토큰(`compare_and_set`)으로 경쟁 쓰기를 감지한다.
//!
//! 구현: `pocket-storage` crate (rusqlite, 인메모리)

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;

/// 버전이 붙은 값
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub value: Value,
    /// 쓰기마다 증가하는 버전 토큰
    pub version: u64,
}

/// 키-값 저장 영역
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 값 조회 (없으면 None)
    async fn get(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.get_versioned(key).await?.map(|v| v.value))
    }

    /// 버전과 함께 값 조회
    async fn get_versioned(&self, key: &str) -> Result<Option<Versioned>, CoreError>;

    /// 무조건 덮어쓰기 (last-writer-wins)
    async fn set(&self, key: &str, value: &Value) -> Result<(), CoreError>;

    /// 조건부 쓰기
    ///
    /// 현재 버전이 `expected`(없는 키는 None)와 같을 때만 쓰고 새 버전을 반환한다.
    /// 다르면 `Ok(None)`: 호출자가 다시 읽고 재시도한다.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
    ) -> Result<Option<u64>, CoreError>;

    /// 키 삭제 (없어도 성공)
    ///
    /// 삭제된 키는 없는 키로 보이지만 버전은 초기화되지 않는다.
    /// 삭제 전에 읽은 버전으로 한 `compare_and_set`은 항상 실패해야 한다.
    async fn remove(&self, key: &str) -> Result<(), CoreError>;
}
