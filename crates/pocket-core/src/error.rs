//! MagicPocket 핵심 에러 타입.
//!
//! 모든 저장소 경계의 실패는 `CoreError`로 호출자에게 반환된다.
//! 블롭 미발견은 에러가 아니라 `Ok(None)`으로 표현한다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 백엔드 데이터베이스 열기 실패 (재시도 전까지 해당 인스턴스에 치명적)
    #[error("초기화 실패: {0}")]
    Initialization(String),

    /// 단일 레코드 직렬화 크기가 한도를 초과함 (쓰기 없음)
    #[error("레코드 크기 초과: {size}bytes > {limit}bytes")]
    QuotaExceeded {
        /// 직렬화된 레코드 크기 (bytes)
        size: usize,
        /// 허용 한도 (bytes)
        limit: usize,
    },

    /// 저장소 쓰기 실패 (영역 전체 쿼터 초과, I/O 실패 등)
    #[error("저장소 쓰기 실패: {0}")]
    StorageWrite(String),

    /// 저장소 읽기 실패
    #[error("저장소 읽기 실패: {0}")]
    StorageRead(String),

    /// 호출자 타임아웃: 하위 작업은 독립적으로 완료/실패한다
    #[error("저장소 응답 없음: {timeout_ms}ms 초과")]
    StorageUnavailable {
        /// 초과된 타임아웃 (밀리초)
        timeout_ms: u64,
    },

    /// 낙관적 버전 토큰 불일치 (다른 작성자가 먼저 씀)
    #[error("버전 충돌: {key}")]
    VersionConflict {
        /// 충돌한 키
        key: String,
    },

    /// 이미 존재하는 식별자로 삽입 시도
    #[error("식별자 충돌: {id}")]
    IdCollision {
        /// 충돌한 식별자
        id: String,
    },

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 재시도로 회복 가능한 일시적 실패인지 여부
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::StorageWrite(_)
                | CoreError::StorageUnavailable { .. }
                | CoreError::VersionConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CoreError::StorageWrite("disk".into()).is_transient());
        assert!(CoreError::VersionConflict { key: "records".into() }.is_transient());
        assert!(CoreError::StorageUnavailable { timeout_ms: 10 }.is_transient());
        assert!(!CoreError::QuotaExceeded {
            size: 20_000,
            limit: 10_240
        }
        .is_transient());
        assert!(!CoreError::Initialization("locked".into()).is_transient());
    }

    #[test]
    fn quota_message_mentions_sizes() {
        let err = CoreError::QuotaExceeded {
            size: 20_000,
            limit: 10_240,
        };
        let msg = err.to_string();
        assert!(msg.contains("20000"));
        assert!(msg.contains("10240"));
    }
}
