//! 애플리케이션 설정 구조체.
//!
//! 저장소 경로, 레코드 크기 한도, 재시도 정책, 로그 보존 개수 등
//! 런타임 설정을 정의한다. JSON 파일에서 로드하며 모든 필드는 기본값을 가진다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 레코드/메타데이터 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 이미지 블롭 저장소 설정
    #[serde(default)]
    pub blob: BlobConfig,
    /// 행동 로그 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 기본 설정
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig::default(),
            blob: BlobConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

/// 레코드/메타데이터 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 데이터 디렉토리 (None이면 플랫폼 기본 경로)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// 메타데이터 DB 파일 이름
    #[serde(default = "default_metadata_file_name")]
    pub metadata_file_name: String,
    /// 레코드 1개의 최대 직렬화 크기 (bytes)
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
    /// 동기화 영역 전체 쿼터 (bytes, None = 무제한)
    #[serde(default = "default_sync_quota_bytes")]
    pub sync_quota_bytes: Option<u64>,
    /// 일시적 쓰기 실패 시 재시도 횟수
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
    /// 재시도 초기 대기 (밀리초, 매 회 2배)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 재시도 최대 대기 (밀리초)
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// 호출자 측 작업 타임아웃 (밀리초)
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl StorageConfig {
    /// 재시도 초기 대기
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// 재시도 최대 대기
    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// 작업 타임아웃
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            metadata_file_name: default_metadata_file_name(),
            max_record_bytes: default_max_record_bytes(),
            sync_quota_bytes: default_sync_quota_bytes(),
            write_retries: default_write_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

/// 이미지 블롭 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// 블롭 DB 파일 이름 (데이터 디렉토리 기준)
    #[serde(default = "default_blob_file_name")]
    pub file_name: String,
    /// ID 충돌 시 재발급 최대 횟수
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: u32,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            file_name: default_blob_file_name(),
            max_id_attempts: default_max_id_attempts(),
        }
    }
}

/// 행동 로그 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 보존할 최대 로그 수 (초과 시 가장 오래된 것부터 제거)
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_logs: default_max_logs(),
        }
    }
}

fn default_metadata_file_name() -> String {
    "pocket.db".to_string()
}

fn default_max_record_bytes() -> usize {
    10_240
}

fn default_sync_quota_bytes() -> Option<u64> {
    Some(102_400)
}

fn default_write_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    50
}

fn default_retry_max_delay_ms() -> u64 {
    1_000
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_blob_file_name() -> String {
    "blobs.db".to_string()
}

fn default_max_id_attempts() -> u32 {
    5
}

fn default_max_logs() -> usize {
    1_000
}
