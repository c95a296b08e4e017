//! 저장소 와이어링.
//!
//! 설정으로부터 레코드 저장소, 블롭 저장소, 로그 싱크를 만들고
//! `Arc`로 묶어 라우터와 CLI 명령에 넘긴다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pocket_core::config::AppConfig;
use pocket_core::error::CoreError;
use pocket_core::ids::{IdGenerator, MonotonicIdGenerator};
use pocket_core::ports::kv::KeyValueStore;
use pocket_core::ports::object_store::ObjectStoreOpener;
use pocket_storage::blob_store::BlobStore;
use pocket_storage::log_sink::LogSink;
use pocket_storage::memory::MemoryKvStore;
use pocket_storage::record_store::RecordStore;
use pocket_storage::retry::RetryPolicy;
use pocket_storage::sqlite::{SqliteKvStore, SqliteObjectStoreOpener, AREA_LOCAL, AREA_SYNC};
use tracing::info;

/// 저장 위치
#[derive(Debug, Clone)]
pub enum StorageLocation {
    /// 데이터 디렉토리 아래 SQLite 파일
    Directory(PathBuf),
    /// 프로세스 메모리 (종료 시 사라짐)
    InMemory,
}

/// 앱 전체가 공유하는 저장소 묶음
pub struct Services {
    pub records: RecordStore,
    pub blobs: BlobStore,
    pub logs: LogSink,
    /// 로컬 영역 (의도 트리 등 불투명 문서)
    pub local: Arc<dyn KeyValueStore>,
    pub config: AppConfig,
}

impl Services {
    /// 설정과 저장 위치로 저장소 열기
    pub fn open(config: AppConfig, location: &StorageLocation) -> Result<Self, CoreError> {
        let storage = &config.storage;
        let (sync, local, opener) = match location {
            StorageLocation::Directory(dir) => {
                let db = dir.join(&storage.metadata_file_name);
                info!("저장소 경로: {}", dir.display());
                let sync: Arc<dyn KeyValueStore> =
                    Arc::new(SqliteKvStore::open(&db, AREA_SYNC, storage.sync_quota_bytes)?);
                let local: Arc<dyn KeyValueStore> =
                    Arc::new(SqliteKvStore::open(&db, AREA_LOCAL, None)?);
                let opener: Arc<dyn ObjectStoreOpener> =
                    Arc::new(SqliteObjectStoreOpener::new(dir.join(&config.blob.file_name)));
                (sync, local, opener)
            }
            StorageLocation::InMemory => {
                info!("인메모리 저장소 사용");
                let sync: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::open_in_memory(
                    AREA_SYNC,
                    storage.sync_quota_bytes,
                )?);
                let local: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
                let opener: Arc<dyn ObjectStoreOpener> =
                    Arc::new(SqliteObjectStoreOpener::in_memory());
                (sync, local, opener)
            }
        };

        // 레코드와 블롭이 같은 생성기를 써서 프로세스 안의 ID 충돌을 피한다
        let ids: Arc<dyn IdGenerator> = Arc::new(MonotonicIdGenerator::new());
        let retry = RetryPolicy::from_config(storage);

        Ok(Self {
            records: RecordStore::new(sync, ids.clone(), storage),
            blobs: BlobStore::new(opener, ids, &config.blob),
            logs: LogSink::new(local.clone(), config.logging.max_logs, retry),
            local,
            config,
        })
    }

    /// 종료 전 정리: 대기 중인 로그 저장, 블롭 핸들 닫기
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        self.logs.drain().await?;
        self.blobs.close().await?;
        info!("저장소 정리 완료");
        Ok(())
    }
}

/// 데이터 디렉토리 결정 (CLI 인자 > 설정 > 플랫폼 기본 경로)
///
/// # 플랫폼별 기본 경로:
/// - macOS: `~/Library/Application Support/com.magicpocket.pocket/`
/// - Windows: `%APPDATA%\magicpocket\pocket\data\`
/// - Linux: `~/.local/share/pocket/`
pub fn resolve_data_dir(cli: Option<&Path>, config: &AppConfig) -> PathBuf {
    cli.map(Path::to_path_buf)
        .or_else(|| config.storage.data_dir.clone())
        .or_else(|| {
            directories::ProjectDirs::from("com", "magicpocket", "pocket")
                .map(|p| p.data_dir().to_path_buf())
        })
        .unwrap_or_else(|| PathBuf::from("./pocket-data"))
}
