//! SQLite 저장소 어댑터.
//!
//! # 모듈 구조
//! - `kv`: 영역별 키-값 저장 (`KeyValueStore` 포트)
//! - `objects`: 블롭 저장 (`ObjectStore` 포트)

mod kv;
mod objects;

pub use kv::{SqliteKvStore, AREA_LOCAL, AREA_SYNC};
pub use objects::{SqliteObjectStore, SqliteObjectStoreOpener};

use pocket_core::error::CoreError;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use crate::migration;

/// 파일 기반 연결 열기 + PRAGMA + 마이그레이션
pub(crate) fn open_file(path: &Path) -> Result<Connection, CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Initialization(format!(
                    "데이터 디렉토리 생성 실패: {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let conn = Connection::open(path)
        .map_err(|e| CoreError::Initialization(format!("SQLite 열기 실패: {e}")))?;

    // 여러 프로세스가 같은 파일을 쓸 수 있으므로 WAL + busy timeout
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA busy_timeout=5000;
        PRAGMA temp_store=MEMORY;
        ",
    )
    .map_err(|e| CoreError::Initialization(format!("PRAGMA 설정 실패: {e}")))?;

    migration::run_migrations(&conn)
        .map_err(|e| CoreError::Initialization(format!("마이그레이션 실패: {e}")))?;

    info!("SQLite 연결 초기화: {}", path.display());
    Ok(conn)
}

/// 인메모리 연결 열기 (테스트/임시 실행용)
pub(crate) fn open_memory() -> Result<Connection, CoreError> {
    let conn = Connection::open_in_memory()
        .map_err(|e| CoreError::Initialization(format!("인메모리 SQLite 생성 실패: {e}")))?;

    migration::run_migrations(&conn)
        .map_err(|e| CoreError::Initialization(format!("마이그레이션 실패: {e}")))?;

    Ok(conn)
}
