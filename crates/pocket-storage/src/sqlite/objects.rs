//! 블롭 객체 저장 (ObjectStore 포트 구현).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use pocket_core::error::CoreError;
use pocket_core::ports::object_store::{ObjectInfo, ObjectStore, ObjectStoreOpener};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// SQLite 블롭 저장소 핸들
///
/// `close()` 후에는 연결이 해제되며 이후 호출은 `Initialization` 에러를 반환한다.
pub struct SqliteObjectStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteObjectStore {
    fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("잠금 획득 실패: {e}")))?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(CoreError::Initialization(
                "블롭 저장소가 닫혀 있습니다".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn add(&self, id: &str, data: &[u8]) -> Result<(), CoreError> {
        self.with_conn(|conn| {
            let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO blobs (id, data, size, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, data, data.len() as i64, created_at],
                )
                .map_err(|e| CoreError::StorageWrite(format!("블롭 저장 실패: {e}")))?;

            if changed == 0 {
                return Err(CoreError::IdCollision { id: id.to_string() });
            }
            debug!("블롭 저장: {id} ({}bytes)", data.len());
            Ok(())
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT data FROM blobs WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CoreError::StorageRead(format!("블롭 조회 실패: {e}")))
        })
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM blobs WHERE id = ?1", rusqlite::params![id])
                .map_err(|e| CoreError::StorageWrite(format!("블롭 삭제 실패: {e}")))?;
            Ok(())
        })
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>, CoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, size, created_at FROM blobs ORDER BY created_at, id")
                .map_err(|e| CoreError::StorageRead(format!("쿼리 준비 실패: {e}")))?;

            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let size: i64 = row.get(1)?;
                    let created_at: String = row.get(2)?;
                    Ok(ObjectInfo {
                        id,
                        size: size.max(0) as u64,
                        created_at: DateTime::parse_from_rfc3339(&created_at)
                            .ok()
                            .map(|t| t.with_timezone(&Utc)),
                    })
                })
                .map_err(|e| CoreError::StorageRead(format!("블롭 목록 조회 실패: {e}")))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CoreError::StorageRead(format!("행 읽기 실패: {e}")))
        })
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM blobs", [])
                .map_err(|e| CoreError::StorageWrite(format!("블롭 전체 삭제 실패: {e}")))?;
            info!("블롭 전체 삭제: {removed}개");
            Ok(())
        })
    }

    async fn close(&self) -> Result<(), CoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("잠금 획득 실패: {e}")))?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| CoreError::StorageWrite(format!("블롭 저장소 닫기 실패: {e}")))?;
            debug!("블롭 저장소 닫힘");
        }
        Ok(())
    }
}

/// 블롭 저장소 열기
///
/// `path`가 None이면 인메모리 DB를 연다 (테스트용).
pub struct SqliteObjectStoreOpener {
    path: Option<PathBuf>,
}

impl SqliteObjectStoreOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl ObjectStoreOpener for SqliteObjectStoreOpener {
    async fn open(&self) -> Result<Arc<dyn ObjectStore>, CoreError> {
        let conn = match &self.path {
            Some(path) => super::open_file(path)?,
            None => super::open_memory()?,
        };
        Ok(Arc::new(SqliteObjectStore::new(conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_get_delete() {
        let store = SqliteObjectStoreOpener::in_memory().open().await.unwrap();

        store.add("1", b"png-bytes").await.unwrap();
        assert_eq!(store.get("1").await.unwrap(), Some(b"png-bytes".to_vec()));

        store.delete("1").await.unwrap();
        assert!(store.get("1").await.unwrap().is_none());
        // 두 번째 삭제도 성공
        store.delete("1").await.unwrap();
    }

    #[tokio::test]
    async fn add_existing_id_collides() {
        let store = SqliteObjectStoreOpener::in_memory().open().await.unwrap();

        store.add("1", b"first").await.unwrap();
        let result = store.add("1", b"second").await;
        assert!(matches!(result, Err(CoreError::IdCollision { ref id }) if id == "1"));
        // 기존 데이터 유지
        assert_eq!(store.get("1").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn list_reports_sizes() {
        let store = SqliteObjectStoreOpener::in_memory().open().await.unwrap();
        store.add("a", &[0u8; 10]).await.unwrap();
        store.add("b", &[0u8; 3]).await.unwrap();

        let mut infos = store.list().await.unwrap();
        infos.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].size, 10);
        assert_eq!(infos[1].size, 3);
        assert!(infos.iter().all(|i| i.created_at.is_some()));
    }

    #[tokio::test]
    async fn clear_then_close() {
        let store = SqliteObjectStoreOpener::in_memory().open().await.unwrap();
        store.add("a", b"x").await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        store.close().await.unwrap();
        assert!(matches!(
            store.get("a").await,
            Err(CoreError::Initialization(_))
        ));
        // 두 번 닫아도 성공
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn file_backed_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let opener = SqliteObjectStoreOpener::new(temp.path().join("blobs").join("blobs.db"));

        let store = opener.open().await.unwrap();
        store.add("keep", b"data").await.unwrap();
        store.close().await.unwrap();

        let store = opener.open().await.unwrap();
        assert_eq!(store.get("keep").await.unwrap(), Some(b"data".to_vec()));
    }
}
