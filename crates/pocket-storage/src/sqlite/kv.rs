//! 키-값 영역 (KeyValueStore 포트 구현).
//!
//! 하나의 `kv_entries` 테이블을 `area` 컬럼으로 나눠
//! 동기화 영역과 로컬 영역을 표현한다. 영역 전체 쿼터를 넘는 쓰기는
//! `StorageWrite`로 거부된다.
//!
//! 삭제는 행을 지우지 않고 `deleted` 표시만 남긴다. 버전이 계속 증가하므로
//! 삭제 전에 읽은 버전으로는 다시 만들어진 값을 덮어쓸 수 없다.

use async_trait::async_trait;
use pocket_core::error::CoreError;
use pocket_core::ports::kv::{KeyValueStore, Versioned};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// 동기화 메타데이터 영역 (레코드)
pub const AREA_SYNC: &str = "sync";

/// 로컬 영역 (행동 로그, 의도 트리)
pub const AREA_LOCAL: &str = "local";

/// SQLite 키-값 영역
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
    area: String,
    quota_bytes: Option<u64>,
}

impl SqliteKvStore {
    /// 파일 기반 영역 열기
    pub fn open(path: &Path, area: &str, quota_bytes: Option<u64>) -> Result<Self, CoreError> {
        let conn = super::open_file(path)?;
        Ok(Self::from_connection(conn, area, quota_bytes))
    }

    /// 인메모리 영역 생성 (테스트용)
    pub fn open_in_memory(area: &str, quota_bytes: Option<u64>) -> Result<Self, CoreError> {
        let conn = super::open_memory()?;
        Ok(Self::from_connection(conn, area, quota_bytes))
    }

    fn from_connection(conn: Connection, area: &str, quota_bytes: Option<u64>) -> Self {
        Self {
            conn: Mutex::new(conn),
            area: area.to_string(),
            quota_bytes,
        }
    }

    /// 영역 이름
    pub fn area(&self) -> &str {
        &self.area
    }

    /// 영역 사용량 (bytes, 키 + 값)
    pub fn bytes_in_use(&self) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        Self::usage_excluding(&conn, &self.area, None)
            .map_err(|e| CoreError::StorageRead(format!("사용량 조회 실패: {e}")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|e| CoreError::Internal(format!("잠금 획득 실패: {e}")))
    }

    fn usage_excluding(
        conn: &Connection,
        area: &str,
        key: Option<&str>,
    ) -> Result<u64, rusqlite::Error> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM kv_entries WHERE area = ?1 AND deleted = 0 AND (?2 IS NULL OR key != ?2)",
            rusqlite::params![area, key],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as u64)
    }

    /// 쓰기 전 영역 쿼터 확인
    fn check_quota(&self, conn: &Connection, key: &str, serialized: &str) -> Result<(), CoreError> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };

        let others = Self::usage_excluding(conn, &self.area, Some(key))
            .map_err(|e| CoreError::StorageRead(format!("사용량 조회 실패: {e}")))?;
        let next = others + key.len() as u64 + serialized.len() as u64;

        if next > quota {
            warn!("{} 영역 쿼터 초과: {next}bytes > {quota}bytes", self.area);
            return Err(CoreError::StorageWrite(format!(
                "{} 영역 쿼터 초과 ({next}/{quota} bytes)",
                self.area
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get_versioned(&self, key: &str) -> Result<Option<Versioned>, CoreError> {
        let conn = self.lock()?;

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, version FROM kv_entries
                 WHERE area = ?1 AND key = ?2 AND deleted = 0",
                rusqlite::params![self.area, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| CoreError::StorageRead(format!("값 조회 실패: {e}")))?;

        match row {
            Some((raw, version)) => {
                let value = serde_json::from_str(&raw)
                    .map_err(|e| CoreError::StorageRead(format!("값 파싱 실패 ({key}): {e}")))?;
                Ok(Some(Versioned {
                    value,
                    version: version.max(0) as u64,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.lock()?;

        let tx = conn
            .transaction()
            .map_err(|e| CoreError::StorageWrite(format!("트랜잭션 시작 실패: {e}")))?;

        self.check_quota(&tx, key, &serialized)?;

        tx.execute(
            "INSERT INTO kv_entries (area, key, value, version, updated_at)
             VALUES (?1, ?2, ?3, 1, datetime('now'))
             ON CONFLICT(area, key) DO UPDATE SET
                value = excluded.value,
                version = kv_entries.version + 1,
                deleted = 0,
                updated_at = excluded.updated_at",
            rusqlite::params![self.area, key, serialized],
        )
        .map_err(|e| CoreError::StorageWrite(format!("값 저장 실패: {e}")))?;

        tx.commit()
            .map_err(|e| CoreError::StorageWrite(format!("트랜잭션 커밋 실패: {e}")))?;

        debug!("{}/{key} 저장 ({}bytes)", self.area, serialized.len());
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
    ) -> Result<Option<u64>, CoreError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.lock()?;

        let tx = conn
            .transaction()
            .map_err(|e| CoreError::StorageWrite(format!("트랜잭션 시작 실패: {e}")))?;

        self.check_quota(&tx, key, &serialized)?;

        let changed = match expected {
            // 없는 키: 새 행이거나 삭제 표시된 행만 되살린다
            None => tx.execute(
                "INSERT INTO kv_entries (area, key, value, version, updated_at)
                 VALUES (?1, ?2, ?3, 1, datetime('now'))
                 ON CONFLICT(area, key) DO UPDATE SET
                    value = excluded.value,
                    version = kv_entries.version + 1,
                    deleted = 0,
                    updated_at = excluded.updated_at
                 WHERE kv_entries.deleted = 1",
                rusqlite::params![self.area, key, serialized],
            ),
            Some(version) => tx.execute(
                "UPDATE kv_entries
                 SET value = ?3, version = version + 1, updated_at = datetime('now')
                 WHERE area = ?1 AND key = ?2 AND version = ?4 AND deleted = 0",
                rusqlite::params![self.area, key, serialized, version as i64],
            ),
        }
        .map_err(|e| CoreError::StorageWrite(format!("값 저장 실패: {e}")))?;

        if changed == 0 {
            debug!("{}/{key} 버전 불일치 (기대: {expected:?})", self.area);
            return Ok(None);
        }

        let version: i64 = tx
            .query_row(
                "SELECT version FROM kv_entries WHERE area = ?1 AND key = ?2",
                rusqlite::params![self.area, key],
                |row| row.get(0),
            )
            .map_err(|e| CoreError::StorageRead(format!("버전 조회 실패: {e}")))?;

        tx.commit()
            .map_err(|e| CoreError::StorageWrite(format!("트랜잭션 커밋 실패: {e}")))?;

        Ok(Some(version.max(0) as u64))
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE kv_entries
             SET value = 'null', deleted = 1, version = version + 1, updated_at = datetime('now')
             WHERE area = ?1 AND key = ?2 AND deleted = 0",
            rusqlite::params![self.area, key],
        )
        .map_err(|e| CoreError::StorageWrite(format!("값 삭제 실패: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let kv = SqliteKvStore::open_in_memory(AREA_SYNC, None).unwrap();
        assert!(kv.get("records").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_bumps_version() {
        let kv = SqliteKvStore::open_in_memory(AREA_SYNC, None).unwrap();

        kv.set("records", &json!([1])).await.unwrap();
        let first = kv.get_versioned("records").await.unwrap().unwrap();
        assert_eq!(first.value, json!([1]));
        assert_eq!(first.version, 1);

        kv.set("records", &json!([1, 2])).await.unwrap();
        let second = kv.get_versioned("records").await.unwrap().unwrap();
        assert_eq!(second.value, json!([1, 2]));
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn compare_and_set_detects_stale_version() {
        let kv = SqliteKvStore::open_in_memory(AREA_SYNC, None).unwrap();

        // 없는 키에 대한 최초 쓰기
        assert_eq!(kv.compare_and_set("k", None, &json!("a")).await.unwrap(), Some(1));
        // 같은 전제로 다시 쓰면 실패
        assert_eq!(kv.compare_and_set("k", None, &json!("b")).await.unwrap(), None);
        // 올바른 버전
        assert_eq!(kv.compare_and_set("k", Some(1), &json!("c")).await.unwrap(), Some(2));
        // 오래된 버전
        assert_eq!(kv.compare_and_set("k", Some(1), &json!("d")).await.unwrap(), None);

        assert_eq!(kv.get("k").await.unwrap(), Some(json!("c")));
    }

    #[tokio::test]
    async fn areas_are_isolated_in_same_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pocket.db");

        let sync = SqliteKvStore::open(&path, AREA_SYNC, None).unwrap();
        let local = SqliteKvStore::open(&path, AREA_LOCAL, None).unwrap();

        sync.set("k", &json!("sync")).await.unwrap();
        local.set("k", &json!("local")).await.unwrap();

        assert_eq!(sync.get("k").await.unwrap(), Some(json!("sync")));
        assert_eq!(local.get("k").await.unwrap(), Some(json!("local")));
    }

    #[tokio::test]
    async fn quota_rejects_oversized_area() {
        let kv = SqliteKvStore::open_in_memory(AREA_SYNC, Some(64)).unwrap();

        kv.set("a", &json!("small")).await.unwrap();
        let big = json!("x".repeat(100));
        let result = kv.set("b", &big).await;
        assert!(matches!(result, Err(CoreError::StorageWrite(_))));

        // 거부된 쓰기는 흔적을 남기지 않음
        assert!(kv.get("b").await.unwrap().is_none());
        assert_eq!(kv.get("a").await.unwrap(), Some(json!("small")));
    }

    #[tokio::test]
    async fn quota_counts_replacement_not_sum() {
        let kv = SqliteKvStore::open_in_memory(AREA_SYNC, Some(40)).unwrap();

        // 같은 키를 덮어쓸 때 이전 값은 사용량에서 제외
        for i in 0..10 {
            kv.set("k", &json!(format!("value-{i}"))).await.unwrap();
        }
        assert!(kv.bytes_in_use().unwrap() <= 40);
    }

    #[tokio::test]
    async fn remove_missing_key_is_ok() {
        let kv = SqliteKvStore::open_in_memory(AREA_LOCAL, None).unwrap();
        kv.remove("nope").await.unwrap();

        kv.set("k", &json!(1)).await.unwrap();
        kv.remove("k").await.unwrap();
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn version_survives_remove() {
        let kv = SqliteKvStore::open_in_memory(AREA_SYNC, None).unwrap();

        kv.set("k", &json!("old")).await.unwrap();
        let stale = kv.get_versioned("k").await.unwrap().unwrap().version;
        assert_eq!(stale, 1);

        kv.remove("k").await.unwrap();
        assert!(kv.get_versioned("k").await.unwrap().is_none());

        // 삭제된 키는 없는 키로 취급되지만 버전은 이어진다
        assert_eq!(kv.compare_and_set("k", None, &json!("new")).await.unwrap(), Some(3));
        assert_eq!(kv.compare_and_set("k", Some(stale), &json!("lost")).await.unwrap(), None);
        assert_eq!(kv.get("k").await.unwrap(), Some(json!("new")));
    }

    #[tokio::test]
    async fn removed_entry_frees_quota() {
        let kv = SqliteKvStore::open_in_memory(AREA_SYNC, Some(64)).unwrap();
        kv.set("a", &json!("x".repeat(40))).await.unwrap();
        kv.remove("a").await.unwrap();
        kv.set("b", &json!("y".repeat(40))).await.unwrap();
        assert_eq!(kv.get("b").await.unwrap(), Some(json!("y".repeat(40))));
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data").join("pocket.db");

        {
            let kv = SqliteKvStore::open(&path, AREA_SYNC, None).unwrap();
            kv.set("records", &json!([{"id": "1"}])).await.unwrap();
        }

        let kv = SqliteKvStore::open(&path, AREA_SYNC, None).unwrap();
        assert_eq!(kv.get("records").await.unwrap(), Some(json!([{"id": "1"}])));
    }
}
