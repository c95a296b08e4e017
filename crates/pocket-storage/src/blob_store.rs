//! 이미지 블롭 저장소.
//!
//! 스크린샷 바이너리를 로컬 객체 저장소에 ID로 보관한다.
//! 핸들은 처음 필요할 때 한 번만 열리며, 열리는 동안 들어온 호출은
//! 같은 초기화를 기다린다. 열기에 실패하면 다음 호출이 다시 시도한다.

use std::sync::Arc;

use pocket_core::config::BlobConfig;
use pocket_core::error::CoreError;
use pocket_core::ids::IdGenerator;
use pocket_core::ports::object_store::{ObjectInfo, ObjectStore, ObjectStoreOpener};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 이미지 블롭 저장소
pub struct BlobStore {
    opener: Arc<dyn ObjectStoreOpener>,
    ids: Arc<dyn IdGenerator>,
    handle: Mutex<Option<Arc<dyn ObjectStore>>>,
    max_id_attempts: u32,
}

impl BlobStore {
    pub fn new(
        opener: Arc<dyn ObjectStoreOpener>,
        ids: Arc<dyn IdGenerator>,
        config: &BlobConfig,
    ) -> Self {
        Self {
            opener,
            ids,
            handle: Mutex::new(None),
            max_id_attempts: config.max_id_attempts.max(1),
        }
    }

    /// 저장소 열기 (여러 번 호출해도 한 번만 연다)
    pub async fn init(&self) -> Result<(), CoreError> {
        self.ready().await.map(|_| ())
    }

    /// 열린 핸들 (필요하면 먼저 연다)
    async fn ready(&self) -> Result<Arc<dyn ObjectStore>, CoreError> {
        let mut handle = self.handle.lock().await;
        if let Some(store) = handle.as_ref() {
            return Ok(store.clone());
        }

        let store = self.opener.open().await.map_err(|e| {
            error!("블롭 저장소 열기 실패: {e}");
            match e {
                CoreError::Initialization(_) => e,
                other => CoreError::Initialization(other.to_string()),
            }
        })?;
        info!("블롭 저장소 열림");
        *handle = Some(store.clone());
        Ok(store)
    }

    /// 현재 열려 있는지 여부
    pub async fn is_open(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// 이미지 저장 후 발급된 ID 반환
    ///
    /// 다른 생성기가 같은 ID를 먼저 쓴 경우 새 ID로 다시 시도한다.
    pub async fn save_image(&self, data: &[u8]) -> Result<String, CoreError> {
        let store = self.ready().await?;

        let mut last = String::new();
        for attempt in 1..=self.max_id_attempts {
            let id = self.ids.new_id();
            match store.add(&id, data).await {
                Ok(()) => {
                    debug!("이미지 저장: {id} ({}bytes)", data.len());
                    return Ok(id);
                }
                Err(CoreError::IdCollision { .. }) => {
                    warn!("블롭 ID 충돌 (시도 {attempt}/{}): {id}", self.max_id_attempts);
                    last = id;
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::IdCollision { id: last })
    }

    /// 이미지 조회 (없으면 None)
    pub async fn get_image(&self, id: &str) -> Result<Option<Vec<u8>>, CoreError> {
        self.ready().await?.get(id).await
    }

    pub async fn contains(&self, id: &str) -> Result<bool, CoreError> {
        Ok(self.get_image(id).await?.is_some())
    }

    /// 이미지 삭제 (없는 ID도 성공)
    pub async fn delete_image(&self, id: &str) -> Result<(), CoreError> {
        self.ready().await?.delete(id).await?;
        debug!("이미지 삭제: {id}");
        Ok(())
    }

    /// 저장된 블롭 요약
    pub async fn list(&self) -> Result<Vec<ObjectInfo>, CoreError> {
        self.ready().await?.list().await
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.list().await?.into_iter().map(|info| info.id).collect())
    }

    /// 전체 삭제
    pub async fn clear(&self) -> Result<(), CoreError> {
        self.ready().await?.clear().await
    }

    /// 핸들 닫기: 다음 호출은 다시 연다
    pub async fn close(&self) -> Result<(), CoreError> {
        let store = self.handle.lock().await.take();
        if let Some(store) = store {
            store.close().await?;
            info!("블롭 저장소 닫힘");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteObjectStoreOpener;
    use async_trait::async_trait;
    use pocket_core::ids::MonotonicIdGenerator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fixed_ids(ms: i64) -> Arc<MonotonicIdGenerator> {
        Arc::new(MonotonicIdGenerator::with_clock(Arc::new(move || ms)))
    }

    fn in_memory_store() -> BlobStore {
        BlobStore::new(
            Arc::new(SqliteObjectStoreOpener::in_memory()),
            fixed_ids(1_700_000_000_000),
            &BlobConfig::default(),
        )
    }

    /// 열기 횟수를 세고, 처음 `fail_first`번은 실패하는 opener
    struct CountingOpener {
        inner: SqliteObjectStoreOpener,
        opens: AtomicUsize,
        fail_first: usize,
    }

    impl CountingOpener {
        fn new(fail_first: usize) -> Self {
            Self {
                inner: SqliteObjectStoreOpener::in_memory(),
                opens: AtomicUsize::new(0),
                fail_first,
            }
        }
    }

    #[async_trait]
    impl ObjectStoreOpener for CountingOpener {
        async fn open(&self) -> Result<Arc<dyn ObjectStore>, CoreError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.fail_first {
                return Err(CoreError::Initialization("잠김".to_string()));
            }
            self.inner.open().await
        }
    }

    #[tokio::test]
    async fn image_round_trip() {
        let store = in_memory_store();

        let id = store.save_image(b"base64img").await.unwrap();
        assert_eq!(id, "1700000000000");
        assert_eq!(store.get_image(&id).await.unwrap(), Some(b"base64img".to_vec()));

        store.delete_image(&id).await.unwrap();
        assert!(store.get_image(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_image_is_none() {
        let store = in_memory_store();
        assert!(store.get_image("nope").await.unwrap().is_none());
        assert!(!store.contains("nope").await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_image_succeeds() {
        let store = in_memory_store();
        store.delete_image("nope").await.unwrap();
        store.delete_image("nope").await.unwrap();
    }

    #[tokio::test]
    async fn operations_before_init_wait_for_open() {
        let store = in_memory_store();
        assert!(!store.is_open().await);

        // init 없이 바로 저장
        let id = store.save_image(b"x").await.unwrap();
        assert!(store.is_open().await);
        assert!(store.contains(&id).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_init_opens_once() {
        let opener = Arc::new(CountingOpener::new(0));
        let store = Arc::new(BlobStore::new(
            opener.clone(),
            Arc::new(MonotonicIdGenerator::new()),
            &BlobConfig::default(),
        ));

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.init().await?;
                store.save_image(&[i]).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(store.list_ids().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn failed_open_is_retried_on_next_call() {
        let opener = Arc::new(CountingOpener::new(1));
        let store = BlobStore::new(
            opener.clone(),
            Arc::new(MonotonicIdGenerator::new()),
            &BlobConfig::default(),
        );

        assert!(matches!(store.init().await, Err(CoreError::Initialization(_))));
        assert!(!store.is_open().await);

        store.init().await.unwrap();
        store.init().await.unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn same_tick_ids_across_instances_are_regenerated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blobs.db");

        let a = BlobStore::new(
            Arc::new(SqliteObjectStoreOpener::new(&path)),
            fixed_ids(1_700_000_000_000),
            &BlobConfig::default(),
        );
        let b = BlobStore::new(
            Arc::new(SqliteObjectStoreOpener::new(&path)),
            fixed_ids(1_700_000_000_000),
            &BlobConfig::default(),
        );

        let first = a.save_image(b"from-a").await.unwrap();
        let second = b.save_image(b"from-b").await.unwrap();

        assert_eq!(first, "1700000000000");
        assert_eq!(second, "1700000000001");
        assert_eq!(a.get_image(&first).await.unwrap(), Some(b"from-a".to_vec()));
        assert_eq!(a.get_image(&second).await.unwrap(), Some(b"from-b".to_vec()));
    }

    #[tokio::test]
    async fn exhausted_id_attempts_surface_collision() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blobs.db");
        let config = BlobConfig {
            max_id_attempts: 2,
            ..BlobConfig::default()
        };

        let a = BlobStore::new(
            Arc::new(SqliteObjectStoreOpener::new(&path)),
            fixed_ids(1_700_000_000_000),
            &config,
        );
        for _ in 0..3 {
            a.save_image(b"x").await.unwrap();
        }

        // 새 인스턴스는 ...000, ...001 을 시도하지만 둘 다 사용 중
        let b = BlobStore::new(
            Arc::new(SqliteObjectStoreOpener::new(&path)),
            fixed_ids(1_700_000_000_000),
            &config,
        );
        let result = b.save_image(b"y").await;
        assert!(matches!(result, Err(CoreError::IdCollision { ref id }) if id == "1700000000001"));
    }

    #[tokio::test]
    async fn close_then_reopen_on_demand() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::new(
            Arc::new(SqliteObjectStoreOpener::new(temp.path().join("blobs.db"))),
            Arc::new(MonotonicIdGenerator::new()),
            &BlobConfig::default(),
        );

        let id = store.save_image(b"persist").await.unwrap();
        store.close().await.unwrap();
        assert!(!store.is_open().await);

        assert_eq!(store.get_image(&id).await.unwrap(), Some(b"persist".to_vec()));
        assert!(store.is_open().await);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = in_memory_store();
        store.save_image(b"a").await.unwrap();
        store.save_image(b"b").await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list_ids().await.unwrap().is_empty());
    }
}
