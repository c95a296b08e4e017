//! 캡처 레코드 저장소.
//!
//! 동기화 영역의 `records` 키 하나에 레코드 배열 전체를 보관한다.
//! 저장소는 값 단위 get/set만 지원하므로 모든 변경은 read-modify-write이며,
//! 인스턴스 내에서는 단일 작성자 잠금으로 직렬화하고
//! 프로세스 간 경쟁은 버전 토큰(`compare_and_set`)으로 감지해 재시도한다.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use pocket_core::config::StorageConfig;
use pocket_core::error::CoreError;
use pocket_core::ids::IdGenerator;
use pocket_core::models::record::{Record, RecordInput};
use pocket_core::ports::kv::KeyValueStore;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::retry::{retry, RetryPolicy};

/// 레코드 배열 저장 키
pub const RECORDS_KEY: &str = "records";

/// 한 번의 ID 발급에서 기존 레코드와 겹칠 때 재발급 한도
const MAX_ID_ATTEMPTS: u32 = 5;

/// read-modify-write 한 사이클의 결과
enum Change<T> {
    /// 변경된 배열을 저장하고 값을 반환
    Write(T),
    /// 저장 없이 값을 반환
    Skip(T),
}

/// 캡처 레코드 저장소
pub struct RecordStore {
    kv: Arc<dyn KeyValueStore>,
    ids: Arc<dyn IdGenerator>,
    /// 이 인스턴스의 단일 작성자 지점
    writer: Mutex<()>,
    max_record_bytes: usize,
    retry: RetryPolicy,
}

impl RecordStore {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        ids: Arc<dyn IdGenerator>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            kv,
            ids,
            writer: Mutex::new(()),
            max_record_bytes: config.max_record_bytes,
            retry: RetryPolicy::from_config(config),
        }
    }

    /// 레코드 추가
    ///
    /// 직렬화 크기가 `max_record_bytes`를 넘으면 `QuotaExceeded`를 반환하고
    /// 저장된 배열은 바뀌지 않는다.
    pub async fn save(&self, input: RecordInput) -> Result<Record, CoreError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let limit = self.max_record_bytes;
        let ids = &self.ids;
        let input = &input;
        let now = &now;

        let record = self
            .mutate("레코드 저장", move |records| {
                let id = unique_id(ids.as_ref(), records)?;
                let record = Record::from_input(id, input.clone(), now.clone());

                let size = record.serialized_len()?;
                if size > limit {
                    warn!("레코드 크기 초과로 거부: {size}bytes > {limit}bytes");
                    return Err(CoreError::QuotaExceeded { size, limit });
                }

                records.push(record.clone());
                Ok(Change::Write(record))
            })
            .await?;

        debug!("레코드 저장: {} ({:?})", record.id, record.content.kind());
        Ok(record)
    }

    /// 전체 레코드 (삽입 순서)
    pub async fn list(&self) -> Result<Vec<Record>, CoreError> {
        let value = self.kv.get(RECORDS_KEY).await?;
        decode(value)
    }

    /// ID로 조회
    pub async fn get(&self, id: &str) -> Result<Option<Record>, CoreError> {
        Ok(self.list().await?.into_iter().find(|r| r.id == id))
    }

    /// 레코드 개수
    pub async fn len(&self) -> Result<usize, CoreError> {
        Ok(self.list().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len().await? == 0)
    }

    /// 위치로 삭제
    ///
    /// 범위를 벗어난 인덱스는 아무것도 하지 않고 `Ok(None)`을 반환한다.
    pub async fn delete_at(&self, index: usize) -> Result<Option<Record>, CoreError> {
        let removed = self
            .mutate("레코드 삭제", move |records| {
                if index >= records.len() {
                    return Ok(Change::Skip(None));
                }
                Ok(Change::Write(Some(records.remove(index))))
            })
            .await?;

        match &removed {
            Some(record) => debug!("레코드 삭제: #{index} ({})", record.id),
            None => debug!("삭제할 레코드 없음: #{index}"),
        }
        Ok(removed)
    }

    /// 전체 삭제
    pub async fn clear(&self) -> Result<(), CoreError> {
        let removed = self
            .mutate("레코드 전체 삭제", |records| {
                let count = records.len();
                records.clear();
                Ok(Change::Write(count))
            })
            .await?;
        info!("레코드 전체 삭제: {removed}개");
        Ok(())
    }

    /// 이미지 레코드가 참조하는 블롭 ID 집합
    pub async fn image_blob_ids(&self) -> Result<HashSet<String>, CoreError> {
        Ok(self
            .list()
            .await?
            .iter()
            .filter_map(|r| r.content.blob_id().map(str::to_string))
            .collect())
    }

    /// 단일 작성자 잠금 안에서 read-modify-write 수행
    ///
    /// 버전이 바뀌어 있으면 `VersionConflict`로 처리되어 정책에 따라 다시 읽는다.
    async fn mutate<T, F>(&self, what: &str, apply: F) -> Result<T, CoreError>
    where
        F: Fn(&mut Vec<Record>) -> Result<Change<T>, CoreError>,
    {
        let _writer = self.writer.lock().await;
        let kv = &self.kv;
        let apply = &apply;

        retry(self.retry, what, move || async move {
            let current = kv.get_versioned(RECORDS_KEY).await?;
            let (mut records, version) = match current {
                Some(v) => (decode(Some(v.value))?, Some(v.version)),
                None => (Vec::new(), None),
            };

            let result = match apply(&mut records)? {
                Change::Skip(result) => return Ok(result),
                Change::Write(result) => result,
            };

            let value = serde_json::to_value(&records)?;
            match kv.compare_and_set(RECORDS_KEY, version, &value).await? {
                Some(_) => Ok(result),
                None => Err(CoreError::VersionConflict {
                    key: RECORDS_KEY.to_string(),
                }),
            }
        })
        .await
    }
}

fn decode(value: Option<Value>) -> Result<Vec<Record>, CoreError> {
    match value {
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| CoreError::StorageRead(format!("레코드 배열 파싱 실패: {e}"))),
    }
}

/// 기존 레코드와 겹치지 않는 ID 발급
fn unique_id(ids: &dyn IdGenerator, records: &[Record]) -> Result<String, CoreError> {
    let mut id = ids.new_id();
    for _ in 1..MAX_ID_ATTEMPTS {
        if !records.iter().any(|r| r.id == id) {
            return Ok(id);
        }
        warn!("레코드 ID 충돌, 재발급: {id}");
        id = ids.new_id();
    }
    if records.iter().any(|r| r.id == id) {
        return Err(CoreError::IdCollision { id });
    }
    Ok(id)
}
