//! 행동 로그 싱크.
//!
//! `enqueue`는 메모리 큐에 넣고 바로 반환한다. 큐는 백그라운드 드레인이
//! 로컬 영역의 `user_behavior_logs` 키로 옮기며, 저장된 로그는
//! `max_logs`개를 넘지 않도록 가장 오래된 것부터 제거된다.
//!
//! # 드레인 규칙
//! - 드레인 가드로 한 번에 하나의 드레인만 실행
//! - 큐에 쌓인 항목을 한 번의 read-modify-write로 저장하고,
//!   저장이 성공한 뒤에만 큐에서 제거 (실패 시 큐 앞에 남음)
//! - 가드를 놓은 뒤 큐가 비어 있지 않으면 다시 시도
//! - `clear()`도 드레인 가드를 쥔 채로 큐와 저장된 로그를 비움.
//!   진행 중인 드레인은 끝난 뒤에 지워지고, clear 도중 들어온 항목은 clear 이후에 저장됨

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use pocket_core::error::CoreError;
use pocket_core::models::log_entry::{LogCategory, LogEntry};
use pocket_core::ports::kv::KeyValueStore;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::csv_export;
use crate::retry::{retry, RetryPolicy};

/// 로그 배열 저장 키
pub const LOGS_KEY: &str = "user_behavior_logs";

/// 행동 로그 싱크
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
}

struct Inner {
    kv: Arc<dyn KeyValueStore>,
    queue: Mutex<VecDeque<LogEntry>>,
    drain_guard: tokio::sync::Mutex<()>,
    max_logs: usize,
    retry: RetryPolicy,
}

impl LogSink {
    pub fn new(kv: Arc<dyn KeyValueStore>, max_logs: usize, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                kv,
                queue: Mutex::new(VecDeque::new()),
                drain_guard: tokio::sync::Mutex::new(()),
                max_logs: max_logs.max(1),
                retry,
            }),
        }
    }

    /// 큐에 추가 (블로킹 없음)
    pub fn enqueue(&self, entry: LogEntry) {
        let pending = {
            let mut queue = self.inner.queue.lock();
            queue.push_back(entry);
            queue.len()
        };
        debug!("로그 큐 추가, 대기: {pending}");
        self.inner.kick();
    }

    /// 현재 시각으로 항목을 만들어 큐에 추가
    pub fn log(&self, category: LogCategory, action: impl Into<String>, data: Map<String, Value>) {
        self.enqueue(LogEntry::new(category, action, data));
    }

    /// 아직 저장되지 않은 항목 수
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// 큐 전체를 저장할 때까지 대기
    ///
    /// 진행 중인 드레인이 있으면 끝나길 기다린 뒤 남은 항목을 처리한다.
    pub async fn drain(&self) -> Result<(), CoreError> {
        let result = {
            let _guard = self.inner.drain_guard.lock().await;
            self.inner.drain_locked().await
        };
        if result.is_ok() && self.pending() > 0 {
            self.inner.kick();
        }
        result
    }

    /// 큐를 비운 뒤 저장된 전체 로그 반환
    pub async fn get_all(&self) -> Result<Vec<LogEntry>, CoreError> {
        self.drain().await?;
        let value = self.inner.kv.get(LOGS_KEY).await?;
        decode(value)
    }

    /// CSV로 내보내기 (timestamp 오름차순)
    pub async fn export_csv(&self) -> Result<Vec<u8>, CoreError> {
        let entries = self.get_all().await?;
        info!("로그 CSV 내보내기: {}개", entries.len());
        Ok(csv_export::logs_to_csv(&entries).into_bytes())
    }

    /// 내보내기 파일 이름 (`user-behavior-logs-2025-01-01-18-11-47.csv`)
    pub fn export_filename() -> String {
        export_filename_at(Local::now())
    }

    /// 큐와 저장된 로그 모두 삭제
    ///
    /// 가드를 얻은 시점 이전에 들어온 항목만 버린다.
    pub async fn clear(&self) -> Result<(), CoreError> {
        let result = {
            let _guard = self.inner.drain_guard.lock().await;
            let dropped = {
                let mut queue = self.inner.queue.lock();
                let dropped = queue.len();
                queue.clear();
                dropped
            };
            self.inner
                .kv
                .remove(LOGS_KEY)
                .await
                .map(|()| info!("로그 전체 삭제 (대기 중이던 {dropped}개 포함)"))
        };

        // 가드를 쥔 동안 들어온 항목은 백그라운드 드레인이 넘겨받지 못했다
        if self.pending() > 0 {
            self.inner.kick();
        }
        result
    }
}

impl Inner {
    /// 백그라운드 드레인 시작 (런타임 밖이면 다음 drain/get_all에서 처리)
    fn kick(self: &Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                handle.spawn(async move { inner.background_drain().await });
            }
            Err(_) => debug!("런타임 없음, 드레인 보류"),
        }
    }

    async fn background_drain(self: Arc<Self>) {
        loop {
            // 이미 누군가 드레인 중이면 그쪽 루프가 처리
            let Ok(guard) = self.drain_guard.try_lock() else {
                return;
            };
            let result = self.drain_locked().await;
            drop(guard);

            if let Err(e) = result {
                warn!("로그 드레인 실패, 다음 enqueue에서 재시도: {e}");
                return;
            }
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    /// 가드를 쥔 상태에서 큐가 빌 때까지 저장
    async fn drain_locked(&self) -> Result<(), CoreError> {
        loop {
            let batch: Vec<LogEntry> = {
                let queue = self.queue.lock();
                if queue.is_empty() {
                    return Ok(());
                }
                queue.iter().cloned().collect()
            };

            self.persist(&batch).await?;

            // 가드를 쥐고 있으므로 앞쪽 batch.len()개는 그대로다
            let mut queue = self.queue.lock();
            let n = batch.len().min(queue.len());
            queue.drain(..n);
            debug!("로그 {n}개 저장, 대기: {}", queue.len());
        }
    }

    /// 저장된 로그 뒤에 붙이고 오래된 것부터 잘라낸다
    async fn persist(&self, batch: &[LogEntry]) -> Result<(), CoreError> {
        let kv = &self.kv;
        let max_logs = self.max_logs;

        retry(self.retry, "로그 저장", move || async move {
            let current = kv.get_versioned(LOGS_KEY).await?;
            let (mut logs, version) = match current {
                Some(v) => (decode(Some(v.value))?, Some(v.version)),
                None => (Vec::new(), None),
            };

            logs.extend_from_slice(batch);
            let overflow = logs.len().saturating_sub(max_logs);
            if overflow > 0 {
                logs.drain(..overflow);
                warn!("로그 보존 한도 {max_logs}개 초과, 오래된 {overflow}개 제거");
            }

            let value = serde_json::to_value(&logs)?;
            match kv.compare_and_set(LOGS_KEY, version, &value).await? {
                Some(_) => Ok(()),
                None => Err(CoreError::VersionConflict {
                    key: LOGS_KEY.to_string(),
                }),
            }
        })
        .await
    }
}

fn decode(value: Option<Value>) -> Result<Vec<LogEntry>, CoreError> {
    match value {
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| CoreError::StorageRead(format!("로그 배열 파싱 실패: {e}"))),
    }
}

fn export_filename_at(now: DateTime<Local>) -> String {
    let stamp = now
        .format(pocket_core::models::log_entry::LOCAL_TIME_FORMAT)
        .to_string()
        .replace([':', ' '], "-");
    format!("user-behavior-logs-{stamp}.csv")
}
