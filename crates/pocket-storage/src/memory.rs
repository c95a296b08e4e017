//! 인메모리 키-값 어댑터.
//!
//! `--in-memory` 실행과 단위 테스트에서 SQLite 대신 사용한다.
//! 쿼터는 적용하지 않는다. 삭제된 키도 버전은 남겨 둔다.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use pocket_core::error::CoreError;
use pocket_core::ports::kv::{KeyValueStore, Versioned};
use serde_json::Value;

struct Slot {
    /// `None`이면 삭제된 키
    value: Option<Value>,
    version: u64,
}

impl Slot {
    fn live_version(&self) -> Option<u64> {
        self.value.as_ref().map(|_| self.version)
    }
}

/// 프로세스 메모리에만 존재하는 키-값 영역
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Slot>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn next_version(slot: Option<&Slot>) -> u64 {
    slot.map_or(1, |s| s.version + 1)
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get_versioned(&self, key: &str) -> Result<Option<Versioned>, CoreError> {
        let entries = self.entries.lock();
        Ok(entries.get(key).and_then(|slot| {
            slot.value.as_ref().map(|value| Versioned {
                value: value.clone(),
                version: slot.version,
            })
        }))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        let mut entries = self.entries.lock();
        let version = next_version(entries.get(key));
        entries.insert(
            key.to_string(),
            Slot {
                value: Some(value.clone()),
                version,
            },
        );
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
    ) -> Result<Option<u64>, CoreError> {
        let mut entries = self.entries.lock();
        let slot = entries.get(key);
        if slot.and_then(Slot::live_version) != expected {
            return Ok(None);
        }

        let version = next_version(slot);
        entries.insert(
            key.to_string(),
            Slot {
                value: Some(value.clone()),
                version,
            },
        );
        Ok(Some(version))
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        if let Some(slot) = self.entries.lock().get_mut(key) {
            if slot.value.take().is_some() {
                slot.version += 1;
            }
        }
        Ok(())
    }
}
