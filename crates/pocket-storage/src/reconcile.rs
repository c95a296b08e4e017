//! 참조되지 않는 블롭 회수.
//!
//! 캡처는 블롭을 먼저 쓰고 그 ID를 담은 레코드를 나중에 쓴다.
//! 레코드 삭제는 블롭을 지우지 않으므로, 어떤 이미지 레코드도 참조하지 않는
//! 블롭을 주기적으로 찾아 지운다. 두 단계 사이에 있는 캡처의 블롭을
//! 지우지 않도록 `grace`보다 최근에 저장된 블롭은 건너뛴다.

use chrono::{Duration, Utc};
use pocket_core::error::CoreError;
use serde::Serialize;
use tracing::{debug, info};

use crate::blob_store::BlobStore;
use crate::record_store::RecordStore;

/// 기본 유예 시간
pub const DEFAULT_GRACE_SECS: i64 = 300;

/// 회수 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// 검사한 블롭 수
    pub scanned: usize,
    /// 삭제한 블롭 수
    pub removed: usize,
    /// 유예 시간 안이라 건너뛴 블롭 수
    pub skipped_recent: usize,
}

/// 이미지 레코드가 참조하지 않는 블롭 삭제
///
/// 저장 시각을 알 수 없는 블롭은 유예 대상이 아니다.
pub async fn sweep_orphan_blobs(
    records: &RecordStore,
    blobs: &BlobStore,
    grace: Duration,
) -> Result<SweepReport, CoreError> {
    let referenced = records.image_blob_ids().await?;
    let cutoff = Utc::now() - grace;

    let mut report = SweepReport::default();
    for info in blobs.list().await? {
        report.scanned += 1;
        if referenced.contains(&info.id) {
            continue;
        }
        if info.created_at.is_some_and(|t| t > cutoff) {
            debug!("최근 블롭 건너뜀: {}", info.id);
            report.skipped_recent += 1;
            continue;
        }

        blobs.delete_image(&info.id).await?;
        debug!("고아 블롭 삭제: {} ({}bytes)", info.id, info.size);
        report.removed += 1;
    }

    info!(
        "블롭 회수 완료: 검사 {}, 삭제 {}, 유예 {}",
        report.scanned, report.removed, report.skipped_recent
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use crate::sqlite::SqliteObjectStoreOpener;
    use pocket_core::config::{BlobConfig, StorageConfig};
    use pocket_core::ids::MonotonicIdGenerator;
    use pocket_core::models::record::RecordInput;
    use std::sync::Arc;

    fn stores() -> (RecordStore, BlobStore) {
        let ids = Arc::new(MonotonicIdGenerator::new());
        let records = RecordStore::new(
            Arc::new(MemoryKvStore::new()),
            ids.clone(),
            &StorageConfig::default(),
        );
        let blobs = BlobStore::new(
            Arc::new(SqliteObjectStoreOpener::in_memory()),
            ids,
            &BlobConfig::default(),
        );
        (records, blobs)
    }

    #[tokio::test]
    async fn removes_only_unreferenced_blobs() {
        let (records, blobs) = stores();

        let kept = blobs.save_image(b"kept").await.unwrap();
        let orphan = blobs.save_image(b"orphan").await.unwrap();
        records.save(RecordInput::image(&kept, "http://x")).await.unwrap();

        let report = sweep_orphan_blobs(&records, &blobs, Duration::zero()).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                removed: 1,
                skipped_recent: 0
            }
        );
        assert!(blobs.contains(&kept).await.unwrap());
        assert!(!blobs.contains(&orphan).await.unwrap());
    }

    #[tokio::test]
    async fn blob_of_deleted_record_is_reclaimed() {
        let (records, blobs) = stores();
        let id = blobs.save_image(b"shot").await.unwrap();
        records.save(RecordInput::image(&id, "http://x")).await.unwrap();

        // 레코드 삭제는 블롭을 지우지 않음
        records.delete_at(0).await.unwrap();
        assert!(blobs.contains(&id).await.unwrap());

        let report = sweep_orphan_blobs(&records, &blobs, Duration::zero()).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(!blobs.contains(&id).await.unwrap());
    }

    #[tokio::test]
    async fn recent_blobs_survive_grace_period() {
        let (records, blobs) = stores();
        let id = blobs.save_image(b"in-flight").await.unwrap();

        let report = sweep_orphan_blobs(&records, &blobs, Duration::seconds(DEFAULT_GRACE_SECS))
            .await
            .unwrap();
        assert_eq!(report.skipped_recent, 1);
        assert_eq!(report.removed, 0);
        assert!(blobs.contains(&id).await.unwrap());
    }
}
