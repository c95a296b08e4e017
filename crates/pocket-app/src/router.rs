//! 메시지 라우터.
//!
//! 캡처 레이어의 요청(`action` 태그 JSON)을 저장소 호출로 바꾸고
//! `{status: "success" | "error"}` 응답을 만든다.
//! 요청마다 `operation_timeout_ms`를 적용하며, 시간이 지나면 호출자에게는
//! `StorageUnavailable`을 돌려주고 작업 자체는 끝까지 진행된다.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pocket_core::error::CoreError;
use pocket_core::models::log_entry::LogEntry;
use pocket_core::models::message::{Request, Response};
use pocket_core::models::record::RecordContent;
use pocket_storage::log_sink::LogSink;
use pocket_storage::reconcile::{sweep_orphan_blobs, DEFAULT_GRACE_SECS};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::wiring::Services;

/// 의도 트리 저장 키 (로컬 영역)
pub const INTENT_TREE_KEY: &str = "intentTree";

/// 레코드 크기 초과 시 사용자 메시지
const RECORD_TOO_LARGE: &str = "Record size too large";

/// 요청 → 응답 라우터
#[derive(Clone)]
pub struct MessageRouter {
    services: Arc<Services>,
    timeout: Duration,
}

impl MessageRouter {
    pub fn new(services: Arc<Services>) -> Self {
        let timeout = services.config.storage.operation_timeout();
        Self { services, timeout }
    }

    /// 요청 처리 (실패도 `Response::Error`로 변환)
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.dispatch_timed(request).await {
            Ok(response) => response,
            Err(CoreError::QuotaExceeded { size, limit }) => {
                warn!("레코드 거부: {size}bytes > {limit}bytes");
                Response::error(RECORD_TOO_LARGE)
            }
            Err(e) => {
                warn!("요청 실패: {e}");
                Response::error(e.to_string())
            }
        }
    }

    async fn dispatch_timed(&self, request: Request) -> Result<Response, CoreError> {
        let services = self.services.clone();
        // 타임아웃이 나도 작업은 별도 태스크에서 계속된다
        let task = tokio::spawn(async move { handle(&services, request).await });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(CoreError::Internal(format!("요청 태스크 실패: {e}"))),
            Err(_) => Err(CoreError::StorageUnavailable {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// 채널 기반 라우터 시작
    pub fn spawn(self, capacity: usize) -> RouterHandle {
        let (tx, mut rx) = mpsc::channel::<(Request, oneshot::Sender<Response>)>(capacity);

        tokio::spawn(async move {
            while let Some((request, reply)) = rx.recv().await {
                let router = self.clone();
                tokio::spawn(async move {
                    let response = router.dispatch(request).await;
                    if reply.send(response).is_err() {
                        debug!("응답 수신자가 사라짐");
                    }
                });
            }
            debug!("라우터 채널 종료");
        });

        RouterHandle { tx }
    }
}

/// 라우터에 요청을 보내는 핸들 (여러 생산자가 복제해서 사용)
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<(Request, oneshot::Sender<Response>)>,
}

impl RouterHandle {
    pub async fn send(&self, request: Request) -> Result<Response, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| CoreError::Internal("라우터가 종료됨".to_string()))?;
        reply_rx
            .await
            .map_err(|_| CoreError::Internal("라우터 응답 없음".to_string()))
    }
}

async fn handle(services: &Services, request: Request) -> Result<Response, CoreError> {
    match request {
        Request::SaveData { data } => {
            if let RecordContent::Image { blob_id, .. } = &data.content {
                if !services.blobs.contains(blob_id).await? {
                    return Err(CoreError::Validation {
                        field: "content".to_string(),
                        message: format!("이미지 블롭이 없습니다: {blob_id}"),
                    });
                }
            }
            let record = services.records.save(data).await?;
            Ok(Response::success_with("id", json!(record.id)))
        }
        Request::RequestCurrentData => {
            let records = services.records.list().await?;
            Ok(Response::success_with("records", serde_json::to_value(records)?))
        }
        Request::DeleteRecord { index, cascade } => {
            let removed = services.records.delete_at(index).await?;
            if cascade {
                if let Some(blob_id) = removed.as_ref().and_then(|r| r.content.blob_id()) {
                    services.blobs.delete_image(blob_id).await?;
                }
            }
            Ok(Response::success_with("deleted", json!(removed.is_some())))
        }
        Request::ClearRecords => {
            services.records.clear().await?;
            Ok(Response::success())
        }
        Request::SaveImage { data } => {
            let bytes = BASE64.decode(data.as_bytes()).map_err(|e| CoreError::Validation {
                field: "data".to_string(),
                message: format!("base64 디코딩 실패: {e}"),
            })?;
            let id = services.blobs.save_image(&bytes).await?;
            Ok(Response::success_with("id", json!(id)))
        }
        Request::GetImage { id } => {
            let data = services
                .blobs
                .get_image(&id)
                .await?
                .map(|bytes| BASE64.encode(bytes));
            Ok(Response::success_with("data", json!(data)))
        }
        Request::DeleteImage { id } => {
            services.blobs.delete_image(&id).await?;
            Ok(Response::success())
        }
        Request::SaveIntentTree { intent_tree } => {
            services.local.set(INTENT_TREE_KEY, &intent_tree).await?;
            Ok(Response::success())
        }
        Request::GetIntentTree => {
            let tree = services.local.get(INTENT_TREE_KEY).await?;
            Ok(Response::success_with("intentTree", tree.unwrap_or(Value::Null)))
        }
        Request::Log {
            category,
            log_action,
            data,
        } => {
            services.logs.enqueue(LogEntry::new(category, log_action, data));
            Ok(Response::success())
        }
        Request::GetLogs => {
            let logs = services.logs.get_all().await?;
            Ok(Response::success_with("logs", serde_json::to_value(logs)?))
        }
        Request::ExportLogs => {
            let csv = services.logs.export_csv().await?;
            let csv = String::from_utf8(csv)
                .map_err(|e| CoreError::Internal(format!("CSV 인코딩 실패: {e}")))?;
            Ok(Response::success_body(json!({
                "filename": LogSink::export_filename(),
                "csv": csv,
            })))
        }
        Request::ClearLogs => {
            services.logs.clear().await?;
            Ok(Response::success())
        }
        Request::SweepOrphans => {
            let report = sweep_orphan_blobs(
                &services.records,
                &services.blobs,
                chrono::Duration::seconds(DEFAULT_GRACE_SECS),
            )
            .await?;
            Ok(Response::success_body(serde_json::to_value(report)?))
        }
    }
}
