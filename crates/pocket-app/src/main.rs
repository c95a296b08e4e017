//! # pocket-app
//!
//! MagicPocket 로컬 캡처 서비스 바이너리 진입점.
//! 설정 로드, 저장소 와이어링, 메시지 라우터, CLI 명령.

mod router;
mod wiring;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use pocket_core::config::AppConfig;
use pocket_core::config_manager::{ConfigManager, CONFIG_FILE_NAME};
use pocket_core::models::message::{Request, Response};
use pocket_storage::log_sink::LogSink;
use pocket_storage::reconcile::{sweep_orphan_blobs, DEFAULT_GRACE_SECS};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::router::MessageRouter;
use crate::wiring::{resolve_data_dir, Services, StorageLocation};

/// MagicPocket 로컬 캡처 저장소
///
/// 텍스트 클립, 스크린샷, 행동 로그를 로컬에 보관한다.
#[derive(Parser, Debug)]
#[command(name = "pocket")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 데이터 저장 경로 (기본: 플랫폼 데이터 디렉토리)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 인메모리 저장소 사용 (종료 시 사라짐)
    #[arg(long, global = true)]
    in_memory: bool,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 표준 입력의 JSON 요청을 한 줄씩 처리하고 응답을 표준 출력에 쓴다
    Serve {
        /// 라우터 채널 용량
        #[arg(long, default_value = "64")]
        capacity: usize,
    },
    /// 저장된 레코드 출력
    List,
    /// 행동 로그를 CSV로 내보내기
    ExportLogs {
        /// 출력 파일 (기본: 현재 디렉토리의 user-behavior-logs-*.csv)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// 참조되지 않는 블롭 회수
    Sweep {
        /// 이보다 최근에 저장된 블롭은 건너뜀 (초)
        #[arg(long, default_value_t = DEFAULT_GRACE_SECS)]
        grace_secs: i64,
    },
    /// 행동 로그 삭제
    ClearLogs,
}

/// 설정 파일 경로 결정
///
/// # 플랫폼별 기본 경로:
/// - macOS: `~/Library/Application Support/com.magicpocket.pocket/config.json`
/// - Windows: `%APPDATA%\magicpocket\pocket\config\config.json`
/// - Linux: `~/.config/pocket/config.json`
fn resolve_config_path(args: &Args) -> PathBuf {
    args.config
        .clone()
        .or_else(|| args.data_dir.as_ref().map(|d| d.join(CONFIG_FILE_NAME)))
        .or_else(|| {
            ProjectDirs::from("com", "magicpocket", "pocket")
                .map(|p| p.config_dir().join(CONFIG_FILE_NAME))
        })
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn load_config(args: &Args) -> Result<AppConfig> {
    if args.in_memory && args.config.is_none() {
        return Ok(AppConfig::default_config());
    }
    let manager = ConfigManager::with_path(resolve_config_path(args))?;
    info!("설정 파일: {}", manager.config_path().display());
    Ok(manager.get()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!("pocket={0},pocket_core={0},pocket_storage={0}", args.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args).context("설정 로드 실패")?;
    let location = if args.in_memory {
        StorageLocation::InMemory
    } else {
        StorageLocation::Directory(resolve_data_dir(args.data_dir.as_deref(), &config))
    };

    let services = Arc::new(Services::open(config, &location).context("저장소 열기 실패")?);

    let result = run(args.command, services.clone()).await;
    if let Err(e) = services.shutdown().await {
        warn!("종료 정리 실패: {e}");
    }
    result
}

async fn run(command: Command, services: Arc<Services>) -> Result<()> {
    match command {
        Command::Serve { capacity } => serve(services, capacity).await,
        Command::List => {
            let records = services.records.list().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::ExportLogs { out } => {
            let csv = services.logs.export_csv().await?;
            let path = out.unwrap_or_else(|| PathBuf::from(LogSink::export_filename()));
            tokio::fs::write(&path, csv)
                .await
                .with_context(|| format!("CSV 저장 실패: {}", path.display()))?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Sweep { grace_secs } => {
            let report = sweep_orphan_blobs(
                &services.records,
                &services.blobs,
                chrono::Duration::seconds(grace_secs),
            )
            .await?;
            println!("{}", serde_json::to_string(&report)?);
            Ok(())
        }
        Command::ClearLogs => {
            services.logs.clear().await?;
            Ok(())
        }
    }
}

/// JSON-lines 요청 처리 루프
async fn serve(services: Arc<Services>, capacity: usize) -> Result<()> {
    let handle = MessageRouter::new(services).spawn(capacity);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("요청 대기 중 (stdin)");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle.send(request).await?,
            Err(e) => {
                warn!("잘못된 요청: {e}");
                Response::error(format!("잘못된 요청: {e}"))
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("입력 종료");
    Ok(())
}
