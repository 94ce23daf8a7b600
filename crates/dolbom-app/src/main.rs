//! DOLBOM — 네트워크 3D 프린터 모니터.
//!
//! 설정을 로드하고 장치 모니터를 와이어링한 뒤, 시그널이 올 때까지
//! 상태/영상 채널을 돌린다. `--ip`가 주어지면 마지막 사용 프린터
//! 자동 연결을 건너뛰고 그 주소로 바로 붙는다.

use anyhow::Context;
use clap::Parser;
use dolbom_app::lifecycle::LifecycleManager;
use dolbom_app::monitor::DeviceMonitor;
use dolbom_app::notifier::LogNotifier;
use dolbom_core::config_manager::ConfigManager;
use dolbom_video::snapshot::FsSnapshotSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 커맨드라인 인자
#[derive(Debug, Parser)]
#[command(name = "dolbom", about = "네트워크 3D 프린터 모니터")]
struct Args {
    /// 연결할 프린터 IP (지정 시 자동 연결 무시)
    #[arg(long)]
    ip: Option<String>,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let manager = match args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    }
    .context("설정 로드 실패")?;
    info!("설정 파일: {}", manager.config_path().display());

    let config = manager.get();
    let monitor = DeviceMonitor::new(
        Arc::new(manager),
        Arc::new(LogNotifier),
        Arc::new(FsSnapshotSink),
    );

    // --ip가 최근 프린터 자동 연결보다 우선
    let target = match args.ip {
        Some(ip) => Some(ip),
        None if config.auto_connect => config.last_used_printer().map(str::to_string),
        None => None,
    };

    match target {
        Some(ip) => {
            if let Err(e) = monitor.connect(&ip).await {
                error!("{ip} 연결 실패: {e}");
            }
        }
        None => warn!("연결 대상 없음 — --ip로 프린터를 지정하세요"),
    }

    let lifecycle = LifecycleManager::new();
    lifecycle.wait_for_signal().await;

    monitor.disconnect().await;
    Ok(())
}
