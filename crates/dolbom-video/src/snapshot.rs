//! 스냅샷 인코딩과 파일 싱크.
//!
//! 현재 프레임을 JPEG로 압축해 싱크 포트로 내보낸다. 스냅샷은
//! 현재 프레임의 유계 동기 읽기일 뿐이며, 실패해도 연결 상태에는
//! 영향을 주지 않는다.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use dolbom_core::error::CoreError;
use dolbom_core::models::frame::Frame;
use dolbom_core::ports::snapshot_sink::SnapshotSink;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use std::path::Path;
use tracing::info;

use crate::placeholder;

/// 스냅샷 JPEG 품질
const JPEG_QUALITY: u8 = 90;

/// 프레임을 JPEG 바이트로 인코딩.
///
/// `timestamp`가 주어지면 사람이 읽을 수 있는 형태로 번인한다.
pub fn encode_snapshot(
    frame: &Frame,
    timestamp: Option<DateTime<Local>>,
) -> Result<Vec<u8>, CoreError> {
    let mut image: RgbImage =
        RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
            .ok_or_else(|| CoreError::Internal("프레임 버퍼 크기 불일치".to_string()))?;

    if let Some(now) = timestamp {
        let text = now.format("%Y-%m-%d %H:%M:%S").to_string();
        placeholder::burn_timestamp(&mut image, &text);
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode(
            image.as_raw(),
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CoreError::Snapshot(format!("JPEG 인코딩 실패: {e}")))?;
    Ok(encoded)
}

/// 기본 스냅샷 파일 이름 (`printer_snapshot_YYYYMMDD_HHMMSS.jpg`)
pub fn default_snapshot_name(now: DateTime<Local>) -> String {
    format!("printer_snapshot_{}.jpg", now.format("%Y%m%d_%H%M%S"))
}

/// 파일시스템 스냅샷 싱크
pub struct FsSnapshotSink;

#[async_trait]
impl SnapshotSink for FsSnapshotSink {
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(CoreError::Snapshot(format!(
                    "대상 디렉토리 없음: {}",
                    parent.display()
                )));
            }
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CoreError::Snapshot(format!("쓰기 실패: {}: {e}", path.display())))?;
        info!("스냅샷 저장: {}", path.display());
        Ok(())
    }
}
