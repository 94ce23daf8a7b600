//! 스냅샷 파일 싱크 포트.
//!
//! 구현: `dolbom-video::snapshot::FsSnapshotSink` (tokio::fs).
//! 코어는 인코딩된 바이트를 넘길 뿐, 파일시스템을 소유하지 않는다.

use crate::error::CoreError;
use async_trait::async_trait;
use std::path::Path;

/// 인코딩된 스냅샷 바이트를 경로에 기록하는 인터페이스
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// 바이트를 지정 경로에 기록.
    ///
    /// 대상 디렉토리가 없거나 쓸 수 없으면 `CoreError::Snapshot`.
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), CoreError>;
}
