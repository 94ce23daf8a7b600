//! 영상 프레임 모델.
//!
//! 디코더가 소유하던 버퍼는 읽는 쪽에 넘어갈 때 불변 스냅샷이 된다.
//! 픽셀 데이터는 `Arc`로 공유되어 복제가 싸고, 생성 이후 변경되지 않으므로
//! 렌더러가 쓰다 만 프레임을 보는 일이 없다.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 픽셀 포맷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8비트 RGB (3바이트/픽셀)
    Rgb8,
}

impl PixelFormat {
    /// 픽셀당 바이트 수
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// 프레임 출처 구분.
///
/// 표시 레이어가 라이브 영상과 생성된 카드(연결 없음/일시정지)를
/// 구분할 수 있게 한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// 스트림에서 디코드된 실제 프레임
    Live,
    /// 연결 없음/연결 중 표시 카드
    Placeholder,
    /// 일시정지 표시 카드
    Paused,
}

/// 디코드된 영상 프레임 (불변 스냅샷)
#[derive(Debug, Clone)]
pub struct Frame {
    /// 가로 픽셀
    pub width: u32,
    /// 세로 픽셀
    pub height: u32,
    /// 픽셀 포맷
    pub pixel_format: PixelFormat,
    /// 디코드(또는 생성) 시각
    pub timestamp: DateTime<Utc>,
    /// 프레임 출처
    pub kind: FrameKind,
    /// 픽셀 데이터 (width * height * bytes_per_pixel)
    pub data: Arc<[u8]>,
}

impl Frame {
    /// RGB8 프레임 생성.
    ///
    /// 버퍼 길이가 해상도와 맞지 않으면 None.
    pub fn new_rgb8(width: u32, height: u32, kind: FrameKind, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * PixelFormat::Rgb8.bytes_per_pixel();
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            pixel_format: PixelFormat::Rgb8,
            timestamp: Utc::now(),
            kind,
            data: data.into(),
        })
    }

    /// 라이브 프레임인지 여부 (생성된 카드가 아닌)
    pub fn is_live(&self) -> bool {
        self.kind == FrameKind::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new_rgb8(4, 4, FrameKind::Live, vec![0u8; 10]).is_none());
        assert!(Frame::new_rgb8(4, 4, FrameKind::Live, vec![0u8; 48]).is_some());
    }

    #[test]
    fn clone_shares_pixels() {
        let frame = Frame::new_rgb8(2, 2, FrameKind::Live, vec![7u8; 12]).unwrap();
        let copy = frame.clone();
        assert!(Arc::ptr_eq(&frame.data, &copy.data));
        assert!(copy.is_live());
    }
}
